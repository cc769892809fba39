//! Version Resolver
//!
//! Detects once per datasource instance whether the backend speaks the
//! modern or only the legacy API. Concurrent first callers share a single
//! in-flight probe.

use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::transport::{HttpRequest, Transport};

/// Endpoint probed to detect the modern API
pub const VERSION_PROBE_PATH: &str = "/loki/api/v1/label";

/// API generation spoken by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiVersion {
    Modern,
    Legacy,
}

/// Observable state of the version cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionState {
    Unresolved,
    Resolved(ApiVersion),
}

/// Once-initialized version cache for one datasource instance
pub struct VersionResolver {
    transport: Arc<dyn Transport>,
    version: OnceCell<ApiVersion>,
}

impl VersionResolver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            version: OnceCell::new(),
        }
    }

    /// Current cache state without probing
    pub fn state(&self) -> VersionState {
        match self.version.get() {
            Some(version) => VersionState::Resolved(*version),
            None => VersionState::Unresolved,
        }
    }

    /// Resolve the backend version, probing at most once.
    ///
    /// Never fails: only a 404 selects the legacy API. Any other failure is
    /// taken as transient and resolves to the modern API.
    pub async fn resolve(&self) -> ApiVersion {
        *self
            .version
            .get_or_init(|| async {
                let version = match self
                    .transport
                    .request(&HttpRequest::get(VERSION_PROBE_PATH))
                    .await
                {
                    Ok(_) => ApiVersion::Modern,
                    Err(err) if err.is_not_found() => ApiVersion::Legacy,
                    Err(err) => {
                        tracing::warn!(error = %err, "Version probe failed, assuming modern API");
                        ApiVersion::Modern
                    }
                };
                tracing::info!(version = ?version, "Detected Loki API version");
                version
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, TransportError};
    use std::time::Duration;

    #[tokio::test]
    async fn test_modern_backend() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(VERSION_PROBE_PATH, r#"{"values":["job"]}"#);
        let resolver = VersionResolver::new(transport.clone());

        assert_eq!(resolver.state(), VersionState::Unresolved);
        assert_eq!(resolver.resolve().await, ApiVersion::Modern);
        assert_eq!(resolver.state(), VersionState::Resolved(ApiVersion::Modern));
    }

    #[tokio::test]
    async fn test_not_found_means_legacy() {
        let transport = Arc::new(MockTransport::new());
        let resolver = VersionResolver::new(transport.clone());

        assert_eq!(resolver.resolve().await, ApiVersion::Legacy);
    }

    #[tokio::test]
    async fn test_other_failure_means_modern() {
        let transport = Arc::new(MockTransport::new());
        transport.fail(
            VERSION_PROBE_PATH,
            TransportError::status(401, "Unauthorized", None),
        );
        let resolver = VersionResolver::new(transport.clone());

        assert_eq!(resolver.resolve().await, ApiVersion::Modern);
    }

    #[tokio::test]
    async fn test_cached_after_first_probe() {
        let transport = Arc::new(MockTransport::new());
        let resolver = VersionResolver::new(transport.clone());

        resolver.resolve().await;
        // A later change on the backend is not observed
        transport.respond(VERSION_PROBE_PATH, r#"{"values":["job"]}"#);
        assert_eq!(resolver.resolve().await, ApiVersion::Legacy);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_probe() {
        let transport = Arc::new(MockTransport::new().with_latency(Duration::from_millis(50)));
        let resolver = Arc::new(VersionResolver::new(transport.clone()));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move { resolver.resolve().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), ApiVersion::Legacy);
        }
        assert_eq!(transport.request_count(), 1);
    }
}

//! Datasource metadata
//!
//! Connectivity check and label discovery, with the same 404 fallback to
//! the legacy API as queries.

use serde::Serialize;
use std::sync::Arc;

use crate::error::{normalize_error, QueryError, QueryResult};
use crate::response::decode_label_values;
use crate::transport::{HttpRequest, Transport, TransportError};

const LABELS_PATH: &str = "/loki/api/v1/label";
const LEGACY_LABELS_PATH: &str = "/api/prom/label";
const METADATA_REF_ID: &str = "metadata";

/// Outcome of a connectivity check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub message: String,
}

/// Label and health endpoints of one datasource instance
pub struct MetadataClient {
    transport: Arc<dyn Transport>,
}

impl MetadataClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Check that the backend is reachable and has labels
    pub async fn test_datasource(&self) -> HealthCheck {
        match self
            .request_with_fallback(LABELS_PATH.to_string(), LEGACY_LABELS_PATH.to_string())
            .await
        {
            Ok(body) => match decode_label_values(&body) {
                Ok(values) if !values.is_empty() => HealthCheck {
                    status: HealthStatus::Success,
                    message: "Data source connected and labels found.".to_string(),
                },
                Ok(_) => HealthCheck {
                    status: HealthStatus::Error,
                    message: "Data source connected, but no labels received. Verify that Loki and Promtail is configured properly.".to_string(),
                },
                Err(err) => HealthCheck {
                    status: HealthStatus::Error,
                    message: format!("Loki: {}", err),
                },
            },
            Err(err) => {
                let domain = normalize_error(&err, METADATA_REF_ID);
                tracing::warn!(error = %err, "Datasource health check failed");
                HealthCheck {
                    status: HealthStatus::Error,
                    message: format!("Loki: {}", domain.message),
                }
            }
        }
    }

    /// All label names
    pub async fn labels(&self) -> QueryResult<Vec<String>> {
        self.fetch_values(LABELS_PATH.to_string(), LEGACY_LABELS_PATH.to_string())
            .await
    }

    /// Values of one label
    pub async fn label_values(&self, name: &str) -> QueryResult<Vec<String>> {
        let encoded = urlencoding::encode(name);
        self.fetch_values(
            format!("{}/{}/values", LABELS_PATH, encoded),
            format!("{}/{}/values", LEGACY_LABELS_PATH, encoded),
        )
        .await
    }

    async fn fetch_values(&self, modern: String, legacy: String) -> QueryResult<Vec<String>> {
        let body = self
            .request_with_fallback(modern, legacy)
            .await
            .map_err(|err| QueryError::transport(&err, METADATA_REF_ID))?;
        decode_label_values(&body).map_err(|e| QueryError::decode(e, METADATA_REF_ID))
    }

    async fn request_with_fallback(
        &self,
        modern: String,
        legacy: String,
    ) -> Result<String, TransportError> {
        match self.transport.request(&HttpRequest::get(modern)).await {
            Err(err) if err.is_not_found() => {
                tracing::debug!("Label endpoint not found, using legacy API");
                self.transport.request(&HttpRequest::get(legacy)).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[tokio::test]
    async fn test_health_modern() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(LABELS_PATH, r#"{"status":"success","data":["job"]}"#);

        let check = MetadataClient::new(transport.clone()).test_datasource().await;
        assert_eq!(check.status, HealthStatus::Success);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_health_legacy_without_labels() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(LEGACY_LABELS_PATH, r#"{"values":[]}"#);

        let check = MetadataClient::new(transport.clone()).test_datasource().await;
        assert_eq!(check.status, HealthStatus::Error);
        assert!(check.message.contains("no labels received"));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_health_transport_error() {
        let transport = Arc::new(MockTransport::new());
        transport.fail(LABELS_PATH, TransportError::status(502, "Bad Gateway", None));

        let check = MetadataClient::new(transport).test_datasource().await;
        assert_eq!(check.status, HealthStatus::Error);
        assert_eq!(check.message, "Loki: Bad Gateway");
    }

    #[tokio::test]
    async fn test_label_values_fallback() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/api/prom/label/job/values", r#"{"values":["api","web"]}"#);

        let values = MetadataClient::new(transport)
            .label_values("job")
            .await
            .unwrap();
        assert_eq!(values, vec!["api", "web"]);
    }
}

//! Backend Execution
//!
//! HTTP-side execution against a Loki backend that may only speak the
//! legacy API.
//!
//! ## Architecture
//!
//! - **VersionResolver**: probes once and caches the API generation; only
//!   consulted by live tailing
//! - **FallbackExecutor**: range/instant/legacy/context queries with
//!   per-call 404 fallback
//! - **MetadataClient**: health check and label discovery

mod executor;
mod metadata;
mod version;

pub use executor::FallbackExecutor;
pub use metadata::{HealthCheck, HealthStatus, MetadataClient};
pub use version::{ApiVersion, VersionResolver, VersionState, VERSION_PROBE_PATH};

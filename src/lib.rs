//! # loki-dispatch
//!
//! Query dispatch for Loki backends that may speak either the modern
//! `/loki/api/v1` API or only the legacy `/api/prom` one.
//!
//! ## Features
//!
//! - **Request construction**: nanosecond-aligned ranges and calibrated steps
//! - **404 fallback**: range and context queries retry against the legacy API
//! - **Live tailing**: one shared connection per tail target, closed with its last subscriber
//! - **Error normalization**: every failure becomes a [`DomainError`] tied to its refId
//!
//! ## Modules
//!
//! - [`dispatch`]: entry point and merged envelope stream
//! - [`backend`]: version detection, fallback execution and metadata
//! - [`live`]: shared live-tail connections
//! - [`query`]: targets, windows and request builders
//! - [`response`]: response decoding and frame conversion
//! - [`transport`]: HTTP/WebSocket transport and a scripted mock
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loki_dispatch::{Config, QueryDispatcher, QueryRequest, Target, TimeRange, TimeWindow};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = QueryDispatcher::new(&Config::default())?;
//!
//!     let range = TimeRange::last_minutes(60);
//!     let window = TimeWindow::new(range.from, range.to).interval_ms(15_000);
//!     let request = QueryRequest::new(vec![Target::new("A", r#"{job="api"} |= "error""#)], window);
//!
//!     let mut stream = dispatcher.query(request);
//!     while let Some(envelope) = stream.recv().await {
//!         println!("{}: {:?} ({} frames)", envelope.key, envelope.state, envelope.data.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod live;
pub mod query;
pub mod response;
pub mod time;
pub mod transport;

// Re-export top-level types for convenience
pub use backend::{ApiVersion, HealthCheck, HealthStatus, VersionState};

pub use config::{generate_default_config, Config, ConfigError, DatasourceConfig, LoggingConfig};

pub use dispatch::{
    DispatchStream, LoadingState, QueryDispatcher, QueryRequest, QueryResponseEnvelope,
};

pub use error::{normalize_error, DomainError, QueryError, QueryResult};

pub use live::{LiveConfig, LiveStreamManager, LiveSubscription};

pub use query::{
    ContextRow, Direction, QueryMode, ScopedVars, Target, TemplateEngine, TimeRange, TimeWindow,
    Variable, VariableTemplates,
};

pub use response::{DataFrame, LogsFrame, SeriesFrame, TableFrame};

pub use transport::{HttpTransport, HttpTransportConfig, MockTransport, Transport, TransportError};

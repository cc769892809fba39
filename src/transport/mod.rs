//! Backend Transport
//!
//! The HTTP/WebSocket seam between the dispatch engine and a Loki backend.
//!
//! ## Implementations
//!
//! - [`HttpTransport`]: `reqwest` for HTTP, `tokio-tungstenite` for live tailing
//! - [`MockTransport`]: scripted in-memory backend that records every call

mod error;
mod http;
mod mock;

pub use error::TransportError;
pub use http::{HttpTransport, HttpTransportConfig};
pub use mock::{MockTransport, SocketHandle};

use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Stream of text messages received over a live-tail socket
pub type SocketStream = BoxStream<'static, Result<String, TransportError>>;

/// A GET request relative to the datasource base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Path below the base URL, e.g. `/loki/api/v1/query_range`
    pub path: String,
    /// Query string parameters in insertion order
    pub params: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
        }
    }

    /// Append a query parameter
    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    /// Append a query parameter only when a value is present
    pub fn param_opt<T: ToString>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    /// Look up a parameter value by name
    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Transport used by the executor, version resolver and live manager
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET request and return the body of a 2xx response.
    ///
    /// Non-2xx responses are returned as [`TransportError::Status`].
    async fn request(&self, request: &HttpRequest) -> Result<String, TransportError>;

    /// Open a persistent socket to an absolute `ws://` or `wss://` URL
    async fn open_socket(&self, url: &str) -> Result<SocketStream, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = HttpRequest::get("/loki/api/v1/query")
            .param("query", "{job=\"app\"}")
            .param("limit", 100)
            .param_opt::<i64>("time", None);

        assert_eq!(req.path, "/loki/api/v1/query");
        assert_eq!(req.params.len(), 2);
        assert_eq!(req.get_param("limit"), Some("100"));
        assert_eq!(req.get_param("time"), None);
    }
}

//! Transport error types
//!
//! Raw HTTP/WebSocket failures before they are normalized into domain errors.

use thiserror::Error;

/// Errors produced by a [`Transport`](super::Transport) implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The backend answered with a non-2xx status
    #[error("HTTP {status} {status_text}")]
    Status {
        status: u16,
        status_text: String,
        body: Option<String>,
    },

    /// The request did not complete in time
    #[error("Request timeout")]
    Timeout,

    /// The backend could not be reached
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Any other request failure
    #[error("Request failed: {0}")]
    Request(String),

    /// WebSocket handshake or stream failure
    #[error("WebSocket error: {0}")]
    Socket(String),
}

impl TransportError {
    /// Build a status error from its parts
    pub fn status(status: u16, status_text: impl Into<String>, body: Option<String>) -> Self {
        TransportError::Status {
            status,
            status_text: status_text.into(),
            body,
        }
    }

    /// HTTP status code, if the backend answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// A 404 from the modern API means "use the legacy API"
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Unavailable(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::Socket(err.to_string())
    }
}

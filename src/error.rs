//! Error Normalizer
//!
//! Turns transport failures into the single user-facing [`DomainError`]
//! shape and defines the dispatch-level [`QueryError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::response::ResponseError;
use crate::transport::TransportError;

const UNKNOWN_ERROR: &str = "Unknown error during query transaction. Please check logs.";

/// Normalized, user-facing error attached to one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainError {
    pub message: String,
    #[serde(rename = "refId")]
    pub ref_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(rename = "statusText", skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
}

impl DomainError {
    pub fn new(message: impl Into<String>, ref_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ref_id: ref_id.into(),
            status: None,
            status_text: None,
        }
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{}] {} ({})", self.ref_id, self.message, status),
            None => write!(f, "[{}] {}", self.ref_id, self.message),
        }
    }
}

impl std::error::Error for DomainError {}

/// Convert a transport failure into a [`DomainError`] for `ref_id`.
///
/// Message precedence: the response body (its `error`/`message` field when
/// it is JSON), then the status text, then the transport error itself.
pub fn normalize_error(err: &TransportError, ref_id: &str) -> DomainError {
    match err {
        TransportError::Status {
            status,
            status_text,
            body,
        } => {
            let message = body
                .as_deref()
                .and_then(message_from_body)
                .or_else(|| (!status_text.is_empty()).then(|| status_text.clone()))
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string());

            DomainError {
                message,
                ref_id: ref_id.to_string(),
                status: Some(*status),
                status_text: (!status_text.is_empty()).then(|| status_text.clone()),
            }
        }
        other => DomainError::new(other.to_string(), ref_id),
    }
}

fn message_from_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => {
            let field = map.get("error").or_else(|| map.get("message"))?;
            Some(match field {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        }
        Ok(serde_json::Value::String(s)) => Some(s),
        _ => Some(trimmed.to_string()),
    }
}

/// Errors that end a single target's sub-query
#[derive(Error, Debug, Clone)]
pub enum QueryError {
    /// Normalized backend failure
    #[error("{0}")]
    Domain(DomainError),

    /// Response shape disagrees with the requested mode
    #[error("Mode mismatch for {ref_id}: {message}")]
    ModeMismatch { ref_id: String, message: String },

    /// Live tail connection failed
    #[error("Live stream failed: {0}")]
    LiveConnection(DomainError),

    /// Backend answered with a body we could not decode
    #[error("Invalid response for {ref_id}: {source}")]
    Decode {
        ref_id: String,
        #[source]
        source: ResponseError,
    },
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

impl QueryError {
    /// Normalize a transport failure for `ref_id`
    pub fn transport(err: &TransportError, ref_id: &str) -> Self {
        QueryError::Domain(normalize_error(err, ref_id))
    }

    pub fn decode(source: ResponseError, ref_id: &str) -> Self {
        QueryError::Decode {
            ref_id: ref_id.to_string(),
            source,
        }
    }

    /// The refId of the target this error belongs to
    pub fn ref_id(&self) -> &str {
        match self {
            QueryError::Domain(err) | QueryError::LiveConnection(err) => &err.ref_id,
            QueryError::ModeMismatch { ref_id, .. } | QueryError::Decode { ref_id, .. } => ref_id,
        }
    }

    pub fn is_mode_mismatch(&self) -> bool {
        matches!(self, QueryError::ModeMismatch { .. })
    }

    /// Collapse into the user-facing shape
    pub fn into_domain(self) -> DomainError {
        match self {
            QueryError::Domain(err) | QueryError::LiveConnection(err) => err,
            QueryError::ModeMismatch { ref_id, message } => DomainError::new(message, ref_id),
            QueryError::Decode { ref_id, source } => DomainError::new(source.to_string(), ref_id),
        }
    }
}

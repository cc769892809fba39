//! Response decoding errors

use thiserror::Error;

/// Typed failures at the response parsing boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    /// Body is not the JSON shape we expect
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// `resultType` we do not know how to handle
    #[error("Unknown result type: {0}")]
    UnknownResultType(String),

    /// Sample that is neither a scalar nor a `[timestamp, value]` pair
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    /// Timestamp that cannot be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Label set string that cannot be parsed
    #[error("Invalid label set: {0}")]
    InvalidLabels(String),
}

impl From<serde_json::Error> for ResponseError {
    fn from(err: serde_json::Error) -> Self {
        ResponseError::InvalidJson(err.to_string())
    }
}

/// Result type alias for decoding operations
pub type ResponseResult<T> = Result<T, ResponseError>;

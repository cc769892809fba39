//! Response envelopes
//!
//! The unit the dispatcher emits: frames for one sub-query plus its state.

use serde::Serialize;

use crate::error::DomainError;
use crate::response::DataFrame;

/// Loading state of a sub-query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingState {
    Done,
    Streaming,
    Error,
}

/// Frames produced by one sub-query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponseEnvelope {
    pub data: Vec<DataFrame>,
    /// Identifies the sub-query, e.g. `A_log`, `A_instant`, `loki-A`
    pub key: String,
    pub state: LoadingState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DomainError>,
}

impl QueryResponseEnvelope {
    pub fn done(key: impl Into<String>, data: Vec<DataFrame>) -> Self {
        Self {
            data,
            key: key.into(),
            state: LoadingState::Done,
            error: None,
        }
    }

    pub fn streaming(key: impl Into<String>, data: Vec<DataFrame>) -> Self {
        Self {
            data,
            key: key.into(),
            state: LoadingState::Streaming,
            error: None,
        }
    }

    pub fn failed(key: impl Into<String>, error: DomainError) -> Self {
        Self {
            data: Vec::new(),
            key: key.into(),
            state: LoadingState::Error,
            error: Some(error),
        }
    }

    /// Completed response for a dispatch with nothing to run
    pub fn empty() -> Self {
        Self::done("", Vec::new())
    }

    pub fn is_error(&self) -> bool {
        self.state == LoadingState::Error
    }
}

/// Envelope key of a range (or legacy) sub-query
pub fn range_key(ref_id: &str) -> String {
    format!("{}_log", ref_id)
}

/// Envelope key of an instant sub-query
pub fn instant_key(ref_id: &str) -> String {
    format!("{}_instant", ref_id)
}

/// Envelope key of a live sub-query
pub fn live_key(ref_id: &str) -> String {
    format!("loki-{}", ref_id)
}

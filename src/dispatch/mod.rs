//! Query Dispatch
//!
//! The public entry point of the crate.
//!
//! ## Architecture
//!
//! - **QueryDispatcher**: owns the executor, version cache, live manager
//!   and template engine of one datasource instance
//! - **DispatchStream**: merged envelopes of one call; dropping it cancels
//!   every sub-execution
//! - **QueryResponseEnvelope**: frames, key and loading state of one
//!   sub-query

mod dispatcher;
mod envelope;

pub use dispatcher::{DispatchStream, QueryDispatcher, QueryRequest};
pub use envelope::{instant_key, live_key, range_key, LoadingState, QueryResponseEnvelope};

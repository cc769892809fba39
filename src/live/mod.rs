//! Live Tailing
//!
//! Shared, reference-counted tail connections.
//!
//! ## Architecture
//!
//! - **LiveStreamManager**: maps each [`LiveKey`](crate::query::LiveKey) to
//!   one connection task and a broadcast channel
//! - **LiveSubscription**: one consumer; yields buffer snapshots and
//!   detaches on drop

mod manager;

pub use manager::{LiveConfig, LiveStreamManager, LiveSubscription};

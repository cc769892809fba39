//! Time and Interval Utilities
//!
//! Nanosecond conversion, whole-second range alignment and step
//! calibration against the backend datapoint cap. Pure functions only.

use chrono::{DateTime, Utc};

/// Nanoseconds in one second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Nanoseconds in one millisecond
pub const NANOS_PER_MILLI: i64 = 1_000_000;

/// Maximum number of datapoints Loki accepts for a single range query
pub const DEFAULT_POINT_CAP: i64 = 11_000;

/// Smallest step ever sent to the backend, in milliseconds
pub const MIN_INTERVAL_MS: i64 = 1_000;

/// Earliest whole second representable in nanoseconds
const MIN_ALIGNED_NS: i64 = i64::MIN - i64::MIN % NANOS_PER_SECOND;

/// Latest whole second representable in nanoseconds
const MAX_ALIGNED_NS: i64 = i64::MAX - i64::MAX % NANOS_PER_SECOND;

/// A time window expanded to whole-second boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedRange {
    /// Start in nanoseconds since epoch (multiple of 1s)
    pub start: i64,
    /// End in nanoseconds since epoch (multiple of 1s)
    pub end: i64,
}

/// Convert a wall-clock instant to nanoseconds since epoch.
///
/// With `round_up` set, an instant with sub-second precision is moved to the
/// next whole second so the boundary is covered inclusively.
pub fn to_nanos(time: DateTime<Utc>, round_up: bool) -> i64 {
    let seconds = time.timestamp();
    let subsec = i64::from(time.timestamp_subsec_nanos());

    if round_up && subsec != 0 {
        seconds.saturating_add(1).saturating_mul(NANOS_PER_SECOND)
    } else {
        seconds
            .saturating_mul(NANOS_PER_SECOND)
            .saturating_add(subsec)
    }
}

/// Expand `[start_ns, end_ns]` outward to whole-second boundaries.
///
/// The start is aligned down. The end always moves to the *next* second
/// boundary, even when already aligned, which keeps backend bucketing
/// stable across repeated identical queries. Both ends clamp to the last
/// representable whole second instead of overflowing.
pub fn align_range(start_ns: i64, end_ns: i64) -> AlignedRange {
    AlignedRange {
        start: start_ns
            .checked_sub(start_ns.rem_euclid(NANOS_PER_SECOND))
            .unwrap_or(MIN_ALIGNED_NS),
        end: end_ns
            .checked_add(NANOS_PER_SECOND - end_ns.rem_euclid(NANOS_PER_SECOND))
            .unwrap_or(MAX_ALIGNED_NS),
    }
}

/// Calibrate a step interval against the default 11000 point cap
pub fn calibrate_interval(interval_ms: i64, range_ms: i64) -> i64 {
    calibrate_interval_with_cap(interval_ms, range_ms, DEFAULT_POINT_CAP)
}

/// Calibrate a step interval so `range_ms / interval_ms` stays within `point_cap`.
///
/// The result is never below [`MIN_INTERVAL_MS`].
pub fn calibrate_interval_with_cap(interval_ms: i64, range_ms: i64, point_cap: i64) -> i64 {
    let mut interval = interval_ms;
    if interval != 0 && point_cap > 0 && range_ms as f64 / interval as f64 > point_cap as f64 {
        interval = ceil_div(range_ms, point_cap);
    }
    interval.max(MIN_INTERVAL_MS)
}

/// Integer division rounding towards positive infinity
pub(crate) fn ceil_div(value: i64, divisor: i64) -> i64 {
    let quotient = value.div_euclid(divisor);
    if value.rem_euclid(divisor) == 0 {
        quotient
    } else {
        quotient + 1
    }
}

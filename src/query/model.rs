//! Query data model
//!
//! Targets, time windows and the request shapes derived from them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::transport::HttpRequest;

/// Modern range query endpoint
pub const RANGE_QUERY_PATH: &str = "/loki/api/v1/query_range";
/// Modern instant query endpoint
pub const INSTANT_QUERY_PATH: &str = "/loki/api/v1/query";
/// Legacy query endpoint
pub const LEGACY_QUERY_PATH: &str = "/api/prom/query";
/// Modern tail endpoint
pub const TAIL_PATH: &str = "/loki/api/v1/tail";
/// Legacy tail endpoint
pub const LEGACY_TAIL_PATH: &str = "/api/prom/tail";

/// Sort order of returned log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Backward,
    Forward,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Backward => "BACKWARD",
            Direction::Forward => "FORWARD",
        }
    }
}

/// Overall mode of a dispatch call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Range query only, any result shape accepted
    #[default]
    Dashboard,
    /// Range query; numeric results are a mode mismatch
    Logs,
    /// Instant and range queries merged
    Metrics,
}

/// A user-issued query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub expression: String,
    #[serde(rename = "refId")]
    pub ref_id: String,
    #[serde(default)]
    pub hide: bool,
    #[serde(default, rename = "liveStreaming")]
    pub live_streaming: bool,
    /// Always use the legacy query endpoint
    #[serde(default)]
    pub legacy: bool,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default, rename = "contextLimit")]
    pub context_limit: Option<usize>,
}

impl Target {
    pub fn new(ref_id: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            ref_id: ref_id.into(),
            hide: false,
            live_streaming: false,
            legacy: false,
            direction: Direction::Backward,
            context_limit: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hide = true;
        self
    }

    pub fn live(mut self) -> Self {
        self.live_streaming = true;
        self
    }

    pub fn legacy(mut self) -> Self {
        self.legacy = true;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn context_limit(mut self, limit: usize) -> Self {
        self.context_limit = Some(limit);
        self
    }

    /// Hidden targets and empty expressions are never executed
    pub fn is_eligible(&self) -> bool {
        !self.hide && !self.expression.trim().is_empty()
    }
}

/// Wall-clock bounds of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// The last `minutes` minutes up to now
    pub fn last_minutes(minutes: i64) -> Self {
        let to = Utc::now();
        Self {
            from: to - Duration::minutes(minutes),
            to,
        }
    }
}

/// Shared time window and sizing for one dispatch call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    pub range: Option<TimeRange>,
    pub interval_ms: Option<i64>,
    pub max_data_points: Option<usize>,
    /// Oldest lines first
    pub reverse: bool,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            range: Some(TimeRange::new(from, to)),
            ..Default::default()
        }
    }

    pub fn interval_ms(mut self, interval_ms: i64) -> Self {
        self.interval_ms = Some(interval_ms);
        self
    }

    pub fn max_data_points(mut self, points: usize) -> Self {
        self.max_data_points = Some(points);
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Effective direction for a target in this window
    pub fn direction_for(&self, target: &Target) -> Direction {
        if self.reverse {
            Direction::Forward
        } else {
            target.direction
        }
    }

    /// `max_data_points` capped by `max_lines`; 0 means unspecified
    pub fn limit(&self, max_lines: usize) -> usize {
        match self.max_data_points {
            Some(points) if points > 0 => points.min(max_lines),
            _ => max_lines,
        }
    }
}

/// Modern range query request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQueryRequest {
    pub selector: String,
    pub regex: String,
    pub start_ns: Option<i64>,
    pub end_ns: Option<i64>,
    pub step_seconds: Option<i64>,
    pub limit: usize,
    pub direction: Direction,
}

impl RangeQueryRequest {
    pub fn to_http(&self) -> HttpRequest {
        HttpRequest::get(RANGE_QUERY_PATH)
            .param("query", &self.selector)
            .param_opt("start", self.start_ns)
            .param_opt("end", self.end_ns)
            .param_opt("step", self.step_seconds)
            .param("limit", self.limit)
            .param("direction", self.direction.as_str())
    }
}

/// Modern instant query request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantQueryRequest {
    pub selector: String,
    pub time_ns: i64,
    pub limit: usize,
}

impl InstantQueryRequest {
    pub fn to_http(&self) -> HttpRequest {
        HttpRequest::get(INSTANT_QUERY_PATH)
            .param("query", &self.selector)
            .param("time", self.time_ns)
            .param("limit", self.limit)
    }
}

/// Legacy query request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyQueryRequest {
    pub selector: String,
    pub regex: String,
    pub start_ns: Option<i64>,
    pub end_ns: Option<i64>,
    pub limit: usize,
    pub direction: Direction,
}

impl LegacyQueryRequest {
    pub fn to_http(&self) -> HttpRequest {
        HttpRequest::get(LEGACY_QUERY_PATH)
            .param("query", &self.selector)
            .param("regexp", &self.regex)
            .param_opt("start", self.start_ns)
            .param_opt("end", self.end_ns)
            .param("limit", self.limit)
            .param("direction", self.direction.as_str())
    }
}

/// Descriptor for a live tail subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTarget {
    pub selector: String,
    pub regex: String,
    pub url: String,
    pub ref_id: String,
    pub size_limit: usize,
}

/// Deduplication identity of a live subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiveKey {
    pub url: String,
    pub selector: String,
    pub size_limit: usize,
}

impl LiveTarget {
    pub fn key(&self) -> LiveKey {
        LiveKey {
            url: self.url.clone(),
            selector: self.selector.clone(),
            size_limit: self.size_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_eligibility() {
        assert!(Target::new("A", "{job=\"app\"}").is_eligible());
        assert!(!Target::new("A", "   ").is_eligible());
        assert!(!Target::new("A", "{job=\"app\"}").hidden().is_eligible());
    }

    #[test]
    fn test_target_deserialize() {
        let json = r#"{"expression":"{job=\"app\"}","refId":"A","liveStreaming":true,"direction":"FORWARD"}"#;
        let target: Target = serde_json::from_str(json).unwrap();
        assert_eq!(target.ref_id, "A");
        assert!(target.live_streaming);
        assert_eq!(target.direction, Direction::Forward);
        assert!(!target.hide);
    }

    #[test]
    fn test_window_limit() {
        let window = TimeWindow::default();
        assert_eq!(window.limit(1000), 1000);
        assert_eq!(window.max_data_points(200).limit(1000), 200);
        assert_eq!(window.max_data_points(5000).limit(1000), 1000);
        assert_eq!(window.max_data_points(0).limit(1000), 1000);
    }

    #[test]
    fn test_window_direction() {
        let target = Target::new("A", "{}");
        assert_eq!(TimeWindow::default().direction_for(&target), Direction::Backward);
        assert_eq!(
            TimeWindow::default().reverse(true).direction_for(&target),
            Direction::Forward
        );
    }

    #[test]
    fn test_live_key_ignores_ref_id() {
        let a = LiveTarget {
            selector: "{job=\"app\"}".to_string(),
            regex: String::new(),
            url: "ws://loki/tail".to_string(),
            ref_id: "A".to_string(),
            size_limit: 100,
        };
        let b = LiveTarget {
            ref_id: "B".to_string(),
            ..a.clone()
        };
        assert_eq!(a.key(), b.key());
    }
}

//! Context Query Builder
//!
//! Builds the narrow query used to fetch the lines around one log row.

use super::model::{Direction, LEGACY_QUERY_PATH, RANGE_QUERY_PATH};
use crate::response::{format_labels, Labels};
use crate::transport::HttpRequest;

/// Look-around buffer on either side of a row: 2 hours in nanoseconds
pub const CONTEXT_BUFFER_NS: i64 = 2 * 60 * 60 * 1_000_000_000;

/// Lines fetched when the target does not say otherwise
pub const DEFAULT_CONTEXT_LIMIT: usize = 10;

/// The row context is requested around
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRow {
    pub labels: Labels,
    /// Nanoseconds since epoch
    pub timestamp_ns: i64,
}

/// A time-windowed query around one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextQuery {
    pub selector: String,
    pub start_ns: i64,
    pub end_ns: i64,
    pub limit: usize,
    pub direction: Direction,
}

impl ContextQuery {
    /// Build the query for `row`.
    ///
    /// BACKWARD covers `[T - 2h, T]`; FORWARD covers `[T, T + 2h]`. Both
    /// bounds include the row itself, which the caller filters out.
    pub fn for_row(row: &ContextRow, direction: Direction, limit: usize) -> Self {
        let (start_ns, end_ns) = match direction {
            Direction::Backward => (
                row.timestamp_ns.saturating_sub(CONTEXT_BUFFER_NS),
                row.timestamp_ns,
            ),
            Direction::Forward => (
                row.timestamp_ns,
                row.timestamp_ns.saturating_add(CONTEXT_BUFFER_NS),
            ),
        };

        Self {
            selector: format_labels(&row.labels),
            start_ns,
            end_ns,
            limit,
            direction,
        }
    }

    pub fn to_range_http(&self) -> HttpRequest {
        HttpRequest::get(RANGE_QUERY_PATH)
            .param("query", &self.selector)
            .param("start", self.start_ns)
            .param("end", self.end_ns)
            .param("limit", self.limit)
            .param("direction", self.direction.as_str())
    }

    pub fn to_legacy_http(&self) -> HttpRequest {
        HttpRequest::get(LEGACY_QUERY_PATH)
            .param("query", &self.selector)
            .param("regexp", "")
            .param("start", self.start_ns)
            .param("end", self.end_ns)
            .param("limit", self.limit)
            .param("direction", self.direction.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> ContextRow {
        let mut labels = Labels::new();
        labels.insert("job".to_string(), "app".to_string());
        labels.insert("host".to_string(), "web-1".to_string());
        ContextRow {
            labels,
            timestamp_ns: 1_700_000_000_123_456_789,
        }
    }

    #[test]
    fn test_backward_window() {
        let query = ContextQuery::for_row(&row(), Direction::Backward, 10);
        assert_eq!(query.start_ns, 1_700_000_000_123_456_789 - 7_200_000_000_000);
        assert_eq!(query.end_ns, 1_700_000_000_123_456_789);
    }

    #[test]
    fn test_forward_window() {
        let query = ContextQuery::for_row(&row(), Direction::Forward, 10);
        assert_eq!(query.start_ns, 1_700_000_000_123_456_789);
        assert_eq!(query.end_ns, 1_700_000_000_123_456_789 + 7_200_000_000_000);
    }

    #[test]
    fn test_window_saturates_at_i64_limits() {
        let late = ContextRow {
            timestamp_ns: i64::MAX - 5,
            ..row()
        };
        let query = ContextQuery::for_row(&late, Direction::Forward, 10);
        assert_eq!(query.start_ns, i64::MAX - 5);
        assert_eq!(query.end_ns, i64::MAX);

        let early = ContextRow {
            timestamp_ns: i64::MIN + 5,
            ..row()
        };
        let query = ContextQuery::for_row(&early, Direction::Backward, 10);
        assert_eq!(query.start_ns, i64::MIN);
        assert_eq!(query.end_ns, i64::MIN + 5);
    }

    #[test]
    fn test_selector_is_exact_and_sorted() {
        let query = ContextQuery::for_row(&row(), Direction::Backward, 10);
        assert_eq!(query.selector, r#"{host="web-1", job="app"}"#);

        let http = query.to_range_http();
        assert_eq!(http.path, "/loki/api/v1/query_range");
        assert_eq!(http.get_param("limit"), Some("10"));
        assert_eq!(http.get_param("direction"), Some("BACKWARD"));
        assert_eq!(query.to_legacy_http().path, "/api/prom/query");
    }
}

//! Query Builders
//!
//! Pure construction of range, instant, legacy and live-tail requests from a
//! target and a time window.

use url::Url;

use super::expr::parse_query;
use super::model::{
    InstantQueryRequest, LegacyQueryRequest, LiveTarget, RangeQueryRequest, Target, TimeWindow,
    LEGACY_TAIL_PATH, TAIL_PATH,
};
use crate::time::{align_range, calibrate_interval, ceil_div, to_nanos, NANOS_PER_MILLI};

/// Default maximum number of lines requested from the backend
pub const DEFAULT_MAX_LINES: usize = 1000;

/// Builds backend requests for one datasource instance
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    base_url: String,
    max_lines: usize,
}

impl QueryBuilder {
    /// `max_lines` of 0 falls back to [`DEFAULT_MAX_LINES`]
    pub fn new(base_url: impl Into<String>, max_lines: usize) -> Self {
        Self {
            base_url: base_url.into(),
            max_lines: if max_lines == 0 {
                DEFAULT_MAX_LINES
            } else {
                max_lines
            },
        }
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a modern range request.
    ///
    /// Range fields are only set when the window carries both a time range
    /// and an interval.
    pub fn build_range(&self, target: &Target, window: &TimeWindow) -> RangeQueryRequest {
        let parsed = parse_query(&target.expression);

        let (start_ns, end_ns, step_seconds) = match (window.range, window.interval_ms) {
            (Some(range), Some(interval_ms)) => {
                let start = to_nanos(range.from, false);
                let end = to_nanos(range.to, true);
                let range_ms = ceil_div(end.saturating_sub(start), NANOS_PER_MILLI);
                let step = ceil_div(calibrate_interval(interval_ms, range_ms), 1000);
                let aligned = align_range(start, end);
                (Some(aligned.start), Some(aligned.end), Some(step))
            }
            _ => (None, None, None),
        };

        RangeQueryRequest {
            selector: parsed.selector,
            regex: parsed.regex,
            start_ns,
            end_ns,
            step_seconds,
            limit: window.limit(self.max_lines),
            direction: window.direction_for(target),
        }
    }

    /// Build a modern instant request evaluated at the end of the window
    pub fn build_instant(&self, target: &Target, window: &TimeWindow) -> InstantQueryRequest {
        let parsed = parse_query(&target.expression);
        let time = window
            .range
            .map(|range| range.to)
            .unwrap_or_else(chrono::Utc::now);

        InstantQueryRequest {
            selector: parsed.selector,
            time_ns: to_nanos(time, true),
            limit: window.limit(self.max_lines),
        }
    }

    /// Build a legacy request; `start`/`end` only when a range is present
    pub fn build_legacy(&self, target: &Target, window: &TimeWindow) -> LegacyQueryRequest {
        let parsed = parse_query(&target.expression);
        let (start_ns, end_ns) = match window.range {
            Some(range) => (
                Some(to_nanos(range.from, false)),
                Some(to_nanos(range.to, true)),
            ),
            None => (None, None),
        };

        LegacyQueryRequest {
            selector: parsed.selector,
            regex: parsed.regex,
            start_ns,
            end_ns,
            limit: window.limit(self.max_lines),
            direction: window.direction_for(target),
        }
    }

    /// Build the live-tail descriptor for the modern or legacy endpoint
    pub fn build_live_target(&self, target: &Target, window: &TimeWindow, legacy: bool) -> LiveTarget {
        let parsed = parse_query(&target.expression);
        let path = if legacy { LEGACY_TAIL_PATH } else { TAIL_PATH };

        let mut url = format!(
            "{}{}?query={}",
            websocket_base(&self.base_url),
            path,
            urlencoding::encode(&parsed.selector)
        );
        if legacy && !parsed.regex.is_empty() {
            url.push_str("&regexp=");
            url.push_str(&urlencoding::encode(&parsed.regex));
        }

        LiveTarget {
            selector: parsed.selector,
            regex: parsed.regex,
            url,
            ref_id: target.ref_id.clone(),
            size_limit: window.limit(self.max_lines),
        }
    }
}

/// Rewrite an HTTP base URL to its WebSocket equivalent
fn websocket_base(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    match Url::parse(trimmed) {
        Ok(mut url) => {
            let scheme = match url.scheme() {
                "https" => Some("wss"),
                "http" => Some("ws"),
                _ => None,
            };
            if let Some(scheme) = scheme {
                // Both schemes are "special", so the switch cannot fail
                let _ = url.set_scheme(scheme);
            }
            url.as_str().trim_end_matches('/').to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

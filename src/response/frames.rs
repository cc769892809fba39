//! Response to frame conversion
//!
//! Pure converters from decoded results to the frames carried by
//! response envelopes.

use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;

use super::labels::{format_labels, Labels};
use super::model::{LogStream, QueryResult, Sample};

/// A typed result frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataFrame {
    Logs(LogsFrame),
    Series(SeriesFrame),
    Table(TableFrame),
}

impl DataFrame {
    pub fn ref_id(&self) -> &str {
        match self {
            DataFrame::Logs(f) => &f.ref_id,
            DataFrame::Series(f) => &f.ref_id,
            DataFrame::Table(f) => &f.ref_id,
        }
    }

    /// Re-attribute a frame to another target
    pub fn set_ref_id(&mut self, ref_id: &str) {
        let slot = match self {
            DataFrame::Logs(f) => &mut f.ref_id,
            DataFrame::Series(f) => &mut f.ref_id,
            DataFrame::Table(f) => &mut f.ref_id,
        };
        *slot = ref_id.to_string();
    }

    pub fn is_logs(&self) -> bool {
        matches!(self, DataFrame::Logs(_))
    }

    /// True for series and tables, i.e. aggregated metric data
    pub fn is_numeric(&self) -> bool {
        !self.is_logs()
    }
}

/// Log lines sharing one label set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogsFrame {
    pub ref_id: String,
    pub labels: Labels,
    pub rows: Vec<LogRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRow {
    /// Nanoseconds since epoch
    pub timestamp_ns: i64,
    pub line: String,
    pub labels: Labels,
}

/// A named numeric time series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesFrame {
    pub ref_id: String,
    pub name: String,
    pub labels: Labels,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub timestamp_ms: i64,
    pub value: f64,
}

/// Column-oriented table (instant queries)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableFrame {
    pub ref_id: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Convert a modern range result: streams become log frames, matrix and
/// vector results become series.
pub fn range_response_to_frames(result: &QueryResult, ref_id: &str) -> Vec<DataFrame> {
    match result {
        QueryResult::Streams(streams) => streams
            .iter()
            .map(|s| stream_result_to_frame(s, ref_id))
            .collect(),
        QueryResult::Matrix(series) => series
            .iter()
            .map(|s| series_frame(ref_id, &s.labels, &s.samples))
            .collect(),
        QueryResult::Vector(samples) => samples
            .iter()
            .map(|s| series_frame(ref_id, &s.labels, std::slice::from_ref(&s.sample)))
            .collect(),
        QueryResult::Scalar(sample) => {
            vec![series_frame(ref_id, &Labels::new(), std::slice::from_ref(sample))]
        }
    }
}

/// Convert legacy streams to log frames
pub fn legacy_response_to_frames(streams: &[LogStream], ref_id: &str) -> Vec<DataFrame> {
    streams
        .iter()
        .map(|s| stream_result_to_frame(s, ref_id))
        .collect()
}

/// Convert one stream to a log frame
pub fn stream_result_to_frame(stream: &LogStream, ref_id: &str) -> DataFrame {
    DataFrame::Logs(LogsFrame {
        ref_id: ref_id.to_string(),
        labels: stream.labels.clone(),
        rows: stream
            .entries
            .iter()
            .map(|e| LogRow {
                timestamp_ns: e.timestamp_ns,
                line: e.line.clone(),
                labels: stream.labels.clone(),
            })
            .collect(),
    })
}

/// Flatten an instant result into one table: `Time`, one column per label
/// name (sorted), then `Value`.
pub fn instant_response_to_table(result: &QueryResult, ref_id: &str) -> DataFrame {
    let rows: Vec<(&Labels, Sample)> = match result {
        QueryResult::Vector(samples) => samples.iter().map(|s| (&s.labels, s.sample)).collect(),
        QueryResult::Matrix(series) => series
            .iter()
            .flat_map(|s| s.samples.iter().map(move |sample| (&s.labels, *sample)))
            .collect(),
        QueryResult::Scalar(sample) => vec![(&EMPTY_LABELS, *sample)],
        QueryResult::Streams(_) => Vec::new(),
    };

    let mut label_names: Vec<&String> = rows.iter().flat_map(|(labels, _)| labels.keys()).collect();
    label_names.sort();
    label_names.dedup();

    let mut columns = vec!["Time".to_string()];
    columns.extend(label_names.iter().map(|name| name.to_string()));
    columns.push("Value".to_string());

    let rows = rows
        .iter()
        .map(|(labels, sample)| {
            let mut row = Vec::with_capacity(columns.len());
            row.push(sample.timestamp_ms.map(Value::from).unwrap_or(Value::Null));
            for name in &label_names {
                row.push(
                    labels
                        .get(*name)
                        .map(|v| Value::String(v.clone()))
                        .unwrap_or(Value::Null),
                );
            }
            row.push(serde_json::Number::from_f64(sample.value).map_or(Value::Null, Value::Number));
            row
        })
        .collect();

    DataFrame::Table(TableFrame {
        ref_id: ref_id.to_string(),
        columns,
        rows,
    })
}

static EMPTY_LABELS: Labels = Labels::new();

fn series_frame(ref_id: &str, labels: &Labels, samples: &[Sample]) -> DataFrame {
    let name = if labels.is_empty() {
        "value".to_string()
    } else {
        format_labels(labels)
    };

    DataFrame::Series(SeriesFrame {
        ref_id: ref_id.to_string(),
        name,
        labels: labels.clone(),
        points: samples
            .iter()
            .filter_map(|s| {
                s.timestamp_ms.map(|timestamp_ms| Point {
                    timestamp_ms,
                    value: s.value,
                })
            })
            .collect(),
    })
}

/// Bounded buffer of the newest log rows seen on a live stream
#[derive(Debug, Clone)]
pub struct LiveBuffer {
    ref_id: String,
    capacity: usize,
    rows: VecDeque<LogRow>,
}

impl LiveBuffer {
    pub fn new(ref_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            ref_id: ref_id.into(),
            capacity: capacity.max(1),
            rows: VecDeque::new(),
        }
    }

    /// Append a batch of streams, evicting the oldest rows past capacity
    pub fn append(&mut self, streams: &[LogStream]) {
        for stream in streams {
            for entry in &stream.entries {
                if self.rows.len() == self.capacity {
                    self.rows.pop_front();
                }
                self.rows.push_back(LogRow {
                    timestamp_ns: entry.timestamp_ns,
                    line: entry.line.clone(),
                    labels: stream.labels.clone(),
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The whole buffer as one logs frame
    pub fn snapshot(&self) -> DataFrame {
        DataFrame::Logs(LogsFrame {
            ref_id: self.ref_id.clone(),
            labels: Labels::new(),
            rows: self.rows.iter().cloned().collect(),
        })
    }
}

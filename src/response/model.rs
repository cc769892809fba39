//! Loki response decoding
//!
//! Raw JSON bodies are decoded into typed results here and nowhere else.
//! Sample values are a tagged union: a bare scalar or a
//! `[timestamp, value]` pair. Anything else is rejected with a typed error.

use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;

use super::error::{ResponseError, ResponseResult};
use super::labels::{parse_labels, Labels};

/// Declared shape of a modern query result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    Streams,
    Matrix,
    Vector,
    Scalar,
}

impl ResultType {
    pub fn parse(s: &str) -> ResponseResult<Self> {
        match s {
            "streams" => Ok(ResultType::Streams),
            "matrix" => Ok(ResultType::Matrix),
            "vector" => Ok(ResultType::Vector),
            "scalar" => Ok(ResultType::Scalar),
            other => Err(ResponseError::UnknownResultType(other.to_string())),
        }
    }
}

/// Decoded modern query result
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Streams(Vec<LogStream>),
    Matrix(Vec<MatrixSeries>),
    Vector(Vec<VectorSample>),
    Scalar(Sample),
}

/// One log stream: a label set plus its entries
#[derive(Debug, Clone, PartialEq)]
pub struct LogStream {
    pub labels: Labels,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Nanoseconds since epoch
    pub timestamp_ns: i64,
    pub line: String,
}

/// Range-query series
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSeries {
    pub labels: Labels,
    pub samples: Vec<Sample>,
}

/// Instant-query element
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSample {
    pub labels: Labels,
    pub sample: Sample,
}

/// A numeric sample; scalars carry no timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp_ms: Option<i64>,
    pub value: f64,
}

/// Sample shapes as they arrive on the wire
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Scalar(f64),
    /// `[timestamp_seconds, value]`
    Pair(f64, f64),
}

impl SampleValue {
    pub fn decode(value: &Value) -> ResponseResult<Self> {
        match value {
            Value::Array(items) if items.len() == 2 => {
                let ts = number(&items[0]).ok_or_else(|| invalid_sample(value))?;
                let v = number(&items[1]).ok_or_else(|| invalid_sample(value))?;
                Ok(SampleValue::Pair(ts, v))
            }
            Value::Number(_) | Value::String(_) => number(value)
                .map(SampleValue::Scalar)
                .ok_or_else(|| invalid_sample(value)),
            _ => Err(invalid_sample(value)),
        }
    }

    pub fn into_sample(self) -> Sample {
        match self {
            SampleValue::Scalar(value) => Sample {
                timestamp_ms: None,
                value,
            },
            SampleValue::Pair(ts, value) => Sample {
                timestamp_ms: Some((ts * 1000.0).round() as i64),
                value,
            },
        }
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "+Inf" | "Inf" => Some(f64::INFINITY),
            "-Inf" => Some(f64::NEG_INFINITY),
            other => other.parse().ok(),
        },
        _ => None,
    }
}

fn invalid_sample(value: &Value) -> ResponseError {
    ResponseError::InvalidSample(value.to_string())
}

// ============================================
// Raw wire shapes
// ============================================

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct RawStream {
    #[serde(default)]
    stream: Labels,
    #[serde(default)]
    values: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct RawSeries {
    #[serde(default)]
    metric: Labels,
    #[serde(default)]
    values: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawVector {
    #[serde(default)]
    metric: Labels,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct RawLegacyResponse {
    #[serde(default)]
    streams: Vec<RawLegacyStream>,
}

#[derive(Debug, Deserialize)]
struct RawLegacyStream {
    #[serde(default)]
    labels: String,
    #[serde(default)]
    entries: Vec<RawLegacyEntry>,
}

#[derive(Debug, Deserialize)]
struct RawLegacyEntry {
    #[serde(alias = "timestamp")]
    ts: String,
    line: String,
}

/// Tail messages come in both the modern and the legacy layout
#[derive(Debug, Deserialize)]
struct RawTailMessage {
    #[serde(default)]
    streams: Vec<RawTailStream>,
}

#[derive(Debug, Deserialize)]
struct RawTailStream {
    stream: Option<Labels>,
    labels: Option<String>,
    #[serde(default)]
    values: Vec<(String, String)>,
    #[serde(default)]
    entries: Vec<RawLegacyEntry>,
}

#[derive(Debug, Deserialize)]
struct RawLabelValues {
    #[serde(default, alias = "data")]
    values: Vec<String>,
}

// ============================================
// Decoders
// ============================================

/// Declared `resultType` of a modern body without decoding the result
pub fn peek_result_type(body: &str) -> ResponseResult<ResultType> {
    let envelope: RawEnvelope = serde_json::from_str(body)?;
    ResultType::parse(&envelope.data.result_type)
}

/// Decode a modern `query` / `query_range` body
pub fn decode_query_response(body: &str) -> ResponseResult<QueryResult> {
    let envelope: RawEnvelope = serde_json::from_str(body)?;
    let result = envelope.data.result;

    match ResultType::parse(&envelope.data.result_type)? {
        ResultType::Streams => {
            let raw: Vec<RawStream> = serde_json::from_value(result)?;
            raw.into_iter()
                .map(|s| {
                    Ok(LogStream {
                        labels: s.stream,
                        entries: decode_ns_values(s.values)?,
                    })
                })
                .collect::<ResponseResult<Vec<_>>>()
                .map(QueryResult::Streams)
        }
        ResultType::Matrix => {
            let raw: Vec<RawSeries> = serde_json::from_value(result)?;
            raw.into_iter()
                .map(|s| {
                    let samples = s
                        .values
                        .iter()
                        .map(|v| SampleValue::decode(v).map(SampleValue::into_sample))
                        .collect::<ResponseResult<Vec<_>>>()?;
                    Ok(MatrixSeries {
                        labels: s.metric,
                        samples,
                    })
                })
                .collect::<ResponseResult<Vec<_>>>()
                .map(QueryResult::Matrix)
        }
        ResultType::Vector => {
            let raw: Vec<RawVector> = serde_json::from_value(result)?;
            raw.into_iter()
                .map(|v| {
                    Ok(VectorSample {
                        labels: v.metric,
                        sample: SampleValue::decode(&v.value)?.into_sample(),
                    })
                })
                .collect::<ResponseResult<Vec<_>>>()
                .map(QueryResult::Vector)
        }
        ResultType::Scalar => Ok(QueryResult::Scalar(
            SampleValue::decode(&result)?.into_sample(),
        )),
    }
}

/// Decode a legacy `/api/prom/query` body
pub fn decode_legacy_response(body: &str) -> ResponseResult<Vec<LogStream>> {
    let raw: RawLegacyResponse = serde_json::from_str(body)?;
    raw.streams
        .into_iter()
        .map(|s| {
            Ok(LogStream {
                labels: parse_labels(&s.labels)?,
                entries: decode_legacy_entries(s.entries)?,
            })
        })
        .collect()
}

/// Decode one tail message (modern or legacy layout)
pub fn decode_tail_message(body: &str) -> ResponseResult<Vec<LogStream>> {
    let raw: RawTailMessage = serde_json::from_str(body)?;
    raw.streams
        .into_iter()
        .map(|s| {
            let labels = match (s.stream, s.labels) {
                (Some(labels), _) => labels,
                (None, Some(text)) => parse_labels(&text)?,
                (None, None) => Labels::new(),
            };
            let mut entries = decode_ns_values(s.values)?;
            entries.extend(decode_legacy_entries(s.entries)?);
            Ok(LogStream { labels, entries })
        })
        .collect()
}

/// Decode a label names / label values body
pub fn decode_label_values(body: &str) -> ResponseResult<Vec<String>> {
    let raw: RawLabelValues = serde_json::from_str(body)?;
    Ok(raw.values)
}

fn decode_ns_values(values: Vec<(String, String)>) -> ResponseResult<Vec<LogEntry>> {
    values
        .into_iter()
        .map(|(ts, line)| {
            let timestamp_ns = ts
                .parse::<i64>()
                .map_err(|_| ResponseError::InvalidTimestamp(ts.clone()))?;
            Ok(LogEntry { timestamp_ns, line })
        })
        .collect()
}

fn decode_legacy_entries(entries: Vec<RawLegacyEntry>) -> ResponseResult<Vec<LogEntry>> {
    entries
        .into_iter()
        .map(|e| {
            let timestamp_ns = DateTime::parse_from_rfc3339(&e.ts)
                .ok()
                .and_then(|dt| dt.timestamp_nanos_opt())
                .ok_or_else(|| ResponseError::InvalidTimestamp(e.ts.clone()))?;
            Ok(LogEntry {
                timestamp_ns,
                line: e.line,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_streams() {
        let body = r#"{"status":"success","data":{"resultType":"streams","result":[
            {"stream":{"job":"app"},"values":[["1700000000000000000","hello"],["1700000001000000000","world"]]}
        ],"stats":{}}}"#;

        match decode_query_response(body).unwrap() {
            QueryResult::Streams(streams) => {
                assert_eq!(streams.len(), 1);
                assert_eq!(streams[0].labels["job"], "app");
                assert_eq!(streams[0].entries[1].timestamp_ns, 1_700_000_001_000_000_000);
                assert_eq!(streams[0].entries[0].line, "hello");
            }
            other => panic!("Expected streams, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_matrix_and_vector() {
        let matrix = r#"{"data":{"resultType":"matrix","result":[
            {"metric":{"level":"error"},"values":[[1700000000,"3"],[1700000060.5,"4"]]}
        ]}}"#;
        match decode_query_response(matrix).unwrap() {
            QueryResult::Matrix(series) => {
                assert_eq!(series[0].samples[1].timestamp_ms, Some(1_700_000_060_500));
                assert_eq!(series[0].samples[1].value, 4.0);
            }
            other => panic!("Expected matrix, got {:?}", other),
        }

        let vector = r#"{"data":{"resultType":"vector","result":[{"metric":{},"value":[1700000000,"42"]}]}}"#;
        assert_eq!(peek_result_type(vector).unwrap(), ResultType::Vector);
        match decode_query_response(vector).unwrap() {
            QueryResult::Vector(samples) => assert_eq!(samples[0].sample.value, 42.0),
            other => panic!("Expected vector, got {:?}", other),
        }
    }

    #[test]
    fn test_sample_value_shapes() {
        assert_eq!(
            SampleValue::decode(&json!([1.5, "2"])).unwrap(),
            SampleValue::Pair(1.5, 2.0)
        );
        assert_eq!(SampleValue::decode(&json!("7")).unwrap(), SampleValue::Scalar(7.0));
        assert_eq!(SampleValue::decode(&json!(7)).unwrap(), SampleValue::Scalar(7.0));

        assert!(matches!(
            SampleValue::decode(&json!({"v": 1})),
            Err(ResponseError::InvalidSample(_))
        ));
        assert!(matches!(
            SampleValue::decode(&json!([1, 2, 3])),
            Err(ResponseError::InvalidSample(_))
        ));
        assert!(matches!(
            SampleValue::decode(&json!("abc")),
            Err(ResponseError::InvalidSample(_))
        ));
    }

    #[test]
    fn test_unknown_result_type() {
        let body = r#"{"data":{"resultType":"histogram","result":[]}}"#;
        assert_eq!(
            decode_query_response(body).unwrap_err(),
            ResponseError::UnknownResultType("histogram".to_string())
        );
    }

    #[test]
    fn test_decode_legacy() {
        let body = r#"{"streams":[{"labels":"{job=\"app\"}","entries":[
            {"ts":"2023-11-14T22:13:20.000000001Z","line":"legacy line"}
        ]}]}"#;

        let streams = decode_legacy_response(body).unwrap();
        assert_eq!(streams[0].labels["job"], "app");
        assert_eq!(streams[0].entries[0].timestamp_ns, 1_700_000_000_000_000_001);
        assert_eq!(streams[0].entries[0].line, "legacy line");
    }

    #[test]
    fn test_decode_tail_both_layouts() {
        let modern = r#"{"streams":[{"stream":{"job":"app"},"values":[["5","a"]]}],"dropped_entries":null}"#;
        let streams = decode_tail_message(modern).unwrap();
        assert_eq!(streams[0].entries[0].timestamp_ns, 5);

        let legacy = r#"{"streams":[{"labels":"{job=\"app\"}","entries":[{"ts":"1970-01-01T00:00:00.000000007Z","line":"b"}]}]}"#;
        let streams = decode_tail_message(legacy).unwrap();
        assert_eq!(streams[0].labels["job"], "app");
        assert_eq!(streams[0].entries[0].timestamp_ns, 7);
    }

    #[test]
    fn test_decode_label_values() {
        let values = decode_label_values(r#"{"status":"success","data":["job","level"]}"#).unwrap();
        assert_eq!(values, vec!["job", "level"]);

        let values = decode_label_values(r#"{"values":["job"]}"#).unwrap();
        assert_eq!(values, vec!["job"]);
    }
}

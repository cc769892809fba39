//! Loki Responses
//!
//! Typed decoding of modern and legacy response bodies, and the pure
//! converters that turn them into [`DataFrame`]s.

mod error;
mod frames;
mod labels;
mod model;

pub use error::{ResponseError, ResponseResult};
pub use frames::{
    instant_response_to_table, legacy_response_to_frames, range_response_to_frames,
    stream_result_to_frame, DataFrame, LiveBuffer, LogRow, LogsFrame, Point, SeriesFrame,
    TableFrame,
};
pub use labels::{escape_label_value, format_labels, parse_labels, Labels};
pub use model::{
    decode_label_values, decode_legacy_response, decode_query_response, decode_tail_message,
    peek_result_type, LogEntry, LogStream, MatrixSeries, QueryResult, ResultType, Sample,
    SampleValue, VectorSample,
};

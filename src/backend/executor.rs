//! Fallback Executor
//!
//! Runs range, instant, legacy and context queries. A 404 from the modern
//! API is not an error: the equivalent legacy request is issued instead.
//! The fallback is decided per call and never cached.

use std::sync::Arc;

use crate::dispatch::{instant_key, range_key, QueryResponseEnvelope};
use crate::error::{QueryError, QueryResult};
use crate::query::{ContextQuery, ContextRow, Direction, QueryBuilder, Target, TimeWindow};
use crate::response::{
    decode_legacy_response, decode_query_response, instant_response_to_table,
    legacy_response_to_frames, peek_result_type, range_response_to_frames, DataFrame, ResultType,
};
use crate::transport::{HttpRequest, Transport};

const INSTANT_RETURNED_LOGS: &str =
    "Metrics mode does not support logs. Use an aggregation or switch to Logs mode.";

/// Executes HTTP sub-queries for one datasource instance
pub struct FallbackExecutor {
    transport: Arc<dyn Transport>,
    builder: QueryBuilder,
}

impl FallbackExecutor {
    pub fn new(transport: Arc<dyn Transport>, builder: QueryBuilder) -> Self {
        Self { transport, builder }
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    /// Modern range query, retried against the legacy API on 404
    pub async fn run_range_with_fallback(
        &self,
        target: &Target,
        window: &TimeWindow,
    ) -> QueryResult<QueryResponseEnvelope> {
        let request = self.builder.build_range(target, window).to_http();

        match self.transport.request(&request).await {
            Ok(body) => {
                let result = decode_query_response(&body)
                    .map_err(|e| QueryError::decode(e, &target.ref_id))?;
                Ok(QueryResponseEnvelope::done(
                    range_key(&target.ref_id),
                    range_response_to_frames(&result, &target.ref_id),
                ))
            }
            Err(err) if err.is_not_found() => {
                tracing::warn!(
                    ref_id = %target.ref_id,
                    "Range endpoint not found, falling back to legacy API"
                );
                self.run_legacy_query(target, window).await
            }
            Err(err) => Err(QueryError::transport(&err, &target.ref_id)),
        }
    }

    /// Modern instant query; a stream result is a mode mismatch
    pub async fn run_instant_query(
        &self,
        target: &Target,
        window: &TimeWindow,
    ) -> QueryResult<QueryResponseEnvelope> {
        let request = self.builder.build_instant(target, window).to_http();

        let body = match self.transport.request(&request).await {
            Ok(body) => body,
            Err(err) if err.is_not_found() => {
                // The legacy API has no instant endpoint; the range sub-query covers it
                tracing::warn!(
                    ref_id = %target.ref_id,
                    "Instant endpoint not found, skipping instant query"
                );
                return Ok(QueryResponseEnvelope::done(instant_key(&target.ref_id), Vec::new()));
            }
            Err(err) => return Err(QueryError::transport(&err, &target.ref_id)),
        };

        let result_type =
            peek_result_type(&body).map_err(|e| QueryError::decode(e, &target.ref_id))?;
        if result_type == ResultType::Streams {
            return Err(QueryError::ModeMismatch {
                ref_id: target.ref_id.clone(),
                message: INSTANT_RETURNED_LOGS.to_string(),
            });
        }

        let result =
            decode_query_response(&body).map_err(|e| QueryError::decode(e, &target.ref_id))?;
        Ok(QueryResponseEnvelope::done(
            instant_key(&target.ref_id),
            vec![instant_response_to_table(&result, &target.ref_id)],
        ))
    }

    /// Direct legacy query
    pub async fn run_legacy_query(
        &self,
        target: &Target,
        window: &TimeWindow,
    ) -> QueryResult<QueryResponseEnvelope> {
        let request = self.builder.build_legacy(target, window).to_http();
        let frames = self.fetch_legacy(&request, &target.ref_id).await?;
        Ok(QueryResponseEnvelope::done(range_key(&target.ref_id), frames))
    }

    /// Lines around `row`, modern API first, legacy on 404
    pub async fn run_context(
        &self,
        ref_id: &str,
        row: &ContextRow,
        direction: Direction,
        limit: usize,
    ) -> QueryResult<Vec<DataFrame>> {
        let query = ContextQuery::for_row(row, direction, limit);

        match self.transport.request(&query.to_range_http()).await {
            Ok(body) => {
                let result =
                    decode_query_response(&body).map_err(|e| QueryError::decode(e, ref_id))?;
                Ok(range_response_to_frames(&result, ref_id))
            }
            Err(err) if err.is_not_found() => {
                tracing::warn!(ref_id = %ref_id, "Context query falling back to legacy API");
                self.fetch_legacy(&query.to_legacy_http(), ref_id).await
            }
            Err(err) => Err(QueryError::transport(&err, ref_id)),
        }
    }

    async fn fetch_legacy(&self, request: &HttpRequest, ref_id: &str) -> QueryResult<Vec<DataFrame>> {
        let body = self
            .transport
            .request(request)
            .await
            .map_err(|err| QueryError::transport(&err, ref_id))?;
        let streams = decode_legacy_response(&body).map_err(|e| QueryError::decode(e, ref_id))?;
        Ok(legacy_response_to_frames(&streams, ref_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::LoadingState;
    use crate::query::{INSTANT_QUERY_PATH, LEGACY_QUERY_PATH, RANGE_QUERY_PATH};
    use crate::response::Labels;
    use crate::transport::{MockTransport, TransportError};
    use chrono::{TimeZone, Utc};

    const STREAMS_BODY: &str = r#"{"status":"success","data":{"resultType":"streams","result":[
        {"stream":{"job":"app"},"values":[["1700000000000000000","modern line"]]}]}}"#;
    const MATRIX_BODY: &str = r#"{"status":"success","data":{"resultType":"matrix","result":[
        {"metric":{"job":"app"},"values":[[1700000000,"3"]]}]}}"#;
    const VECTOR_BODY: &str = r#"{"status":"success","data":{"resultType":"vector","result":[
        {"metric":{"job":"app"},"value":[1700000000,"3"]}]}}"#;
    const LEGACY_BODY: &str = r#"{"streams":[{"labels":"{job=\"app\"}","entries":[
        {"ts":"2023-11-14T22:13:20Z","line":"legacy line"}]}]}"#;

    fn executor(transport: Arc<MockTransport>) -> FallbackExecutor {
        FallbackExecutor::new(transport, QueryBuilder::new("http://loki:3100", 1000))
    }

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            Utc.timestamp_opt(1_700_003_600, 0).unwrap(),
        )
        .interval_ms(1000)
    }

    fn first_line(envelope: &QueryResponseEnvelope) -> String {
        match &envelope.data[0] {
            DataFrame::Logs(frame) => frame.rows[0].line.clone(),
            other => panic!("Expected logs, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_range_success() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(RANGE_QUERY_PATH, STREAMS_BODY);

        let envelope = executor(transport.clone())
            .run_range_with_fallback(&Target::new("A", "{job=\"app\"}"), &window())
            .await
            .unwrap();

        assert_eq!(envelope.key, "A_log");
        assert_eq!(envelope.state, LoadingState::Done);
        assert_eq!(first_line(&envelope), "modern line");
        assert!(transport.requests_to(LEGACY_QUERY_PATH).is_empty());
    }

    #[tokio::test]
    async fn test_range_falls_back_on_not_found() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(LEGACY_QUERY_PATH, LEGACY_BODY);

        let envelope = executor(transport.clone())
            .run_range_with_fallback(&Target::new("A", "{job=\"app\"} err"), &window())
            .await
            .unwrap();

        assert_eq!(first_line(&envelope), "legacy line");
        assert_eq!(transport.requests_to(RANGE_QUERY_PATH).len(), 1);

        let legacy = transport.requests_to(LEGACY_QUERY_PATH);
        assert_eq!(legacy.len(), 1);
        assert_eq!(legacy[0].get_param("regexp"), Some("err"));
    }

    #[tokio::test]
    async fn test_fallback_is_not_cached() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(LEGACY_QUERY_PATH, LEGACY_BODY);
        let executor = executor(transport.clone());
        let target = Target::new("A", "{job=\"app\"}");

        executor.run_range_with_fallback(&target, &window()).await.unwrap();
        executor.run_range_with_fallback(&target, &window()).await.unwrap();

        assert_eq!(transport.requests_to(RANGE_QUERY_PATH).len(), 2);
        assert_eq!(transport.requests_to(LEGACY_QUERY_PATH).len(), 2);
    }

    #[tokio::test]
    async fn test_range_other_error_normalized() {
        let transport = Arc::new(MockTransport::new());
        transport.fail(
            RANGE_QUERY_PATH,
            TransportError::status(400, "Bad Request", Some(r#"{"error":"parse error"}"#.into())),
        );

        let err = executor(transport.clone())
            .run_range_with_fallback(&Target::new("B", "{job=\"app\""), &window())
            .await
            .unwrap_err();

        let domain = err.into_domain();
        assert_eq!(domain.ref_id, "B");
        assert_eq!(domain.message, "parse error");
        assert_eq!(domain.status, Some(400));
        assert!(transport.requests_to(LEGACY_QUERY_PATH).is_empty());
    }

    #[tokio::test]
    async fn test_legacy_failure_after_fallback_is_normalized() {
        let transport = Arc::new(MockTransport::new());
        transport.fail(LEGACY_QUERY_PATH, TransportError::status(502, "Bad Gateway", None));

        let err = executor(transport)
            .run_range_with_fallback(&Target::new("C", "{job=\"app\"}"), &window())
            .await
            .unwrap_err();

        assert_eq!(err.ref_id(), "C");
        assert_eq!(err.into_domain().status, Some(502));
    }

    #[tokio::test]
    async fn test_instant_returns_table() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(INSTANT_QUERY_PATH, VECTOR_BODY);

        let envelope = executor(transport)
            .run_instant_query(&Target::new("A", "count_over_time({job=\"app\"}[1m])"), &window())
            .await
            .unwrap();

        assert_eq!(envelope.key, "A_instant");
        assert_eq!(envelope.data.len(), 1);
        assert!(matches!(envelope.data[0], DataFrame::Table(_)));
    }

    #[tokio::test]
    async fn test_instant_not_found_is_empty_done() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(LEGACY_QUERY_PATH, LEGACY_BODY);

        let envelope = executor(transport.clone())
            .run_instant_query(&Target::new("A", "count_over_time({job=\"app\"}[1m])"), &window())
            .await
            .unwrap();

        assert_eq!(envelope.key, "A_instant");
        assert_eq!(envelope.state, LoadingState::Done);
        assert!(envelope.data.is_empty());
        assert_eq!(transport.requests_to(INSTANT_QUERY_PATH).len(), 1);
        assert!(transport.requests_to(LEGACY_QUERY_PATH).is_empty());
    }

    #[tokio::test]
    async fn test_instant_streams_is_mode_mismatch() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(INSTANT_QUERY_PATH, STREAMS_BODY);

        let err = executor(transport)
            .run_instant_query(&Target::new("A", "{job=\"app\"}"), &window())
            .await
            .unwrap_err();

        assert!(err.is_mode_mismatch());
        assert_eq!(err.ref_id(), "A");
    }

    #[tokio::test]
    async fn test_matrix_range_is_series() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(RANGE_QUERY_PATH, MATRIX_BODY);

        let envelope = executor(transport)
            .run_range_with_fallback(&Target::new("A", "rate({job=\"app\"}[1m])"), &window())
            .await
            .unwrap();

        assert!(envelope.data.iter().all(DataFrame::is_numeric));
    }

    #[tokio::test]
    async fn test_context_falls_back() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(LEGACY_QUERY_PATH, LEGACY_BODY);

        let mut labels = Labels::new();
        labels.insert("job".to_string(), "app".to_string());
        let row = ContextRow {
            labels,
            timestamp_ns: 1_700_000_000_000_000_000,
        };

        let frames = executor(transport.clone())
            .run_context("ctx", &row, Direction::Forward, 10)
            .await
            .unwrap();
        assert_eq!(frames.len(), 1);

        let modern = transport.requests_to(RANGE_QUERY_PATH);
        let legacy = transport.requests_to(LEGACY_QUERY_PATH);
        assert_eq!(modern[0].get_param("start"), legacy[0].get_param("start"));
        assert_eq!(legacy[0].get_param("end"), Some("1700007200000000000"));
    }
}

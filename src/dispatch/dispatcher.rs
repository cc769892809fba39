//! Query Dispatcher
//!
//! Entry point for a batch of targets. Filters and interpolates them,
//! routes each one to live, legacy, instant and/or range execution, and
//! merges every sub-execution into a single stream of envelopes in
//! arrival order.

use futures_util::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::envelope::{instant_key, live_key, range_key, QueryResponseEnvelope};
use crate::backend::{
    ApiVersion, FallbackExecutor, HealthCheck, MetadataClient, VersionResolver, VersionState,
};
use crate::config::Config;
use crate::error::{QueryError, QueryResult};
use crate::live::LiveStreamManager;
use crate::query::{
    interpolate_query_expr, ContextRow, Direction, NoopTemplates, QueryBuilder, QueryMode,
    ScopedVars, Target, TemplateEngine, TimeWindow, DEFAULT_CONTEXT_LIMIT,
};
use crate::response::DataFrame;
use crate::transport::{HttpTransport, Transport, TransportError};

const MERGE_CHANNEL_CAPACITY: usize = 64;

const LOGS_RETURNED_METRICS: &str =
    "Logs mode does not support metric queries. Remove the aggregation or switch to Metrics mode.";

/// One dispatch call
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub targets: Vec<Target>,
    pub window: TimeWindow,
    pub mode: QueryMode,
    /// Variables visible only to this call
    pub scoped_vars: ScopedVars,
}

impl QueryRequest {
    pub fn new(targets: Vec<Target>, window: TimeWindow) -> Self {
        Self {
            targets,
            window,
            ..Default::default()
        }
    }

    pub fn mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn scoped_vars(mut self, scoped_vars: ScopedVars) -> Self {
        self.scoped_vars = scoped_vars;
        self
    }
}

/// Dispatcher for one datasource instance
pub struct QueryDispatcher {
    executor: Arc<FallbackExecutor>,
    versions: Arc<VersionResolver>,
    live: Arc<LiveStreamManager>,
    metadata: MetadataClient,
    templates: Arc<dyn TemplateEngine>,
}

impl QueryDispatcher {
    /// Create a dispatcher talking to the configured Loki over HTTP
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(config.datasource.transport_config())?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Create a dispatcher over any transport
    pub fn with_transport(transport: Arc<dyn Transport>, config: &Config) -> Self {
        let builder = QueryBuilder::new(
            config.datasource.url.clone(),
            config.datasource.effective_max_lines(),
        );

        Self {
            executor: Arc::new(FallbackExecutor::new(Arc::clone(&transport), builder)),
            versions: Arc::new(VersionResolver::new(Arc::clone(&transport))),
            live: Arc::new(LiveStreamManager::new(
                Arc::clone(&transport),
                config.live.clone(),
            )),
            metadata: MetadataClient::new(transport),
            templates: Arc::new(NoopTemplates),
        }
    }

    /// Use `templates` for variable substitution
    pub fn with_templates(mut self, templates: Arc<dyn TemplateEngine>) -> Self {
        self.templates = templates;
        self
    }

    pub fn version_state(&self) -> VersionState {
        self.versions.state()
    }

    pub fn live_streams(&self) -> &LiveStreamManager {
        &self.live
    }

    /// Start every eligible target and return the merged envelope stream.
    ///
    /// Must be called from within a Tokio runtime. Dropping the returned
    /// stream cancels all in-flight work, live subscriptions included.
    pub fn query(&self, request: QueryRequest) -> DispatchStream {
        let QueryRequest {
            targets,
            window,
            mode,
            scoped_vars,
        } = request;

        let targets: Vec<Target> = targets
            .into_iter()
            .filter(Target::is_eligible)
            .map(|target| self.interpolate(target, &scoped_vars))
            .collect();

        if targets.is_empty() {
            tracing::debug!("No eligible targets");
            return DispatchStream::ready(QueryResponseEnvelope::empty());
        }

        let (sender, receiver) = mpsc::channel(MERGE_CHANNEL_CAPACITY);
        let mut tasks = JoinSet::new();

        for target in targets {
            tracing::debug!(
                ref_id = %target.ref_id,
                mode = ?mode,
                live = target.live_streaming,
                legacy = target.legacy,
                "Dispatching target"
            );

            if target.live_streaming {
                tasks.spawn(run_live(
                    Arc::clone(&self.executor),
                    Arc::clone(&self.versions),
                    Arc::clone(&self.live),
                    target,
                    window,
                    sender.clone(),
                ));
                continue;
            }

            if target.legacy {
                let executor = Arc::clone(&self.executor);
                let sender = sender.clone();
                tasks.spawn(async move {
                    let result = executor.run_legacy_query(&target, &window).await;
                    deliver(&sender, range_key(&target.ref_id), result).await;
                });
                continue;
            }

            if mode == QueryMode::Metrics {
                let executor = Arc::clone(&self.executor);
                let instant_target = target.clone();
                let instant_sender = sender.clone();
                tasks.spawn(async move {
                    let result = executor.run_instant_query(&instant_target, &window).await;
                    deliver(&instant_sender, instant_key(&instant_target.ref_id), result).await;
                });
            }

            let executor = Arc::clone(&self.executor);
            let sender = sender.clone();
            tasks.spawn(async move {
                let mut result = executor.run_range_with_fallback(&target, &window).await;
                if mode == QueryMode::Logs {
                    result = result.and_then(|envelope| reject_numeric(envelope, &target.ref_id));
                }
                deliver(&sender, range_key(&target.ref_id), result).await;
            });
        }

        DispatchStream {
            receiver,
            _tasks: tasks,
            ready: VecDeque::new(),
        }
    }

    /// Lines before or after `row`, for the target the row came from.
    ///
    /// The range is inclusive of the row's own timestamp; the row itself
    /// can appear in the result.
    pub async fn log_row_context(
        &self,
        target: &Target,
        row: &ContextRow,
        direction: Direction,
    ) -> QueryResult<Vec<DataFrame>> {
        let limit = target.context_limit.unwrap_or(DEFAULT_CONTEXT_LIMIT);
        self.executor
            .run_context(&target.ref_id, row, direction, limit)
            .await
    }

    pub async fn test_datasource(&self) -> HealthCheck {
        self.metadata.test_datasource().await
    }

    pub async fn labels(&self) -> QueryResult<Vec<String>> {
        self.metadata.labels().await
    }

    pub async fn label_values(&self, name: &str) -> QueryResult<Vec<String>> {
        self.metadata.label_values(name).await
    }

    fn interpolate(&self, mut target: Target, scoped_vars: &ScopedVars) -> Target {
        target.expression =
            self.templates
                .replace(&target.expression, scoped_vars, &interpolate_query_expr);
        target
    }
}

fn reject_numeric(envelope: QueryResponseEnvelope, ref_id: &str) -> QueryResult<QueryResponseEnvelope> {
    if envelope.data.iter().any(DataFrame::is_numeric) {
        return Err(QueryError::ModeMismatch {
            ref_id: ref_id.to_string(),
            message: LOGS_RETURNED_METRICS.to_string(),
        });
    }
    Ok(envelope)
}

/// Turn a sub-query outcome into an envelope and hand it to the merger
async fn deliver(
    sender: &mpsc::Sender<QueryResponseEnvelope>,
    key: String,
    result: QueryResult<QueryResponseEnvelope>,
) {
    let envelope = match result {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::warn!(ref_id = %err.ref_id(), key = %key, error = %err, "Sub-query failed");
            QueryResponseEnvelope::failed(key, err.into_domain())
        }
    };
    // A closed channel means the caller is gone
    let _ = sender.send(envelope).await;
}

async fn run_live(
    executor: Arc<FallbackExecutor>,
    versions: Arc<VersionResolver>,
    live: Arc<LiveStreamManager>,
    target: Target,
    window: TimeWindow,
    sender: mpsc::Sender<QueryResponseEnvelope>,
) {
    let legacy = versions.resolve().await == ApiVersion::Legacy;
    let live_target = executor.builder().build_live_target(&target, &window, legacy);
    let key = live_key(&target.ref_id);

    let mut subscription = live.subscribe(live_target);
    while let Some(item) = subscription.next().await {
        let envelope = match item {
            Ok(frame) => QueryResponseEnvelope::streaming(key.clone(), vec![frame]),
            Err(err) => QueryResponseEnvelope::failed(key.clone(), err.into_domain()),
        };
        if sender.send(envelope).await.is_err() {
            break;
        }
    }
}

/// Merged output of one dispatch call.
///
/// Yields envelopes as sub-executions produce them and ends once all of
/// them have finished. Dropping it aborts every sub-execution.
pub struct DispatchStream {
    receiver: mpsc::Receiver<QueryResponseEnvelope>,
    // Aborted on drop
    _tasks: JoinSet<()>,
    ready: VecDeque<QueryResponseEnvelope>,
}

impl DispatchStream {
    fn ready(envelope: QueryResponseEnvelope) -> Self {
        // Sender dropped immediately: the stream ends after `envelope`
        let (_, receiver) = mpsc::channel(1);
        Self {
            receiver,
            _tasks: JoinSet::new(),
            ready: VecDeque::from([envelope]),
        }
    }

    /// Next envelope, or `None` once every sub-execution has finished
    pub async fn recv(&mut self) -> Option<QueryResponseEnvelope> {
        if let Some(envelope) = self.ready.pop_front() {
            return Some(envelope);
        }
        self.receiver.recv().await
    }

    /// Drain the stream; never returns while a live target is attached
    pub async fn collect_all(mut self) -> Vec<QueryResponseEnvelope> {
        let mut envelopes = Vec::new();
        while let Some(envelope) = self.recv().await {
            envelopes.push(envelope);
        }
        envelopes
    }
}

impl Stream for DispatchStream {
    type Item = QueryResponseEnvelope;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(envelope) = this.ready.pop_front() {
            return Poll::Ready(Some(envelope));
        }
        this.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::LoadingState;
    use crate::query::{INSTANT_QUERY_PATH, LEGACY_QUERY_PATH, RANGE_QUERY_PATH};
    use crate::transport::MockTransport;
    use chrono::{TimeZone, Utc};

    const STREAMS_BODY: &str = r#"{"status":"success","data":{"resultType":"streams","result":[
        {"stream":{"job":"app"},"values":[["1700000000000000000","line"]]}]}}"#;
    const MATRIX_BODY: &str = r#"{"status":"success","data":{"resultType":"matrix","result":[
        {"metric":{"job":"app"},"values":[[1700000000,"3"]]}]}}"#;

    fn dispatcher(transport: Arc<MockTransport>) -> QueryDispatcher {
        QueryDispatcher::with_transport(transport, &Config::default())
    }

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            Utc.timestamp_opt(1_700_003_600, 0).unwrap(),
        )
        .interval_ms(1000)
    }

    #[tokio::test]
    async fn test_no_eligible_targets() {
        let transport = Arc::new(MockTransport::new());
        let targets = vec![Target::new("A", "{job=\"app\"}").hidden(), Target::new("B", "  ")];

        let envelopes = dispatcher(transport.clone())
            .query(QueryRequest::new(targets, window()))
            .collect_all()
            .await;

        assert_eq!(envelopes, vec![QueryResponseEnvelope::empty()]);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_logs_mode_rejects_numeric_result() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(RANGE_QUERY_PATH, MATRIX_BODY);

        let envelopes = dispatcher(transport)
            .query(
                QueryRequest::new(vec![Target::new("A", "rate({job=\"app\"}[1m])")], window())
                    .mode(QueryMode::Logs),
            )
            .collect_all()
            .await;

        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].key, "A_log");
        assert_eq!(envelopes[0].state, LoadingState::Error);
        assert_eq!(
            envelopes[0].error.as_ref().map(|e| e.message.as_str()),
            Some(LOGS_RETURNED_METRICS)
        );
    }

    #[tokio::test]
    async fn test_metrics_mode_runs_instant_and_range() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(RANGE_QUERY_PATH, MATRIX_BODY);
        transport.respond(
            INSTANT_QUERY_PATH,
            r#"{"status":"success","data":{"resultType":"vector","result":[
                {"metric":{"job":"app"},"value":[1700000000,"3"]}]}}"#,
        );

        let mut keys: Vec<String> = dispatcher(transport)
            .query(
                QueryRequest::new(vec![Target::new("A", "rate({job=\"app\"}[1m])")], window())
                    .mode(QueryMode::Metrics),
            )
            .collect_all()
            .await
            .into_iter()
            .map(|e| e.key)
            .collect();
        keys.sort();

        assert_eq!(keys, vec!["A_instant", "A_log"]);
    }

    #[tokio::test]
    async fn test_legacy_flag_skips_modern_api() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(RANGE_QUERY_PATH, STREAMS_BODY);
        transport.respond(LEGACY_QUERY_PATH, r#"{"streams":[]}"#);

        let envelopes = dispatcher(transport.clone())
            .query(QueryRequest::new(
                vec![Target::new("A", "{job=\"app\"}").legacy()],
                window(),
            ))
            .collect_all()
            .await;

        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].state, LoadingState::Done);
        assert!(transport.requests_to(RANGE_QUERY_PATH).is_empty());
    }

    #[tokio::test]
    async fn test_context_uses_default_limit() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(RANGE_QUERY_PATH, STREAMS_BODY);

        let row = ContextRow {
            labels: [("job".to_string(), "app".to_string())].into_iter().collect(),
            timestamp_ns: 1_700_000_000_000_000_000,
        };
        dispatcher(transport.clone())
            .log_row_context(&Target::new("A", "{job=\"app\"}"), &row, Direction::Backward)
            .await
            .unwrap();

        let requests = transport.requests_to(RANGE_QUERY_PATH);
        assert_eq!(requests[0].get_param("limit"), Some("10"));
    }
}

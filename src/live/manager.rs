//! Live Stream Manager
//!
//! Owns the tail connections. One connection per [`LiveKey`]: the first
//! subscriber opens it, later subscribers attach to it and see the same
//! batches, and the last subscriber to leave closes it. A failed
//! connection ends the stream for every attached subscriber and is never
//! reopened automatically.

use futures_util::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::error::{normalize_error, DomainError, QueryError, QueryResult};
use crate::query::{LiveKey, LiveTarget};
use crate::response::{decode_tail_message, DataFrame, LiveBuffer};
use crate::transport::{Transport, TransportError};

/// Configuration for the live stream manager
#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    /// Capacity of each connection's broadcast channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Event fanned out to the subscribers of one connection
#[derive(Debug, Clone)]
enum LiveEvent {
    /// Snapshot of the connection's row buffer
    Batch(DataFrame),
    Failed(DomainError),
}

/// One open connection
struct LiveEntry {
    sender: broadcast::Sender<LiveEvent>,
    subscribers: usize,
    latest: Option<DataFrame>,
    generation: u64,
    task: JoinHandle<()>,
}

type StreamMap = Arc<Mutex<HashMap<LiveKey, LiveEntry>>>;

fn lock(streams: &StreamMap) -> MutexGuard<'_, HashMap<LiveKey, LiveEntry>> {
    streams.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Manages shared live-tail connections
pub struct LiveStreamManager {
    transport: Arc<dyn Transport>,
    streams: StreamMap,
    config: LiveConfig,
    generations: AtomicU64,
}

impl LiveStreamManager {
    pub fn new(transport: Arc<dyn Transport>, config: LiveConfig) -> Self {
        Self {
            transport,
            streams: Arc::new(Mutex::new(HashMap::new())),
            config,
            generations: AtomicU64::new(0),
        }
    }

    /// Subscribe to `target`, opening a connection if none exists for its key.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self, target: LiveTarget) -> LiveSubscription {
        let key = target.key();
        let mut streams = lock(&self.streams);

        if let Some(entry) = streams.get_mut(&key) {
            entry.subscribers += 1;
            tracing::debug!(
                ref_id = %target.ref_id,
                url = %key.url,
                subscribers = entry.subscribers,
                "Attached to live stream"
            );
            return LiveSubscription {
                receiver: entry.sender.subscribe(),
                pending: entry.latest.clone(),
                key,
                generation: entry.generation,
                ref_id: target.ref_id,
                streams: Arc::clone(&self.streams),
                finished: false,
            };
        }

        let (sender, receiver) = broadcast::channel(self.config.channel_capacity.max(1));
        let generation = self.generations.fetch_add(1, Ordering::SeqCst);

        tracing::info!(ref_id = %target.ref_id, url = %key.url, "Opening live stream");
        let task = tokio::spawn(run_connection(
            Arc::clone(&self.transport),
            target.clone(),
            Arc::clone(&self.streams),
            generation,
        ));

        streams.insert(
            key.clone(),
            LiveEntry {
                sender,
                subscribers: 1,
                latest: None,
                generation,
                task,
            },
        );

        LiveSubscription {
            receiver,
            pending: None,
            key,
            generation,
            ref_id: target.ref_id,
            streams: Arc::clone(&self.streams),
            finished: false,
        }
    }

    /// Number of open connections
    pub fn active_streams(&self) -> usize {
        lock(&self.streams).len()
    }

    /// Subscribers attached to the connection for `key`
    pub fn subscriber_count(&self, key: &LiveKey) -> usize {
        lock(&self.streams)
            .get(key)
            .map(|entry| entry.subscribers)
            .unwrap_or(0)
    }
}

/// Publish an event if the connection is still the registered one
fn publish(streams: &StreamMap, key: &LiveKey, generation: u64, event: LiveEvent) {
    let mut streams = lock(streams);
    if let Some(entry) = streams.get_mut(key).filter(|e| e.generation == generation) {
        if let LiveEvent::Batch(frame) = &event {
            entry.latest = Some(frame.clone());
        }
        // No receivers left is fine; the last one is about to tear us down
        let _ = entry.sender.send(event);
    }
}

/// Drop the registration, closing every subscriber's channel
fn retire(streams: &StreamMap, key: &LiveKey, generation: u64) {
    let mut streams = lock(streams);
    take_registered(&mut streams, key, generation);
}

/// Publish the failure and drop the registration under one lock, so no
/// subscriber can attach to a connection that has already failed
fn fail(streams: &StreamMap, key: &LiveKey, generation: u64, error: DomainError) {
    let mut streams = lock(streams);
    if let Some(entry) = take_registered(&mut streams, key, generation) {
        let _ = entry.sender.send(LiveEvent::Failed(error));
    }
}

fn take_registered(
    streams: &mut HashMap<LiveKey, LiveEntry>,
    key: &LiveKey,
    generation: u64,
) -> Option<LiveEntry> {
    if streams
        .get(key)
        .is_some_and(|entry| entry.generation == generation)
    {
        streams.remove(key)
    } else {
        None
    }
}

async fn run_connection(
    transport: Arc<dyn Transport>,
    target: LiveTarget,
    streams: StreamMap,
    generation: u64,
) {
    let key = target.key();

    let outcome: Result<(), TransportError> = async {
        let mut socket = transport.open_socket(&target.url).await?;
        let mut buffer = LiveBuffer::new(target.ref_id.clone(), target.size_limit);

        while let Some(message) = socket.next().await {
            let text = message?;
            match decode_tail_message(&text) {
                Ok(batch) => {
                    buffer.append(&batch);
                    publish(&streams, &key, generation, LiveEvent::Batch(buffer.snapshot()));
                }
                Err(err) => {
                    tracing::warn!(url = %key.url, error = %err, "Skipping undecodable tail message");
                }
            }
        }
        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => {
            tracing::info!(url = %key.url, "Live stream ended");
            retire(&streams, &key, generation);
        }
        Err(err) => {
            tracing::warn!(url = %key.url, error = %err, "Live stream failed");
            fail(&streams, &key, generation, normalize_error(&err, &target.ref_id));
        }
    }
}

/// A consumer attached to a shared live connection.
///
/// Dropping it detaches; dropping the last one closes the connection.
pub struct LiveSubscription {
    receiver: broadcast::Receiver<LiveEvent>,
    pending: Option<DataFrame>,
    key: LiveKey,
    generation: u64,
    ref_id: String,
    streams: StreamMap,
    finished: bool,
}

impl LiveSubscription {
    pub fn key(&self) -> &LiveKey {
        &self.key
    }

    /// Next buffer snapshot, `Some(Err(..))` once on failure, then `None`
    pub async fn next(&mut self) -> Option<QueryResult<DataFrame>> {
        if let Some(frame) = self.pending.take() {
            return Some(Ok(self.own(frame)));
        }
        if self.finished {
            return None;
        }

        loop {
            match self.receiver.recv().await {
                Ok(LiveEvent::Batch(frame)) => return Some(Ok(self.own(frame))),
                Ok(LiveEvent::Failed(error)) => {
                    self.finished = true;
                    return Some(Err(QueryError::LiveConnection(DomainError {
                        ref_id: self.ref_id.clone(),
                        ..error
                    })));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(ref_id = %self.ref_id, skipped, "Live subscriber lagged");
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    fn own(&self, mut frame: DataFrame) -> DataFrame {
        frame.set_ref_id(&self.ref_id);
        frame
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        let mut streams = lock(&self.streams);
        let Some(entry) = streams
            .get_mut(&self.key)
            .filter(|entry| entry.generation == self.generation)
        else {
            return;
        };

        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0 {
            if let Some(entry) = streams.remove(&self.key) {
                entry.task.abort();
                tracing::info!(url = %self.key.url, "Closing live stream");
            }
        }
    }
}

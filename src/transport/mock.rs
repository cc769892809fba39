//! Scripted in-memory transport
//!
//! Answers requests from per-path scripted responses and hands out
//! channel-backed sockets. Every request and socket open is recorded so
//! callers can assert on network activity. Unscripted paths answer 404,
//! like a backend that does not know the endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use super::{HttpRequest, SocketStream, Transport, TransportError};

type SocketMessage = Result<String, TransportError>;

/// Scripted transport for tests and offline runs
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, Result<String, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
    sockets: Mutex<HashMap<String, mpsc::UnboundedReceiver<SocketMessage>>>,
    opened: Mutex<Vec<String>>,
    socket_opens: AtomicUsize,
    latency: Option<Duration>,
}

/// Sending side of a scripted socket
#[derive(Clone)]
pub struct SocketHandle {
    sender: mpsc::UnboundedSender<SocketMessage>,
}

impl SocketHandle {
    /// Deliver a text message to whoever opened the socket
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.sender.send(Ok(text.into())).is_ok()
    }

    /// Fail the socket with a transport error
    pub fn fail(&self, error: TransportError) -> bool {
        self.sender.send(Err(error)).is_ok()
    }

    /// True once the consumer side has been dropped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every request by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Answer every request to `path` with a 200 and `body`
    pub fn respond(&self, path: &str, body: impl Into<String>) {
        self.script(path, Ok(body.into()));
    }

    /// Answer every request to `path` with an error
    pub fn fail(&self, path: &str, error: TransportError) {
        self.script(path, Err(error));
    }

    fn script(&self, path: &str, response: Result<String, TransportError>) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(path.to_string(), response);
        }
    }

    /// Register a socket for `url`; it can be opened exactly once
    pub fn socket(&self, url: &str) -> SocketHandle {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut sockets) = self.sockets.lock() {
            sockets.insert(url.to_string(), receiver);
        }
        SocketHandle { sender }
    }

    /// All requests issued so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Requests issued to a specific path
    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|req| req.path == path)
            .collect()
    }

    /// Number of requests issued so far
    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Number of socket open attempts so far
    pub fn socket_opens(&self) -> usize {
        self.socket_opens.load(Ordering::SeqCst)
    }

    /// URLs passed to `open_socket`, in order
    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, request: &HttpRequest) -> Result<String, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = self
            .routes
            .lock()
            .ok()
            .and_then(|routes| routes.get(&request.path).cloned());

        scripted.unwrap_or_else(|| Err(TransportError::status(404, "Not Found", None)))
    }

    async fn open_socket(&self, url: &str) -> Result<SocketStream, TransportError> {
        self.socket_opens.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(url.to_string());
        }

        let receiver = self
            .sockets
            .lock()
            .ok()
            .and_then(|mut sockets| sockets.remove(url))
            .ok_or_else(|| TransportError::Socket(format!("no socket scripted for {url}")))?;

        let messages = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|message| (message, receiver))
        });

        Ok(messages.boxed())
    }
}

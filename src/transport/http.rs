//! HTTP/WebSocket transport
//!
//! `reqwest` client for the Loki HTTP API and `tokio-tungstenite` for the
//! tail endpoints.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::StreamExt;
use reqwest::Client;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use super::{HttpRequest, SocketStream, Transport, TransportError};

/// Configuration for [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base URL of the Loki server (e.g., "http://localhost:3100")
    pub base_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Optional basic auth user
    pub basic_auth_user: Option<String>,
    /// Optional basic auth password
    pub basic_auth_password: Option<String>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3100".to_string(),
            request_timeout_ms: 30_000,
            basic_auth_user: None,
            basic_auth_password: None,
        }
    }
}

/// Production transport backed by `reqwest` and `tokio-tungstenite`
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    /// Create a new transport with the given configuration
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// `Basic` credentials for the socket handshake, same as reqwest sends
    fn basic_auth_header(&self) -> Option<String> {
        let user = self.config.basic_auth_user.as_ref()?;
        let password = self.config.basic_auth_password.as_deref().unwrap_or("");
        Some(format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", user, password))
        ))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: &HttpRequest) -> Result<String, TransportError> {
        let url = self.url_for(&request.path);
        tracing::debug!(url = %url, params = ?request.params, "Loki request");

        let mut builder = self.client.get(&url).query(&request.params);
        if let Some(user) = &self.config.basic_auth_user {
            builder = builder.basic_auth(user, self.config.basic_auth_password.as_ref());
        }

        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(response.text().await?)
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(TransportError::Status {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                body: (!text.is_empty()).then_some(text),
            })
        }
    }

    async fn open_socket(&self, url: &str) -> Result<SocketStream, TransportError> {
        tracing::debug!(url = %url, "Opening tail socket");
        let mut request = url.into_client_request()?;
        if let Some(credentials) = self.basic_auth_header() {
            let value = HeaderValue::from_str(&credentials)
                .map_err(|e| TransportError::Socket(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _) = connect_async(request).await?;

        let messages = stream.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(frame = ?frame, "Tail socket closed by server");
                    None
                }
                Ok(_) => None,
                Err(err) => Some(Err(TransportError::from(err))),
            }
        });

        Ok(messages.boxed())
    }
}

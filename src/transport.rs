use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::error::TransportError;
use crate::protocol::ChatRequest;

/// Response body of an opened chat stream, chunked however the network
/// delivered it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Opens the streaming chat request. Status handling happens here: a
/// returned stream always belongs to a 2xx response.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;
}

/// Blanket impl so `Box<dyn ChatTransport>` can be handed to the engine.
#[async_trait]
impl ChatTransport for Box<dyn ChatTransport> {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        (**self).open(request).await
    }
}

/// `POST {base_url}{chat_path}` with a JSON body, reading the SSE response.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    chat_path: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            chat_path: "/api/chat".into(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_chat_path(mut self, path: impl Into<String>) -> Self {
        self.chat_path = path.into();
        self
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.chat_path)
    }
}

/// Maps a non-2xx status to its error. 503 means the agent is still starting.
pub fn classify_status(status: u16, body: String) -> TransportError {
    if status == 503 {
        TransportError::NotReady
    } else {
        TransportError::Http { status, body }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        let url = self.url();
        debug!(
            %url,
            has_session = request.session_id.is_some(),
            "opening chat stream"
        );

        let resp = self
            .client
            .post(&url)
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Stream(e.to_string())));
        Ok(Box::pin(stream))
    }
}

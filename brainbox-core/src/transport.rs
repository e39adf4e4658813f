//! Transport for the streaming chat endpoint.
//!
//! [`ChatTransport`] opens one streamed POST and yields the raw response body
//! in arrival order. [`HttpTransport`] is the `reqwest` implementation;
//! [`MockTransport`] scripts replies for tests and offline development.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::error::StreamError;
use crate::session::Session;
use crate::types::ChatRequestBody;

/// Raw response body fragments, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Opens the streamed chat request.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `body` and return the response body as a chunk stream.
    ///
    /// A non-success status must be reported here, before any body is read.
    async fn open_stream(
        &self,
        body: &ChatRequestBody,
        session: &Session,
    ) -> Result<ChunkStream, StreamError>;
}

/// `reqwest`-backed transport for `POST {base_url}/chat`.
pub struct HttpTransport {
    client: reqwest::Client,
    chat_url: String,
}

impl HttpTransport {
    /// Build a transport with its own HTTP client from backend settings.
    pub fn new(config: &BackendConfig) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| StreamError::transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, config.chat_url()))
    }

    /// Use an existing client, e.g. one shared with [`crate::api::BackendClient`].
    pub fn with_client(client: reqwest::Client, chat_url: impl Into<String>) -> Self {
        Self {
            client,
            chat_url: chat_url.into(),
        }
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open_stream(
        &self,
        body: &ChatRequestBody,
        session: &Session,
    ) -> Result<ChunkStream, StreamError> {
        debug!(
            url = self.chat_url.as_str(),
            problem_slug = body.problem_slug.as_str(),
            conversation_id = body.conversation_id.as_str(),
            "Sending streaming chat request"
        );

        let request = self
            .client
            .post(&self.chat_url)
            .header("accept", "text/plain")
            .json(body);
        let response = session
            .sign(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            // Dropping the response here closes it without reading the body.
            warn!(status = status.as_u16(), "Chat endpoint returned an error status");
            return Err(map_http_status(status));
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| {
                StreamError::transport(format!("Failed to read streaming chunk: {e}"))
            })
        });
        Ok(Box::pin(stream))
    }
}

/// Classify a non-success status from the chat endpoint.
pub fn map_http_status(status: reqwest::StatusCode) -> StreamError {
    let reason = status.canonical_reason().unwrap_or("unknown status");
    match status.as_u16() {
        429 => StreamError::RateLimited {
            status: 429,
            message: reason.to_string(),
        },
        code => StreamError::Transport {
            status: Some(code),
            message: reason.to_string(),
        },
    }
}

fn map_reqwest_error(err: reqwest::Error) -> StreamError {
    if err.is_timeout() {
        StreamError::transport(format!("Request to chat endpoint timed out: {err}"))
    } else if err.is_connect() {
        StreamError::transport(format!("Could not connect to chat endpoint: {err}"))
    } else {
        StreamError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: format!("Streaming request failed: {err}"),
        }
    }
}

/// One scripted reply of a [`MockTransport`].
pub enum MockReply {
    /// Stream these fragments, then end.
    Chunks(Vec<Result<Bytes, StreamError>>),
    /// Fail to open the stream.
    Fail(StreamError),
    /// Stream whatever is sent on the paired channel until it is closed.
    Channel(mpsc::Receiver<Result<Bytes, StreamError>>),
}

/// A scripted transport for testing and development.
///
/// Replies are consumed in order, one per `open_stream` call.
pub struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(ChatRequestBody, Session)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A transport whose next stream yields `chunks` and ends.
    pub fn with_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let transport = Self::new();
        transport.queue(MockReply::Chunks(
            chunks.into_iter().map(|c| Ok(c.into())).collect(),
        ));
        transport
    }

    /// A transport that refuses to open the stream.
    pub fn failing(error: StreamError) -> Self {
        let transport = Self::new();
        transport.queue(MockReply::Fail(error));
        transport
    }

    /// A transport fed by hand through the returned sender.
    pub fn channel(capacity: usize) -> (Self, mpsc::Sender<Result<Bytes, StreamError>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let transport = Self::new();
        transport.queue(MockReply::Channel(rx));
        (transport, tx)
    }

    pub fn queue(&self, reply: MockReply) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// Number of times a stream was requested.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The body and session of the most recent call.
    pub fn last_request(&self) -> Option<(ChatRequestBody, Session)> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn open_stream(
        &self,
        body: &ChatRequestBody,
        session: &Session,
    ) -> Result<ChunkStream, StreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((body.clone(), session.clone()));

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match reply {
            Some(MockReply::Chunks(chunks)) => Ok(Box::pin(futures::stream::iter(chunks))),
            Some(MockReply::Fail(err)) => Err(err),
            Some(MockReply::Channel(rx)) => Ok(Box::pin(ReceiverStream::new(rx))),
            None => Err(StreamError::transport("MockTransport has no scripted reply")),
        }
    }
}

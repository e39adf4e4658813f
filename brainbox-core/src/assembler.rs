//! Streaming response assembler.
//!
//! Turns the raw chunked body of one chat turn into paced incremental
//! updates for the UI and, once the stream ends, a structured
//! [`AssembledResponse`].
//!
//! The state machine lives in [`ResponseAssembly`], which is driven by
//! explicit `start` / `chunk` / `complete` / `fail` / `cancel` transitions and
//! can be used directly by event-driven callers. [`StreamingResponseAssembler`]
//! wires it to a [`ChatTransport`] and a [`Typewriter`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{ClientConfig, StreamConfig};
use crate::decode::Utf8ChunkDecoder;
use crate::error::StreamError;
use crate::extract::extract_artifacts;
use crate::pacing::Typewriter;
use crate::session::Session;
use crate::transport::{ChatTransport, HttpTransport};
use crate::types::{AssembledResponse, ChatRequestBody, StreamRequest};

/// Lifecycle of one streamed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssemblyState {
    Idle,
    Validating,
    Connecting,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl AssemblyState {
    /// No transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for AssemblyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Receives the output of a turn.
///
/// Once a turn is cancelled no method is called again.
pub trait AssemblyObserver: Send + Sync {
    /// The text received so far. Each call extends the previous one.
    fn on_progress(&self, partial_text: &str);

    /// The turn failed. Called at most once.
    fn on_error(&self, error: &StreamError);

    /// The assembly moved to a new state. Default is a no-op.
    fn on_state_change(&self, _state: AssemblyState) {}
}

/// Observer that ignores everything.
pub struct NoOpObserver;

impl AssemblyObserver for NoOpObserver {
    fn on_progress(&self, _partial_text: &str) {}
    fn on_error(&self, _error: &StreamError) {}
}

/// Observer built from two closures.
pub struct FnObserver<P, E> {
    on_progress: P,
    on_error: E,
}

impl<P, E> FnObserver<P, E>
where
    P: Fn(&str) + Send + Sync,
    E: Fn(&StreamError) + Send + Sync,
{
    pub fn new(on_progress: P, on_error: E) -> Self {
        Self {
            on_progress,
            on_error,
        }
    }
}

impl<P, E> AssemblyObserver for FnObserver<P, E>
where
    P: Fn(&str) + Send + Sync,
    E: Fn(&StreamError) + Send + Sync,
{
    fn on_progress(&self, partial_text: &str) {
        (self.on_progress)(partial_text)
    }

    fn on_error(&self, error: &StreamError) {
        (self.on_error)(error)
    }
}

/// Observer that records every call, for tests and diagnostics.
#[derive(Default)]
pub struct RecordingObserver {
    progress: Mutex<Vec<String>>,
    errors: Mutex<Vec<StreamError>>,
    states: Mutex<Vec<AssemblyState>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> Vec<String> {
        self.progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn errors(&self) -> Vec<StreamError> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn states(&self) -> Vec<AssemblyState> {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The most recent progress text, if any was delivered.
    pub fn last_progress(&self) -> Option<String> {
        self.progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl AssemblyObserver for RecordingObserver {
    fn on_progress(&self, partial_text: &str) {
        self.progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(partial_text.to_string());
    }

    fn on_error(&self, error: &StreamError) {
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(error.clone());
    }

    fn on_state_change(&self, state: AssemblyState) {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(state);
    }
}

/// Event-driven state machine for one turn.
///
/// Transitions that arrive in the wrong state, or after cancellation, are
/// ignored. Cancellation is observed through the shared token, which is
/// checked again right before every observer call. A `cancel()` from another
/// thread can still race with a callback that has already begun; once the
/// assembly has observed the cancel, no observer method runs again.
pub struct ResponseAssembly<'a> {
    observer: &'a dyn AssemblyObserver,
    cancel: CancellationToken,
    code_language: String,
    state: AssemblyState,
    decoder: Utf8ChunkDecoder,
    text: String,
}

impl<'a> ResponseAssembly<'a> {
    pub fn new(
        observer: &'a dyn AssemblyObserver,
        code_language: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            observer,
            cancel,
            code_language: code_language.into(),
            state: AssemblyState::Idle,
            decoder: Utf8ChunkDecoder::new(),
            text: String::new(),
        }
    }

    pub fn state(&self) -> AssemblyState {
        if self.cancel.is_cancelled() && !self.state.is_terminal() {
            AssemblyState::Cancelled
        } else {
            self.state
        }
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    fn is_live(&mut self) -> bool {
        if self.cancel.is_cancelled() && !self.state.is_terminal() {
            debug!(from = %self.state, "Response assembly cancelled");
            self.state = AssemblyState::Cancelled;
        }
        !self.state.is_terminal()
    }

    fn transition(&mut self, next: AssemblyState) {
        trace!(from = %self.state, to = %next, "Response assembly transition");
        self.state = next;
        self.observer.on_state_change(next);
    }

    /// Validate the request. On success the assembly waits for a connection.
    pub fn start(&mut self, request: &StreamRequest) -> Result<ChatRequestBody, StreamError> {
        if !self.is_live() {
            return Err(StreamError::Cancelled);
        }
        if self.state != AssemblyState::Idle {
            return Err(StreamError::InvalidState {
                action: "start",
                state: self.state,
            });
        }
        self.transition(AssemblyState::Validating);
        match request.validate() {
            Ok(body) => {
                self.transition(AssemblyState::Connecting);
                Ok(body)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// The transport opened the stream.
    pub fn connected(&mut self) {
        if self.is_live() && self.state == AssemblyState::Connecting {
            self.transition(AssemblyState::Streaming);
        }
    }

    /// Decode one raw chunk. Returns the text ready to be emitted.
    ///
    /// Returns an empty string outside the streaming state.
    pub fn chunk(&mut self, bytes: &[u8]) -> String {
        if !self.is_live() || self.state != AssemblyState::Streaming {
            return String::new();
        }
        self.decoder.push(bytes)
    }

    /// Append decoded text and flush the new prefix to the observer.
    ///
    /// Returns `false` once the assembly no longer accepts text.
    pub fn push_text(&mut self, text: &str) -> bool {
        if !self.is_live() || self.state != AssemblyState::Streaming {
            return false;
        }
        if text.is_empty() {
            return true;
        }
        self.text.push_str(text);
        if !self.is_live() {
            return false;
        }
        self.observer.on_progress(&self.text);
        true
    }

    /// End of stream: flush held-back bytes and extract artifacts.
    ///
    /// Returns `None` if the assembly was not streaming.
    pub fn complete(&mut self) -> Option<AssembledResponse> {
        if !self.is_live() || self.state != AssemblyState::Streaming {
            return None;
        }
        let tail = self.decoder.finish();
        self.push_text(&tail);

        let artifacts = extract_artifacts(&self.text, &self.code_language);
        self.transition(AssemblyState::Completed);
        Some(AssembledResponse {
            full_text: self.text.clone(),
            extracted_code: artifacts.code,
            extracted_hints: artifacts.hints,
        })
    }

    /// Fail the turn. The observer hears about it only on the first failure.
    pub fn fail(&mut self, error: StreamError) -> StreamError {
        if self.is_live() {
            self.transition(AssemblyState::Failed);
            if !self.cancel.is_cancelled() {
                self.observer.on_error(&error);
            }
        }
        error
    }

    /// Stop the turn. Every later transition is a no-op.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.is_live();
    }
}

/// Tunables for [`StreamingResponseAssembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerOptions {
    /// Delay between characters. Zero emits each chunk as one update.
    pub char_delay: Duration,
    /// Language tag of the fenced block extracted as code.
    pub code_language: String,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

impl From<&StreamConfig> for AssemblerOptions {
    fn from(config: &StreamConfig) -> Self {
        Self {
            char_delay: config.char_delay(),
            code_language: config.code_language.clone(),
        }
    }
}

/// Runs one chat turn against a transport.
///
/// A cancelled assembler stays cancelled until [`reset_cancellation`] is
/// called.
///
/// [`reset_cancellation`]: StreamingResponseAssembler::reset_cancellation
pub struct StreamingResponseAssembler {
    transport: Arc<dyn ChatTransport>,
    options: AssemblerOptions,
    cancellation: CancellationToken,
}

impl StreamingResponseAssembler {
    pub fn new(transport: Arc<dyn ChatTransport>, options: AssemblerOptions) -> Self {
        Self {
            transport,
            options,
            cancellation: CancellationToken::new(),
        }
    }

    /// Assembler talking HTTP to the configured backend.
    pub fn from_config(config: &ClientConfig) -> Result<Self, StreamError> {
        let transport = HttpTransport::new(&config.backend)?;
        Ok(Self::new(
            Arc::new(transport),
            AssemblerOptions::from(&config.stream),
        ))
    }

    pub fn options(&self) -> &AssemblerOptions {
        &self.options
    }

    /// Stop the running turn: no more characters, the connection is dropped,
    /// and the observer is never called again.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Token that cancels this assembler, for use from another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Allow another turn after a cancellation.
    pub fn reset_cancellation(&mut self) {
        self.cancellation = CancellationToken::new();
    }

    /// Stream one turn.
    ///
    /// Progress goes to `observer.on_progress`; a failure is reported once to
    /// `observer.on_error` and returned. After cancellation the future
    /// resolves with [`StreamError::Cancelled`] without notifying the
    /// observer.
    pub async fn run(
        &self,
        request: &StreamRequest,
        session: &Session,
        observer: &dyn AssemblyObserver,
    ) -> Result<AssembledResponse, StreamError> {
        let cancel = self.cancellation.clone();
        let mut assembly =
            ResponseAssembly::new(observer, self.options.code_language.clone(), cancel.clone());

        let body = assembly.start(request).inspect_err(|e| {
            if !e.is_cancelled() {
                warn!(error = %e, "Rejected chat request before sending");
            }
        })?;

        info!(
            problem_slug = body.problem_slug.as_str(),
            conversation_id = body.conversation_id.as_str(),
            user_id = session.user_id.as_str(),
            "Opening chat stream"
        );

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                assembly.cancel();
                debug!("Chat stream cancelled while connecting");
                return Err(StreamError::Cancelled);
            }
            opened = self.transport.open_stream(&body, session) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, status = ?err.status(), "Failed to open chat stream");
                return Err(assembly.fail(err));
            }
        };
        assembly.connected();

        let mut typewriter = Typewriter::new(self.options.char_delay);
        let mut chunks = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = stream.next() => Some(next),
            };
            let Some(next) = next else {
                assembly.cancel();
                debug!(chunks, "Chat stream cancelled");
                return Err(StreamError::Cancelled);
            };

            match next {
                Some(Ok(bytes)) => {
                    chunks += 1;
                    trace!(chunk = chunks, bytes = bytes.len(), "Received chat chunk");
                    let text = assembly.chunk(&bytes);
                    if let Err(err) = typewriter
                        .type_out(&text, &cancel, |piece| assembly.push_text(piece))
                        .await
                    {
                        assembly.cancel();
                        debug!(chunks, "Chat stream cancelled during pacing");
                        return Err(err);
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, chunks, "Chat stream broke off");
                    return Err(assembly.fail(err));
                }
                None => break,
            }
        }

        match assembly.complete() {
            Some(response) => {
                info!(
                    chunks,
                    chars = response.full_text.chars().count(),
                    has_code = response.extracted_code.is_some(),
                    hints = response.extracted_hints.len(),
                    "Chat stream completed"
                );
                Ok(response)
            }
            None => Err(StreamError::Cancelled),
        }
    }
}

//! Typewriter pacing of already-received text.
//!
//! Each character waits on a timer raced against the stream's cancellation
//! token, so a cancel interrupts the loop between two characters.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::StreamError;

/// Re-emits text one character at a time with a fixed delay.
#[derive(Debug, Clone)]
pub struct Typewriter {
    delay: Duration,
    started: bool,
}

impl Typewriter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: false,
        }
    }

    /// Whether characters are emitted individually.
    pub fn is_paced(&self) -> bool {
        !self.delay.is_zero()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Feed `text` to `emit`, one character per call when paced.
    ///
    /// The very first character of a stream is emitted without waiting. With a
    /// zero delay the whole text goes out in a single call. `emit` returns
    /// `false` when the receiver no longer accepts text, which stops the loop
    /// as a cancellation.
    pub async fn type_out<F>(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        mut emit: F,
    ) -> Result<(), StreamError>
    where
        F: FnMut(&str) -> bool,
    {
        if text.is_empty() {
            return Ok(());
        }

        if !self.is_paced() {
            if cancel.is_cancelled() || !emit(text) {
                return Err(StreamError::Cancelled);
            }
            self.started = true;
            return Ok(());
        }

        let mut buf = [0u8; 4];
        for ch in text.chars() {
            if self.started {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
            if cancel.is_cancelled() || !emit(ch.encode_utf8(&mut buf)) {
                return Err(StreamError::Cancelled);
            }
            self.started = true;
        }
        Ok(())
    }
}

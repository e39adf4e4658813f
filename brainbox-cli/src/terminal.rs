//! Terminal rendering of streamed tutor answers.

use brainbox_core::error::StreamError;
use brainbox_core::{
    AssembledResponse, AssemblyObserver, HintBoard, Session, StreamRequest,
    StreamingResponseAssembler,
};
use std::io::{self, Write};
use std::sync::Mutex;

/// Prints each progress update's new suffix to stdout.
///
/// Progress callbacks carry the whole text so far; only the part not yet
/// shown is written.
pub(crate) struct TerminalObserver {
    shown: Mutex<usize>,
}

impl TerminalObserver {
    pub(crate) fn new() -> Self {
        Self {
            shown: Mutex::new(0),
        }
    }

    /// Whether anything was written for this turn.
    pub(crate) fn printed_anything(&self) -> bool {
        *self.shown.lock().unwrap_or_else(|e| e.into_inner()) > 0
    }
}

impl AssemblyObserver for TerminalObserver {
    fn on_progress(&self, text: &str) {
        let mut shown = self.shown.lock().unwrap_or_else(|e| e.into_inner());
        let suffix = unseen_suffix(text, *shown);
        if suffix.is_empty() {
            return;
        }
        print!("{}", suffix);
        let _ = io::stdout().flush();
        *shown = text.len();
    }

    fn on_error(&self, error: &StreamError) {
        tracing::debug!(error = %error, "Chat turn failed");
        eprintln!("\n\x1b[31m{}\x1b[0m", user_message(error));
    }
}

/// The part of `text` beyond the first `shown` bytes.
pub(crate) fn unseen_suffix(text: &str, shown: usize) -> &str {
    text.get(shown..).unwrap_or("")
}

/// What the student sees when a turn fails.
pub(crate) fn user_message(error: &StreamError) -> String {
    match error {
        StreamError::RateLimited { .. } => {
            "You're sending messages too fast. Please wait a moment and try again.".to_string()
        }
        StreamError::MissingContext { reason } => format!("Can't ask that yet: {}.", reason),
        StreamError::Transport {
            status: Some(401 | 403),
            ..
        } => "You're not signed in, or your session has expired. \
              Run `brainbox login <username>` or set backend.token."
            .to_string(),
        StreamError::Transport { .. } => {
            "Something went wrong reaching BrainBox. Check your connection and try again."
                .to_string()
        }
        StreamError::Cancelled => "Stopped.".to_string(),
        StreamError::InvalidState { .. } => {
            "That answer is still in progress. Please try again.".to_string()
        }
    }
}

/// A failure that has already been shown to the user.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub(crate) struct Reported(pub(crate) StreamError);

/// Stream one answer to the terminal.
///
/// Ctrl-C cancels the turn. Returns `Ok(None)` when cancelled; other
/// failures have already been shown by the observer.
pub(crate) async fn stream_answer(
    assembler: &StreamingResponseAssembler,
    request: &StreamRequest,
    session: &Session,
) -> Result<Option<AssembledResponse>, StreamError> {
    let token = assembler.cancellation_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let observer = TerminalObserver::new();
    println!("\x1b[32mBrainBox:\x1b[0m");
    let result = assembler.run(request, session, &observer).await;
    watcher.abort();
    if observer.printed_anything() {
        println!();
    }

    match result {
        Ok(response) => Ok(Some(response)),
        Err(StreamError::Cancelled) => {
            println!("\x1b[90m[{}]\x1b[0m", user_message(&StreamError::Cancelled));
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Show the extracted code and any hints not seen before.
pub(crate) fn print_artifacts(response: &AssembledResponse, language: &str, board: &mut HintBoard) {
    if let Some(code) = &response.extracted_code {
        println!("\n\x1b[36m--- {} code ---\x1b[0m", language);
        println!("{}", code.trim_matches('\n'));
        println!("\x1b[36m---\x1b[0m");
    }
    let before = board.len();
    let added = board.extend(response.extracted_hints.iter().cloned());
    if added > 0 {
        println!(
            "\n\x1b[33m{} new hint(s) saved ({} total). Use /hints to review.\x1b[0m",
            added,
            before + added
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unseen_suffix() {
        assert_eq!(unseen_suffix("Think about", 0), "Think about");
        assert_eq!(unseen_suffix("Think about", 6), "about");
        assert_eq!(unseen_suffix("Think", 5), "");
        assert_eq!(unseen_suffix("abc", 10), "");
    }

    #[test]
    fn test_unseen_suffix_off_char_boundary_is_empty() {
        // 'é' is two bytes; a stale offset inside it prints nothing.
        assert_eq!(unseen_suffix("é", 1), "");
    }

    #[test]
    fn test_rate_limit_message() {
        let err = StreamError::RateLimited {
            status: 429,
            message: "Too Many Requests".into(),
        };
        assert_eq!(
            user_message(&err),
            "You're sending messages too fast. Please wait a moment and try again."
        );
    }

    #[test]
    fn test_transport_message_is_generic() {
        let with_status = StreamError::Transport {
            status: Some(500),
            message: "Internal Server Error".into(),
        };
        let without = StreamError::transport("connection refused");
        assert_eq!(user_message(&with_status), user_message(&without));
        assert!(!user_message(&without).contains("refused"));
    }

    #[test]
    fn test_unauthorized_chat_points_to_login() {
        for status in [401, 403] {
            let err = StreamError::Transport {
                status: Some(status),
                message: "Unauthorized".into(),
            };
            let message = user_message(&err);
            assert!(message.contains("brainbox login"), "{message}");
            assert!(!message.contains("connection"));
        }
    }

    #[test]
    fn test_reported_error_is_recognised_through_anyhow() {
        let err = anyhow::Error::new(Reported(StreamError::transport("reset")));
        assert!(err.is::<Reported>());
    }

    #[test]
    fn test_missing_context_message_names_reason() {
        let err = StreamError::MissingContext {
            reason: "no problem selected".into(),
        };
        assert_eq!(user_message(&err), "Can't ask that yet: no problem selected.");
    }

    #[test]
    fn test_observer_tracks_printed_length() {
        let observer = TerminalObserver::new();
        assert!(!observer.printed_anything());
        observer.on_progress("Hi");
        observer.on_progress("Hi there");
        assert_eq!(*observer.shown.lock().unwrap(), "Hi there".len());
        assert!(observer.printed_anything());
    }
}

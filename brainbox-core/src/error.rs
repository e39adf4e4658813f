//! Error types for the BrainBox client core.
//!
//! Uses `thiserror` for public API error types, split by domain: the
//! streaming assembler, the REST endpoints, and configuration.

use std::path::PathBuf;

use crate::assembler::AssemblyState;

/// Top-level error type for the BrainBox core library.
#[derive(Debug, thiserror::Error)]
pub enum BrainboxError {
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by the streaming response assembler.
///
/// `RateLimited` is a specialization of a transport failure; use
/// [`StreamError::is_transport`] to branch on "any connectivity problem".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Missing context: {reason}")]
    MissingContext { reason: String },

    #[error("Transport error{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("Rate limited by backend (HTTP {status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("Stream was cancelled")]
    Cancelled,

    /// A transition was requested that the assembly cannot take from `state`.
    #[error("Cannot {action} a stream that is already {state}")]
    InvalidState {
        action: &'static str,
        state: AssemblyState,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl StreamError {
    /// Build a transport error with no upstream status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Whether this error came from the connection or the upstream response.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::RateLimited { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The upstream HTTP status, when the backend produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            Self::RateLimited { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors from the non-streaming backend endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Not authorized for {endpoint}")]
    Unauthorized { endpoint: String },

    #[error("Incorrect username or password")]
    InvalidCredentials,

    /// The backend refused the request as malformed (HTTP 400).
    #[error("Rejected by {endpoint}: {detail}")]
    Rejected { endpoint: String, detail: String },

    #[error("Rate limited on {endpoint}")]
    RateLimited { endpoint: String },

    #[error("HTTP {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },

    #[error("Failed to access {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// A type alias for results using the top-level `BrainboxError`.
pub type Result<T> = std::result::Result<T, BrainboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_missing_context() {
        let err = BrainboxError::Stream(StreamError::MissingContext {
            reason: "question is empty".into(),
        });
        assert_eq!(
            err.to_string(),
            "Stream error: Missing context: question is empty"
        );
    }

    #[test]
    fn test_transport_display_with_and_without_status() {
        let err = StreamError::Transport {
            status: Some(502),
            message: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "Transport error (HTTP 502): bad gateway");

        let err = StreamError::transport("connection refused");
        assert_eq!(err.to_string(), "Transport error: connection refused");
    }

    #[test]
    fn test_rate_limited_is_a_transport_error() {
        let err = StreamError::RateLimited {
            status: 429,
            message: "Too many requests.".into(),
        };
        assert!(err.is_transport());
        assert!(err.is_rate_limited());
        assert_eq!(err.status(), Some(429));

        let err = StreamError::MissingContext {
            reason: "no problem selected".into(),
        };
        assert!(!err.is_transport());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_invalid_state_is_not_a_transport_error() {
        let err = StreamError::InvalidState {
            action: "start",
            state: AssemblyState::Streaming,
        };
        assert!(!err.is_transport());
        assert_eq!(err.status(), None);
        assert_eq!(
            err.to_string(),
            "Cannot start a stream that is already streaming"
        );
    }

    #[test]
    fn test_api_error_variants() {
        let err = ApiError::Status {
            endpoint: "/conversations".into(),
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "HTTP 500 from /conversations: boom");

        let err = BrainboxError::from(ApiError::NotFound {
            resource: "problem two-sum".into(),
        });
        assert_eq!(err.to_string(), "API error: Not found: problem two-sum");

        let err = ApiError::Rejected {
            endpoint: "/signup".into(),
            detail: "Username already registered".into(),
        };
        assert_eq!(
            err.to_string(),
            "Rejected by /signup: Username already registered"
        );
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: BrainboxError = serde_err.into();
        assert!(matches!(err, BrainboxError::Serialization(_)));
    }
}

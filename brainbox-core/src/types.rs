//! Core types shared by the assembler, the transport, and the backend client.

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// One outgoing chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// The user's question. Must be non-empty after trimming.
    pub question: String,
    /// The problem slug the question is about.
    pub problem_context: Option<String>,
    /// Conversation the turn belongs to.
    pub conversation_id: String,
}

impl StreamRequest {
    pub fn new(
        question: impl Into<String>,
        problem_context: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            problem_context: Some(problem_context.into()),
            conversation_id: conversation_id.into(),
        }
    }

    /// Check the request before any network call is made.
    ///
    /// Returns the wire body on success.
    pub fn validate(&self) -> Result<ChatRequestBody, StreamError> {
        if self.question.trim().is_empty() {
            return Err(StreamError::MissingContext {
                reason: "question is empty".into(),
            });
        }
        let problem_slug = match self.problem_context.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slug.to_string(),
            _ => {
                return Err(StreamError::MissingContext {
                    reason: "no problem selected".into(),
                });
            }
        };
        if self.conversation_id.trim().is_empty() {
            return Err(StreamError::MissingContext {
                reason: "no active conversation".into(),
            });
        }
        Ok(ChatRequestBody {
            question: self.question.clone(),
            problem_slug,
            conversation_id: self.conversation_id.clone(),
        })
    }
}

/// JSON body posted to the chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequestBody {
    pub question: String,
    pub problem_slug: String,
    pub conversation_id: String,
}

/// The final result of one streamed turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledResponse {
    /// Concatenation of every chunk in arrival order.
    pub full_text: String,
    /// First tagged code block, when the text announces a code example.
    pub extracted_code: Option<String>,
    pub extracted_hints: Vec<String>,
}

/// Full problem details from `/fetch-problem/{slug}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub title: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Short problem view from `/fetch-problem-summary/{slug}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemSummary {
    pub description: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// One stored question/response pair of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub question: String,
    pub response: String,
}

/// A conversation as listed by `/conversations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub title: String,
    #[serde(default)]
    pub last_message: String,
    /// ISO-8601 timestamp as stored by the backend.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub problem_slug: Option<String>,
}

/// Username and password for `/signup` and `/token`.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Bearer token issued by `/token`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Acknowledgement from `/signup` and the conversation edit endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub message: String,
    /// The stored title, echoed back by a rename.
    #[serde(default)]
    pub title: Option<String>,
}

//! Client for the non-streaming backend endpoints.
//!
//! Problem data and sign-up/login are public; history and conversation
//! endpoints are signed with the caller's [`Session`]. Path parameters are
//! percent-encoded as single segments.

use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::BackendConfig;
use crate::error::ApiError;
use crate::session::Session;
use crate::types::{
    Acknowledgement, ConversationSummary, Credentials, HistoryEntry, Problem, ProblemSummary,
    Token,
};

/// Timeout for a whole non-streaming request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST client for accounts, problem data, history, and conversations.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Request {
                endpoint: config.base_url.clone(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self::with_client(client, config.base_url.clone()))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /signup`
    pub async fn signup(&self, credentials: &Credentials) -> Result<Acknowledgement, ApiError> {
        let (request, endpoint) = self.request(Method::POST, &["signup"], None)?;
        info!(username = credentials.username.as_str(), "Creating account");
        self.send(request.json(credentials), &endpoint, "account")
            .await
    }

    /// `POST /token` with an OAuth2 password form.
    pub async fn login(&self, credentials: &Credentials) -> Result<Token, ApiError> {
        let (request, endpoint) = self.request(Method::POST, &["token"], None)?;
        let form = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
        ];
        match self.send(request.form(&form), &endpoint, "token").await {
            Err(ApiError::Unauthorized { .. }) => Err(ApiError::InvalidCredentials),
            other => other,
        }
    }

    /// `GET /fetch-problem/{slug}`
    pub async fn fetch_problem(&self, slug: &str) -> Result<Problem, ApiError> {
        let (request, endpoint) = self.request(Method::GET, &["fetch-problem", slug], None)?;
        self.send(request, &endpoint, &format!("problem {slug}"))
            .await
    }

    /// `GET /fetch-problem-summary/{slug}`
    pub async fn fetch_problem_summary(&self, slug: &str) -> Result<ProblemSummary, ApiError> {
        let (request, endpoint) =
            self.request(Method::GET, &["fetch-problem-summary", slug], None)?;
        self.send(request, &endpoint, &format!("problem summary {slug}"))
            .await
    }

    /// `GET /history/{conversation_id}`
    pub async fn fetch_history(
        &self,
        conversation_id: &str,
        session: &Session,
    ) -> Result<Vec<HistoryEntry>, ApiError> {
        let (request, endpoint) =
            self.request(Method::GET, &["history", conversation_id], Some(session))?;
        self.send(request, &endpoint, &format!("conversation {conversation_id}"))
            .await
    }

    /// `PATCH /history/{conversation_id}` with the new title.
    pub async fn rename_conversation(
        &self,
        conversation_id: &str,
        title: &str,
        session: &Session,
    ) -> Result<Acknowledgement, ApiError> {
        let (request, endpoint) =
            self.request(Method::PATCH, &["history", conversation_id], Some(session))?;
        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::Rejected {
                endpoint,
                detail: "Title is required".to_string(),
            });
        }
        let body = serde_json::json!({ "title": title });
        self.send(
            request.json(&body),
            &endpoint,
            &format!("conversation {conversation_id}"),
        )
        .await
    }

    /// `DELETE /history/{conversation_id}`
    ///
    /// The backend acknowledges unknown ids as well.
    pub async fn delete_conversation(
        &self,
        conversation_id: &str,
        session: &Session,
    ) -> Result<Acknowledgement, ApiError> {
        let (request, endpoint) =
            self.request(Method::DELETE, &["history", conversation_id], Some(session))?;
        self.send(request, &endpoint, &format!("conversation {conversation_id}"))
            .await
    }

    /// `GET /conversations`
    pub async fn list_conversations(
        &self,
        session: &Session,
    ) -> Result<Vec<ConversationSummary>, ApiError> {
        let (request, endpoint) = self.request(Method::GET, &["conversations"], Some(session))?;
        self.send(request, &endpoint, "conversations").await
    }

    /// URL of `segments` below the base URL, each one percent-encoded.
    fn endpoint_url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let invalid = |message: String| ApiError::Request {
            endpoint: self.base_url.clone(),
            message,
        };
        let mut url =
            Url::parse(&self.base_url).map_err(|e| invalid(format!("invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| invalid("base URL cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(
        &self,
        method: Method,
        segments: &[&str],
        session: Option<&Session>,
    ) -> Result<(RequestBuilder, String), ApiError> {
        let url = self.endpoint_url(segments)?;
        let endpoint = url.path().to_string();
        debug!(method = %method, url = url.as_str(), "Sending backend request");
        let mut request = self.client.request(method, url);
        if let Some(session) = session {
            request = session.sign(request);
        }
        Ok((request, endpoint))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &str,
        resource: &str,
    ) -> Result<T, ApiError> {
        let response = request.send().await.map_err(|e| ApiError::Request {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), endpoint, "Backend request failed");
            return Err(map_http_error(status, endpoint, resource, body));
        }

        let text = response.text().await.map_err(|e| ApiError::Request {
            endpoint: endpoint.to_string(),
            message: format!("failed to read body: {e}"),
        })?;
        serde_json::from_str(&text).map_err(|e| ApiError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

fn map_http_error(
    status: reqwest::StatusCode,
    endpoint: &str,
    resource: &str,
    body: String,
) -> ApiError {
    match status.as_u16() {
        400 | 422 => ApiError::Rejected {
            endpoint: endpoint.to_string(),
            detail: error_detail(&body),
        },
        401 | 403 => ApiError::Unauthorized {
            endpoint: endpoint.to_string(),
        },
        404 => ApiError::NotFound {
            resource: resource.to_string(),
        },
        429 => ApiError::RateLimited {
            endpoint: endpoint.to_string(),
        },
        code => ApiError::Status {
            endpoint: endpoint.to_string(),
            status: code,
            body,
        },
    }
}

/// The `detail` string of an error body, or the trimmed body itself.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

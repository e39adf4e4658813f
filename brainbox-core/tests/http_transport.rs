//! Tests for the HTTP transport and backend client against a local axum server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use brainbox_core::assembler::{AssemblerOptions, RecordingObserver};
use brainbox_core::config::BackendConfig;
use brainbox_core::error::{ApiError, StreamError};
use brainbox_core::transport::HttpTransport;
use brainbox_core::types::Credentials;
use brainbox_core::{BackendClient, Session, StreamRequest, StreamingResponseAssembler};
use bytes::Bytes;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::collections::HashMap;

#[derive(Clone, Default)]
struct Recorded {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn chat(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    rec.auth.lock().unwrap().push(bearer(&headers));
    rec.bodies.lock().unwrap().push(body);

    let crab = "🦀".as_bytes();
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from_static(b"Here's a hint ")),
        Ok(Bytes::copy_from_slice(&crab[..1])),
        Ok(Bytes::copy_from_slice(&crab[1..])),
        Ok(Bytes::from_static(b": use a dictionary.")),
    ];
    Response::builder()
        .header("content-type", "text/plain")
        .body(Body::from_stream(futures::stream::iter(chunks)))
        .unwrap()
}

async fn chat_rate_limited() -> impl IntoResponse {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({"detail": "Too many requests."})),
    )
}

async fn chat_broken() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "GEMINI_API_KEY not set")
}

async fn fetch_problem(Path(slug): Path<String>) -> Response {
    if slug != "two-sum" {
        return (StatusCode::NOT_FOUND, "unknown problem").into_response();
    }
    Json(json!({
        "title": "Two Sum",
        "platform": "LeetCode",
        "difficulty": "Easy",
        "tags": ["Array", "Hash Table"],
        "description": "Given an array of integers nums and an integer target...",
    }))
    .into_response()
}

async fn fetch_summary(Path(_slug): Path<String>) -> impl IntoResponse {
    Json(json!({
        "description": "Given an array... Example 1: ... Example 2: ...",
        "examples": ["1: ...", "2: ..."],
    }))
}

async fn conversations(headers: HeaderMap) -> Response {
    if bearer(&headers).as_deref() != Some("Bearer secret") {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    }
    Json(json!([
        {
            "conversation_id": "c1",
            "title": "Two Sum",
            "last_message": "Try a hash map",
            "timestamp": "2025-01-02T03:04:05",
            "problem_slug": "two-sum",
        }
    ]))
    .into_response()
}

async fn history(Path(id): Path<String>) -> impl IntoResponse {
    Json(json!([
        {"question": format!("first question in {id}"), "response": "first answer"},
        {"question": "second", "response": "second answer"},
    ]))
}

async fn signup(Json(body): Json<Value>) -> Response {
    if body["username"] == "taken" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Username already registered"})),
        )
            .into_response();
    }
    (
        StatusCode::CREATED,
        Json(json!({"message": "User created successfully"})),
    )
        .into_response()
}

async fn token(Form(form): Form<HashMap<String, String>>) -> Response {
    let username = form.get("username").map(String::as_str);
    let password = form.get("password").map(String::as_str);
    if username == Some("ada") && password == Some("lovelace") {
        return Json(json!({"access_token": "secret", "token_type": "bearer"})).into_response();
    }
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Incorrect username or password"})),
    )
        .into_response()
}

async fn rename(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if bearer(&headers).as_deref() != Some("Bearer secret") {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    }
    if id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Conversation not found"})),
        )
            .into_response();
    }
    Json(json!({"message": "Conversation renamed", "title": body["title"]})).into_response()
}

async fn delete_history(headers: HeaderMap, Path(id): Path<String>) -> Response {
    if bearer(&headers).as_deref() != Some("Bearer secret") {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    }
    let message = format!("Deleted 2 messages for conversation {id}");
    Json(json!({ "message": message })).into_response()
}

async fn spawn_server(recorded: Recorded) -> String {
    let app = Router::new()
        .route("/chat", post(chat))
        .route("/limited/chat", post(chat_rate_limited))
        .route("/broken/chat", post(chat_broken))
        .route("/fetch-problem/{slug}", get(fetch_problem))
        .route("/fetch-problem-summary/{slug}", get(fetch_summary))
        .route("/conversations", get(conversations))
        .route(
            "/history/{id}",
            get(history).patch(rename).delete(delete_history),
        )
        .route("/signup", post(signup))
        .route("/token", post(token))
        .with_state(recorded);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn assembler_for(chat_url: String) -> StreamingResponseAssembler {
    let transport = HttpTransport::with_client(reqwest::Client::new(), chat_url);
    StreamingResponseAssembler::new(
        Arc::new(transport),
        AssemblerOptions {
            char_delay: Duration::ZERO,
            code_language: "python".into(),
        },
    )
}

fn request() -> StreamRequest {
    StreamRequest::new("I'm stuck", "two-sum", "c1")
}

#[tokio::test]
async fn test_streams_body_over_http() {
    let recorded = Recorded::default();
    let base = spawn_server(recorded.clone()).await;
    let assembler = assembler_for(format!("{base}/chat"));
    let observer = RecordingObserver::new();
    let session = Session::new("student").with_token("secret");

    let response = assembler
        .run(&request(), &session, &observer)
        .await
        .unwrap();

    let expected = "Here's a hint 🦀: use a dictionary.";
    assert_eq!(response.full_text, expected);
    assert_eq!(response.extracted_hints, vec![expected.to_string()]);
    assert_eq!(observer.last_progress().as_deref(), Some(expected));

    let bodies = recorded.bodies.lock().unwrap().clone();
    assert_eq!(
        bodies,
        vec![json!({
            "question": "I'm stuck",
            "problem_slug": "two-sum",
            "conversation_id": "c1",
        })]
    );
    assert_eq!(
        recorded.auth.lock().unwrap().clone(),
        vec![Some("Bearer secret".to_string())]
    );
}

#[tokio::test]
async fn test_http_429_is_rate_limited() {
    let base = spawn_server(Recorded::default()).await;
    let assembler = assembler_for(format!("{base}/limited/chat"));
    let observer = RecordingObserver::new();

    let err = assembler
        .run(&request(), &Session::new("student"), &observer)
        .await
        .unwrap_err();

    assert!(err.is_rate_limited());
    assert_eq!(err.status(), Some(429));
    assert_eq!(observer.errors(), vec![err]);
    assert!(observer.progress().is_empty());
}

#[tokio::test]
async fn test_http_500_is_transport_error_with_status() {
    let base = spawn_server(Recorded::default()).await;
    let assembler = assembler_for(format!("{base}/broken/chat"));

    let err = assembler
        .run(&request(), &Session::new("student"), &RecordingObserver::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StreamError::Transport {
            status: Some(500),
            ..
        }
    ));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let assembler = assembler_for(format!("http://{addr}/chat"));
    let err = assembler
        .run(&request(), &Session::new("student"), &RecordingObserver::new())
        .await
        .unwrap_err();

    assert!(matches!(err, StreamError::Transport { status: None, .. }));
    assert!(!err.is_rate_limited());
}

fn backend(base: &str) -> BackendClient {
    BackendClient::new(&BackendConfig {
        base_url: base.to_string(),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_fetch_problem_and_summary() {
    let base = spawn_server(Recorded::default()).await;
    let client = backend(&base);

    let problem = client.fetch_problem("two-sum").await.unwrap();
    assert_eq!(problem.title, "Two Sum");
    assert_eq!(problem.tags, vec!["Array", "Hash Table"]);

    let summary = client.fetch_problem_summary("two-sum").await.unwrap();
    assert_eq!(summary.examples.len(), 2);

    let err = client.fetch_problem("nope").await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound { .. }));
}

#[tokio::test]
async fn test_conversations_require_token() {
    let base = spawn_server(Recorded::default()).await;
    let client = backend(&base);

    let err = client
        .list_conversations(&Session::new("student"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { .. }));

    let convos = client
        .list_conversations(&Session::new("student").with_token("secret"))
        .await
        .unwrap();
    assert_eq!(convos.len(), 1);
    assert_eq!(convos[0].problem_slug.as_deref(), Some("two-sum"));
}

#[tokio::test]
async fn test_fetch_history() {
    let base = spawn_server(Recorded::default()).await;
    let client = backend(&base);

    let entries = client
        .fetch_history("c9", &Session::new("student").with_token("secret"))
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].question, "first question in c9");
}

#[tokio::test]
async fn test_history_id_is_sent_as_one_segment() {
    let base = spawn_server(Recorded::default()).await;
    let client = backend(&base);

    let entries = client
        .fetch_history("a/b?c#d", &Session::new("student").with_token("secret"))
        .await
        .unwrap();
    assert_eq!(entries[0].question, "first question in a/b?c#d");
}

#[tokio::test]
async fn test_signup_and_duplicate_username() {
    let base = spawn_server(Recorded::default()).await;
    let client = backend(&base);

    let ack = client
        .signup(&Credentials::new("ada", "lovelace"))
        .await
        .unwrap();
    assert_eq!(ack.message, "User created successfully");

    let err = client
        .signup(&Credentials::new("taken", "pw"))
        .await
        .unwrap_err();
    match err {
        ApiError::Rejected { detail, .. } => assert_eq!(detail, "Username already registered"),
        other => panic!("expected Rejected, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_login_token_unlocks_conversations() {
    let base = spawn_server(Recorded::default()).await;
    let client = backend(&base);

    let token = client
        .login(&Credentials::new("ada", "lovelace"))
        .await
        .unwrap();
    assert_eq!(token.token_type, "bearer");

    let session = Session::new("ada").with_token(token.access_token);
    let convos = client.list_conversations(&session).await.unwrap();
    assert_eq!(convos.len(), 1);
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let base = spawn_server(Recorded::default()).await;
    let err = backend(&base)
        .login(&Credentials::new("ada", "wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidCredentials));
}

#[tokio::test]
async fn test_rename_and_delete_conversation() {
    let base = spawn_server(Recorded::default()).await;
    let client = backend(&base);
    let session = Session::new("ada").with_token("secret");

    let ack = client
        .rename_conversation("c1", "  Hash maps  ", &session)
        .await
        .unwrap();
    assert_eq!(ack.title.as_deref(), Some("Hash maps"));

    let err = client
        .rename_conversation("missing", "x", &session)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound { .. }));

    let ack = client.delete_conversation("c1", &session).await.unwrap();
    assert!(ack.message.contains("c1"));

    let err = client
        .delete_conversation("c1", &Session::new("ada"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { .. }));
}

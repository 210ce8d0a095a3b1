//! HTTP API gateway for ToolPilot.
//!
//! Exposes the legacy `POST /chat` endpoint, a health check, and the v1 API
//! with chat, SSE streaming, tools, and session management.
//!
//! Built on Axum; the process-wide collaborators live in a shared [`Runtime`].

pub mod api_v1;
pub mod runtime;
pub mod sessions;

pub use runtime::Runtime;
pub use sessions::{SessionService, TurnReport};

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info};

use toolpilot_agent::LoopOutcome;
use toolpilot_core::{Error, SessionError};

use crate::api_v1::{ApiResult, require_message, requested_session};

pub type SharedState = Arc<Runtime>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn api_error(
    status: StatusCode,
    message: impl std::fmt::Display,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

/// Map a request-level error to an HTTP error.
pub(crate) fn turn_error(e: Error) -> (StatusCode, Json<ErrorResponse>) {
    error!(error = %e, "Request failed");
    let status = match e {
        Error::Session(SessionError::InvalidId(_)) => StatusCode::BAD_REQUEST,
        Error::Transcript(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e)
}

/// Build the full router: legacy routes, `/v1`, CORS, and HTTP tracing.
///
/// CORS allows only the configured origins; with none configured, browsers
/// are limited to same-origin requests.
pub fn build_router(state: SharedState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .server
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .with_state(state.clone())
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the HTTP server.
pub async fn start(config: toolpilot_config::AppConfig) -> Result<(), BoxError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let runtime = Arc::new(Runtime::from_config(config).await?);
    serve(runtime, &addr).await
}

/// Serve an already-built runtime on `addr`.
pub async fn serve(runtime: SharedState, addr: &str) -> Result<(), BoxError> {
    let app = build_router(runtime);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    backend: String,
    model: String,
    tools: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.backend.name().to_string(),
        model: state.config.backend.model.clone(),
        tools: state.controller.tools().len(),
    })
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

/// `{"reply": ...}` on success, `{"error": ...}` when the run fails.
#[derive(Serialize)]
#[serde(untagged)]
enum ChatResponse {
    Reply { reply: String },
    Error { error: String },
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    info!(message_len = payload.message.len(), "Chat message received");
    require_message(&payload.message)?;

    let report = state
        .sessions
        .run_turn(
            &state.controller,
            Some(requested_session(payload.session_id)),
            &payload.message,
            &CancellationToken::new(),
            None,
        )
        .await
        .map_err(turn_error)?;

    let response = match &report.outcome {
        LoopOutcome::Completed { final_text, .. } => ChatResponse::Reply {
            reply: toolpilot_tools::format_reply(final_text),
        },
        LoopOutcome::Failed { kind, detail, .. } => ChatResponse::Error {
            error: format!("{kind}: {detail}"),
        },
    };
    Ok(Json(response))
}

#[cfg(test)]
pub(crate) async fn test_state(replies: &[&str]) -> SharedState {
    use toolpilot_agent::test_helpers::{ScriptedBackend, ScriptedGateway, email_tools};

    let mut config = toolpilot_config::AppConfig::default();
    config.server.allowed_origins = vec!["http://localhost:3000".into()];
    Arc::new(
        Runtime::new(
            config,
            Arc::new(ScriptedBackend::replies(replies)),
            Arc::new(ScriptedGateway::new(email_tools())),
            Arc::new(toolpilot_memory::InMemorySessionStore::new()),
        )
        .await,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use toolpilot_core::SessionId;
    use tower::ServiceExt;

    async fn post_chat(state: SharedState, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = build_router(state).oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state(&[]).await);

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["backend"], "scripted");
        assert_eq!(json["tools"], 2);
    }

    #[tokio::test]
    async fn legacy_chat_reply() {
        let state = test_state(&[r#"{"action":"respond","text":"Hi there"}"#]).await;
        let (status, json) = post_chat(state, r#"{"message":"Hello"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"reply": "Hi there"}));
    }

    #[tokio::test]
    async fn legacy_chat_formats_email_payloads() {
        let text = r#"{"emails":[{"sender":"ann@example.com","subject":"Lunch","labelIds":["INBOX"]}]}"#;
        let reply = serde_json::json!({"action": "respond", "text": text}).to_string();
        let state = test_state(&[reply.as_str()]).await;
        let (_, json) = post_chat(state, r#"{"message":"Any mail?"}"#).await;
        let formatted = json["reply"].as_str().unwrap();
        assert!(formatted.contains("ann@example.com"));
        assert!(formatted.contains("Lunch"));
    }

    #[tokio::test]
    async fn legacy_chat_error() {
        let state = test_state(&["???", "???", "???"]).await;
        let (status, json) = post_chat(state, r#"{"message":"Hello"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["error"].as_str().unwrap().starts_with("protocol_exhausted"));
    }

    #[tokio::test]
    async fn legacy_chat_rejects_blank_message() {
        let state = test_state(&[]).await;
        let (status, json) = post_chat(state.clone(), r#"{"message":"   "}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "message must not be empty");
        assert!(state.sessions.store().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn legacy_chat_trims_session_id() {
        let state = test_state(&[
            r#"{"action":"respond","text":"One"}"#,
            r#"{"action":"respond","text":"Two"}"#,
        ])
        .await;

        post_chat(state.clone(), r#"{"message":"Hi","session_id":"  s1 "}"#).await;
        let stored = state.sessions.store().load(&SessionId::from("s1")).await.unwrap();
        assert_eq!(stored.unwrap().len(), 2);

        post_chat(state.clone(), r#"{"message":"Hi","session_id":"   "}"#).await;
        let sessions = state.sessions.store().list().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| !s.id.as_str().trim().is_empty()));
    }

    #[test]
    fn invalid_session_id_is_a_client_error() {
        let (status, _) = turn_error(Error::Session(SessionError::InvalidId("../x".into())));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = turn_error(Error::Session(SessionError::Storage("disk full".into())));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn v1_routes_are_nested() {
        let app = build_router(test_state(&[]).await);
        let req = Request::builder()
            .uri("/v1/tools")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let app = build_router(test_state(&[]).await);
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
    }
}

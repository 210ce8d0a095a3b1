//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST   /v1/chat`            — Send a message, get the outcome and new transcript entries
//! - `POST   /v1/chat/stream`     — Send a message, get an SSE stream of loop events
//! - `GET    /v1/tools`           — List the loaded tools
//! - `GET    /v1/sessions`        — List stored sessions
//! - `GET    /v1/sessions/{id}`   — Get a session transcript
//! - `DELETE /v1/sessions/{id}`   — Delete a session

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use toolpilot_agent::{AgentStreamEvent, LoopOutcome};
use toolpilot_core::{Session, SessionId, SessionSummary, ToolSpec, TranscriptEntry};

use crate::{ErrorResponse, SharedState, api_error, turn_error};

/// Buffered loop events per stream before the controller waits on the client.
const STREAM_BUFFER: usize = 64;

pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/tools", get(list_tools_handler))
        .route("/sessions", get(list_sessions_handler))
        .route(
            "/sessions/{id}",
            get(get_session_handler).delete(delete_session_handler),
        )
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub outcome: LoopOutcome,
    /// Final text reformatted for display; absent when the run failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    pub entries: Vec<TranscriptEntry>,
}

#[derive(Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolSpec>,
    pub count: usize,
}

#[derive(Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

pub(crate) type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

pub(crate) fn requested_session(session_id: Option<String>) -> SessionId {
    session_id
        .filter(|s| !s.trim().is_empty())
        .map(|s| SessionId::from(s.trim()))
        .unwrap_or_else(SessionId::new)
}

pub(crate) fn require_message(message: &str) -> ApiResult<()> {
    if message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message must not be empty"));
    }
    Ok(())
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    require_message(&payload.message)?;
    let session_id = requested_session(payload.session_id);
    info!(session = %session_id, "v1/chat request");

    let report = state
        .sessions
        .run_turn(
            &state.controller,
            Some(session_id),
            &payload.message,
            &CancellationToken::new(),
            None,
        )
        .await
        .map_err(turn_error)?;

    let reply = report
        .outcome
        .final_text()
        .map(toolpilot_tools::format_reply);

    Ok(Json(ChatResponse {
        session_id: report.session_id.to_string(),
        outcome: report.outcome,
        reply,
        entries: report.entries,
    }))
}

// ── SSE Streaming ─────────────────────────────────────────────────────────

/// `POST /v1/chat/stream` — Send a message, receive an SSE stream of events.
///
/// The run is cancelled when the client disconnects. A tool call already in
/// flight still completes and is recorded before the loop stops.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> ApiResult<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>> {
    require_message(&payload.message)?;
    let session_id = requested_session(payload.session_id);
    info!(session = %session_id, "v1/chat/stream SSE request");

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();

    tokio::spawn(async move {
        let result = state
            .sessions
            .run_turn(
                &state.controller,
                Some(session_id.clone()),
                &payload.message,
                &run_cancel,
                Some(&tx),
            )
            .await;
        if let Err(e) = result {
            warn!(session = %session_id, error = %e, "Streaming run failed");
            let _ = tx
                .send(AgentStreamEvent::Failed {
                    session_id: session_id.to_string(),
                    kind: "internal".into(),
                    detail: e.to_string(),
                    turns: 0,
                })
                .await;
        }
    });

    // Dropped together with the response body.
    let disconnect = cancel.drop_guard();
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _ = &disconnect;
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let tools: Vec<ToolSpec> = state.controller.tools().specs().cloned().collect();
    let count = tools.len();
    Json(ToolListResponse { tools, count })
}

async fn list_sessions_handler(
    State(state): State<SharedState>,
) -> ApiResult<Json<SessionListResponse>> {
    let sessions = state
        .sessions
        .store()
        .list()
        .await
        .map_err(|e| turn_error(e.into()))?;
    Ok(Json(SessionListResponse { sessions }))
}

async fn get_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    let id = SessionId::from(id.as_str());
    match state.sessions.store().load(&id).await {
        Ok(Some(session)) => Ok(Json(session)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("session '{id}' not found"),
        )),
        Err(e) => Err(turn_error(e.into())),
    }
}

async fn delete_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = SessionId::from(id.as_str());
    match state.sessions.store().delete(&id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("session '{id}' not found"),
        )),
        Err(e) => Err(turn_error(e.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn list_tools() {
        let app = v1_router(test_state(&[]).await);

        let req = Request::builder().uri("/tools").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: ToolListResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.count, 2);
        assert!(json.tools.iter().any(|t| t.name == "list_emails"));
    }

    #[tokio::test]
    async fn chat_runs_tool_then_answers() {
        let state = test_state(&[
            r#"{"action":"tool","name":"list_emails","arguments":{"max_results":3}}"#,
            r#"{"action":"respond","text":"Nothing new."}"#,
        ])
        .await;
        let app = v1_router(state);

        let response = app
            .oneshot(post_json("/chat", json!({"message": "Check my email"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "completed");
        assert_eq!(json["final_text"], "Nothing new.");
        assert_eq!(json["reply"], "Nothing new.");
        assert_eq!(json["tool_calls"], 1);
        let roles: Vec<&str> = json["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "tool_call", "tool_result", "agent_response"]);
    }

    #[tokio::test(start_paused = true)]
    async fn chat_failure_is_reported_in_band() {
        let app = v1_router(test_state(&["not json", "still not", "nope"]).await);

        let response = app
            .oneshot(post_json("/chat", json!({"message": "Hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "protocol_exhausted");
        assert_eq!(json["last_raw_text"], "nope");
        assert!(json.get("reply").is_none());
    }

    #[tokio::test]
    async fn chat_rejects_empty_message() {
        let app = v1_router(test_state(&[]).await);
        let response = app
            .oneshot(post_json("/chat", json!({"message": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn session_round_trip_and_delete() {
        let state = test_state(&[r#"{"action":"respond","text":"Hello"}"#]).await;

        let response = v1_router(state.clone())
            .oneshot(post_json("/chat", json!({"message": "Hi", "session_id": "s1"})))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["session_id"], "s1");

        let req = Request::builder().uri("/sessions/s1").body(Body::empty()).unwrap();
        let response = v1_router(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let session = body_json(response).await;
        assert_eq!(session["entries"].as_array().unwrap().len(), 2);

        let req = Request::builder().uri("/sessions").body(Body::empty()).unwrap();
        let response = v1_router(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(body_json(response).await["sessions"][0]["id"], "s1");

        let req = Request::builder()
            .method("DELETE")
            .uri("/sessions/s1")
            .body(Body::empty())
            .unwrap();
        let response = v1_router(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let req = Request::builder().uri("/sessions/s1").body(Body::empty()).unwrap();
        let response = v1_router(state).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_unknown_session() {
        let req = Request::builder()
            .method("DELETE")
            .uri("/sessions/missing")
            .body(Body::empty())
            .unwrap();
        let response = v1_router(test_state(&[]).await).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stream_emits_events() {
        let state = test_state(&[
            "Checking.\n{\"action\":\"tool\",\"name\":\"list_emails\",\"arguments\":{\"max_results\":1}}",
            r#"{"action":"respond","text":"Done"}"#,
        ])
        .await;
        let app = v1_router(state);

        let response = app
            .oneshot(post_json("/chat/stream", json!({"message": "Go", "session_id": "st"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        let thought = text.find("event: thought").unwrap();
        let call = text.find("event: tool_call").unwrap();
        let result = text.find("event: tool_result").unwrap();
        let done = text.find("event: done").unwrap();
        assert!(thought < call && call < result && result < done);
        assert!(text.contains(r#""session_id":"st""#));
    }
}

//! 사용자 앱 - 세션 생성, 채팅, 세션 조회/초기화/종료

use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::pages::USER_PAGE;
use super::{ApiError, AppState};
use crate::embedding::EmbeddingChoice;
use crate::rag::Turn;
use crate::session::{SessionConfig, SessionReply};

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub(super) struct CreateSessionRequest {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    embedding: Option<EmbeddingChoice>,
    #[serde(default)]
    use_query_optimization: Option<bool>,
    #[serde(default)]
    use_few_shot: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatRequest {
    session_id: String,
    message: String,
}

// ============================================================================
// Router
// ============================================================================

/// 세션/채팅 API (사용자 앱과 관리자 앱 공용)
pub(super) fn chat_api() -> Router<AppState> {
    Router::new()
        .route("/api/session", post(create_session))
        .route("/api/chat", post(chat))
        .route("/api/session/:id", get(session_status).delete(close_session))
        .route("/api/session/:id/reset", post(reset_session))
}

/// 사용자 앱 라우터
pub fn user_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Html(USER_PAGE) }))
        .route("/health", get(health))
        .merge(chat_api())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

pub(super) async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<Json<Value>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let config = SessionConfig {
        api_key: request.api_key,
        embedding: request.embedding,
        use_query_optimization: request.use_query_optimization,
        use_few_shot: request.use_few_shot,
    };

    let session = state.context().create_session(config).await?;
    let status = session.status();
    let id = state.insert_session(session).await;

    Ok(Json(json!({ "success": true, "session_id": id, "status": status })))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApiError::bad_request("질문을 입력해주세요."));
    }

    let session = state.session(&request.session_id).await?;
    let mut session = session.lock().await;

    let reply = session.handle_input(message).await;
    let success = match &reply {
        SessionReply::Command { .. } => true,
        SessionReply::Answer(outcome) => outcome.success,
    };

    Ok(Json(json!({
        "success": success,
        "reply": reply,
        "history": session.history().status(),
    })))
}

async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.session(&id).await?;
    let session = session.lock().await;
    let turns: Vec<&Turn> = session.history().turns().collect();

    Ok(Json(json!({
        "success": true,
        "status": session.status(),
        "turns": turns,
    })))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.session(&id).await?;
    let removed = session.lock().await.reset();
    Ok(Json(json!({ "success": true, "removed": removed })))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.remove_session(&id).await {
        return Err(ApiError::session_not_found(&id));
    }
    Ok(Json(json!({ "success": true })))
}

// ============================================================================
// Tests
// ============================================================================

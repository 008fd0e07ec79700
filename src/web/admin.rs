//! 관리자 앱 - 벡터 DB 상태/백업/복원/재구축/삭제, 리소스 현황
//!
//! 모든 DB 작업은 `?embedding=` 쿼리(또는 본문 필드)로 대상 저장소를 고르며,
//! 없으면 설정의 기본 임베딩을 사용합니다.

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::chat::{chat_api, health};
use super::pages::ADMIN_PAGE;
use super::{ApiError, AppState};
use crate::embedding::EmbeddingChoice;

#[derive(Debug, Default, Deserialize)]
struct Target {
    #[serde(default)]
    embedding: Option<EmbeddingChoice>,
}

#[derive(Debug, Deserialize)]
struct RestoreRequest {
    #[serde(default)]
    embedding: Option<EmbeddingChoice>,
    name: String,
}

impl AppState {
    fn target(&self, embedding: Option<EmbeddingChoice>) -> EmbeddingChoice {
        embedding.unwrap_or(self.context().settings().embedding)
    }
}

/// 관리자 앱 라우터
pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Html(ADMIN_PAGE) }))
        .route("/health", get(health))
        .route("/api/resources", get(resources))
        .route("/api/db/status", get(db_status))
        .route("/api/db/backups", get(list_backups))
        .route("/api/db/backup", post(backup))
        .route("/api/db/restore", post(restore))
        .route("/api/db/rebuild", post(rebuild))
        .route("/api/db", delete(delete_store))
        .route("/api/db/cache/clear", post(clear_cache))
        .merge(chat_api())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn resources(State(state): State<AppState>) -> Json<Value> {
    let resources = state.context().resource_status().await;
    let settings = state.context().settings();
    Json(json!({
        "success": true,
        "resources": resources,
        "sessions": state.session_count().await,
        "api_key_configured": settings.api_key.is_some(),
        "default_embedding": settings.embedding,
        "document": settings.document_path,
    }))
}

async fn db_status(
    State(state): State<AppState>,
    Query(target): Query<Target>,
) -> Result<Json<Value>, ApiError> {
    let choice = state.target(target.embedding);
    let database = state.context().database(choice).await;
    let stats = database.stats().await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

async fn list_backups(
    State(state): State<AppState>,
    Query(target): Query<Target>,
) -> Result<Json<Value>, ApiError> {
    let choice = state.target(target.embedding);
    let database = state.context().database(choice).await;
    let backups = database.list_backups()?;
    Ok(Json(json!({ "success": true, "backups": backups })))
}

async fn backup(
    State(state): State<AppState>,
    Query(target): Query<Target>,
) -> Result<Json<Value>, ApiError> {
    let choice = state.target(target.embedding);
    let database = state.context().database(choice).await;
    let info = database.backup().await?;
    tracing::info!("Backup created: {}", info.name);
    Ok(Json(json!({ "success": true, "backup": info })))
}

async fn restore(
    State(state): State<AppState>,
    Json(request): Json<RestoreRequest>,
) -> Result<Json<Value>, ApiError> {
    let choice = state.target(request.embedding);
    let database = state.context().database(choice).await;
    let stats = database.restore(&request.name).await?;
    tracing::info!("Restored {} from {}", choice, request.name);
    Ok(Json(json!({ "success": true, "stats": stats })))
}

async fn rebuild(
    State(state): State<AppState>,
    Query(target): Query<Target>,
) -> Result<Json<Value>, ApiError> {
    let choice = state.target(target.embedding);
    // 관리 작업은 서버 설정 키로만 임베딩
    let embedder = state.context().embedder(choice, None).await?;
    let database = state.context().database(choice).await;
    let report = database
        .rebuild(embedder.as_ref(), &state.context().settings().document_path)
        .await?;
    Ok(Json(json!({ "success": true, "report": report })))
}

async fn delete_store(
    State(state): State<AppState>,
    Query(target): Query<Target>,
) -> Result<Json<Value>, ApiError> {
    let choice = state.target(target.embedding);
    let database = state.context().database(choice).await;
    let deleted = database.delete().await?;
    state.context().clear_database_cache(choice).await;
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

async fn clear_cache(
    State(state): State<AppState>,
    Query(target): Query<Target>,
) -> Json<Value> {
    let choice = state.target(target.embedding);
    let cleared = state.context().clear_database_cache(choice).await;
    Json(json!({ "success": true, "cleared": cleared }))
}

// ============================================================================
// Tests
// ============================================================================

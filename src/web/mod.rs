//! 웹 모듈 - 사용자 앱 / 관리자 앱 HTTP 서버
//!
//! - 사용자 앱 (기본 8501): 채팅 페이지 + 세션/채팅 JSON API
//! - 관리자 앱 (기본 8502): 벡터 DB 관리 API + 테스트 채팅
//!
//! 세션 상태는 서버 메모리의 세션 테이블에 보관하며, 세션마다 별도 뮤텍스로
//! 같은 세션의 요청을 직렬화합니다. 유휴 세션은 만료되고 테이블 크기는 제한됩니다.
//!
//! 두 앱 모두 루프백에만 바인딩하고 CORS 헤더를 내보내지 않으므로
//! 다른 출처의 페이지는 API를 호출할 수 없습니다.

mod admin;
mod chat;
mod pages;
mod sessions;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::error::RagError;
use crate::session::{AppContext, UserSession};
use sessions::SessionTable;

pub use admin::admin_router;
pub use chat::user_router;

// ============================================================================
// Launch Mode
// ============================================================================

/// 실행 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LaunchMode {
    /// 사용자 앱
    User,
    /// 관리자 앱
    Admin,
    /// 두 앱 동시 실행
    Both,
}

impl LaunchMode {
    pub fn includes_admin(&self) -> bool {
        matches!(self, LaunchMode::Admin | LaunchMode::Both)
    }
}

// ============================================================================
// App State
// ============================================================================

type SharedSession = Arc<Mutex<UserSession>>;

/// 핸들러 공유 상태
#[derive(Clone)]
pub struct AppState {
    ctx: Arc<AppContext>,
    sessions: Arc<Mutex<SessionTable<SharedSession>>>,
}

impl AppState {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let settings = ctx.settings();
        let table = SessionTable::new(
            Duration::from_secs(settings.session_idle_secs),
            settings.max_sessions,
        );
        Self {
            ctx,
            sessions: Arc::new(Mutex::new(table)),
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    async fn insert_session(&self, session: UserSession) -> String {
        let id = session.id().to_string();
        let evicted = self.sessions.lock().await.insert(
            id.clone(),
            Arc::new(Mutex::new(session)),
            Instant::now(),
        );
        if evicted > 0 {
            tracing::info!("Session table full or idle, evicted {} session(s)", evicted);
        }
        id
    }

    async fn session(&self, id: &str) -> Result<SharedSession, ApiError> {
        self.sessions
            .lock()
            .await
            .get(id, Instant::now())
            .ok_or_else(|| ApiError::session_not_found(id))
    }

    async fn remove_session(&self, id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(id);
        if removed {
            tracing::info!("Closed session {}", id);
        }
        removed
    }

    async fn session_count(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        sessions.evict_idle(Instant::now());
        sessions.len()
    }
}

// ============================================================================
// Error Response
// ============================================================================

/// JSON 에러 응답 (`success = false`)
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn session_not_found(id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("세션을 찾을 수 없습니다: {}", id),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::MissingApiKey | RagError::Config(_) => StatusCode::BAD_REQUEST,
            RagError::DocumentNotFound(_) | RagError::BackupNotFound(_) => StatusCode::NOT_FOUND,
            RagError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            RagError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RagError::Provider(_) => StatusCode::BAD_GATEWAY,
            RagError::Io(_) | RagError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!("Request failed ({}): {}", status, err);
        Self {
            status,
            message: err.user_message(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        RagError::classify(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

// ============================================================================
// Server
// ============================================================================

fn with_layers(router: Router) -> Router {
    router.layer(TraceLayer::new_for_http())
}

/// 모드에 따라 서버 실행 (both: 한 프로세스에서 두 서버가 컨텍스트 공유)
pub async fn serve(ctx: Arc<AppContext>, mode: LaunchMode) -> Result<()> {
    let state = AppState::new(ctx);
    let user_port = state.ctx.settings().user_port;
    let admin_port = state.ctx.settings().admin_port;

    match mode {
        LaunchMode::User => run_server("user", user_port, user_router(state)).await,
        LaunchMode::Admin => run_server("admin", admin_port, admin_router(state)).await,
        LaunchMode::Both => {
            tokio::try_join!(
                run_server("user", user_port, user_router(state.clone())),
                run_server("admin", admin_port, admin_router(state)),
            )?;
            Ok(())
        }
    }
}

async fn run_server(name: &str, port: u16, app: Router) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {} app to {}", name, addr))?;

    tracing::info!("{} app listening on http://{}", name, addr);
    println!("[OK] {} 앱: http://{}", name, addr);

    axum::serve(listener, with_layers(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .with_context(|| format!("{} app server error", name))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

// ============================================================================
// Test Helpers
// ============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::AppState;
    use crate::config::Settings;
    use crate::session::AppContext;
    use crate::testing::{sample_tax_text, ScriptedChat, TestProviders};

    pub fn state(dir: &TempDir, api_key: Option<&str>) -> AppState {
        state_with(dir, api_key, |_| {})
    }

    /// 설정을 바꿔 만든 상태
    pub fn state_with(dir: &TempDir, api_key: Option<&str>, adjust: impl FnOnce(&mut Settings)) -> AppState {
        let document = dir.path().join("tax.txt");
        std::fs::write(&document, sample_tax_text()).unwrap();

        let mut settings = Settings {
            api_key: api_key.map(str::to_string),
            document_path: document,
            data_dir: dir.path().join("data"),
            chunk_size: 150,
            chunk_overlap: 20,
            use_query_optimization: false,
            ..Settings::default()
        };
        adjust(&mut settings);
        let providers = Arc::new(TestProviders::new(ScriptedChat::new("근로소득은 봉급입니다.")));
        AppState::new(Arc::new(AppContext::with_providers(settings, providers)))
    }

    pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::state;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ApiError::from(RagError::MissingApiKey).status, StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(RagError::BackupNotFound("x".into())).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::from(RagError::Timeout(30)).status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ApiError::from(anyhow::anyhow!("boom")).status,
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_cross_origin_preflight_is_not_granted() {
        let dir = TempDir::new().unwrap();
        let app = with_layers(admin_router(state(&dir, Some("key"))));

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/db")
            .header(header::ORIGIN, "http://evil.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());

        // 단순 요청에도 허용 헤더를 붙이지 않음
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/db/status")
            .header(header::ORIGIN, "http://evil.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[test]
    fn test_launch_mode() {
        assert!(LaunchMode::Both.includes_admin());
        assert!(LaunchMode::Admin.includes_admin());
        assert!(!LaunchMode::User.includes_admin());
    }
}

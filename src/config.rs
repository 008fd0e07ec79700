//! 설정 모듈 - 환경변수 / .env 파일 기반 설정
//!
//! 우선순위: CLI 플래그 > 환경변수 > .env 파일 > 기본값

use std::path::PathBuf;

use crate::embedding::EmbeddingChoice;

// ============================================================================
// Defaults
// ============================================================================

/// 기본 입력 문서
pub const DEFAULT_DOCUMENT_PATH: &str = "tax.docx";
/// 기본 채팅 모델
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash";
/// 청크 크기 (문자 수)
pub const DEFAULT_CHUNK_SIZE: usize = 1500;
/// 청크 오버랩 (문자 수)
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
/// 검색 결과 개수
pub const DEFAULT_TOP_K: usize = 3;
/// 대화 히스토리 최대 개수
pub const DEFAULT_MAX_HISTORY: usize = 10;
/// LLM 응답 대기 시간 (초)
pub const DEFAULT_ANSWER_TIMEOUT_SECS: u64 = 30;
/// 사용자 앱 포트
pub const DEFAULT_USER_PORT: u16 = 8501;
/// 관리자 앱 포트
pub const DEFAULT_ADMIN_PORT: u16 = 8502;
/// 웹 세션 유휴 만료 (초)
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 60 * 60;
/// 웹 세션 최대 개수
pub const DEFAULT_MAX_SESSIONS: usize = 256;

/// API 키 환경변수 (우선순위 순)
const API_KEY_VARS: [&str; 3] = ["GOOGLE_API_KEY", "GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

// ============================================================================
// Settings
// ============================================================================

/// 애플리케이션 설정
#[derive(Debug, Clone)]
pub struct Settings {
    /// Google API 키 (없을 수 있음 - 웹 UI에서 입력 가능)
    pub api_key: Option<String>,
    /// 입력 문서 경로
    pub document_path: PathBuf,
    /// 데이터 디렉토리 (벡터 저장소, 백업)
    pub data_dir: PathBuf,
    /// 기본 임베딩 프로바이더
    pub embedding: EmbeddingChoice,
    /// 채팅 모델 이름
    pub chat_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub max_history: usize,
    pub answer_timeout_secs: u64,
    pub use_query_optimization: bool,
    pub use_few_shot: bool,
    pub user_port: u16,
    pub admin_port: u16,
    /// 이 시간 동안 쓰지 않은 웹 세션은 만료
    pub session_idle_secs: u64,
    /// 가득 차면 가장 오래 쓰지 않은 세션부터 내보냄
    pub max_sessions: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            document_path: PathBuf::from(DEFAULT_DOCUMENT_PATH),
            data_dir: get_data_dir(),
            embedding: EmbeddingChoice::Gemini,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            max_history: DEFAULT_MAX_HISTORY,
            answer_timeout_secs: DEFAULT_ANSWER_TIMEOUT_SECS,
            use_query_optimization: true,
            use_few_shot: true,
            user_port: DEFAULT_USER_PORT,
            admin_port: DEFAULT_ADMIN_PORT,
            session_idle_secs: DEFAULT_SESSION_IDLE_SECS,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl Settings {
    /// .env 파일과 환경변수에서 설정 로드
    pub fn from_env() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {:?}", path),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(".env 파일 로드 실패: {}", e),
        }

        let mut settings = Self {
            api_key: get_api_key(),
            ..Self::default()
        };

        if let Some(path) = env_string("TAX_RAG_DOCUMENT") {
            settings.document_path = PathBuf::from(path);
        }
        if let Some(dir) = env_string("TAX_RAG_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(model) = env_string("TAX_RAG_CHAT_MODEL") {
            settings.chat_model = model;
        }
        if let Some(choice) = env_string("TAX_RAG_EMBEDDING") {
            match choice.parse() {
                Ok(choice) => settings.embedding = choice,
                Err(e) => tracing::warn!("TAX_RAG_EMBEDDING 무시: {}", e),
            }
        }
        settings.top_k = env_parse("TAX_RAG_TOP_K").unwrap_or(settings.top_k);
        settings.max_history = env_parse("TAX_RAG_MAX_HISTORY").unwrap_or(settings.max_history);
        settings.user_port = env_parse("TAX_RAG_USER_PORT").unwrap_or(settings.user_port);
        settings.admin_port = env_parse("TAX_RAG_ADMIN_PORT").unwrap_or(settings.admin_port);
        settings.session_idle_secs =
            env_parse("TAX_RAG_SESSION_IDLE_SECS").unwrap_or(settings.session_idle_secs);
        settings.max_sessions = env_parse("TAX_RAG_MAX_SESSIONS").unwrap_or(settings.max_sessions);

        settings
    }

    /// 입력된 키 우선, 없으면 환경변수 키
    pub fn resolve_api_key(&self, provided: Option<&str>) -> Option<String> {
        provided
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| self.api_key.clone())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 데이터 디렉토리 경로 (~/.local/share/tax-rag 등)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tax-rag")
}

/// API 키 로드 (환경변수에서)
///
/// 우선순위: GOOGLE_API_KEY > GEMINI_API_KEY > GOOGLE_AI_API_KEY
pub fn get_api_key() -> Option<String> {
    API_KEY_VARS.iter().find_map(|var| {
        let key = env_string(var)?;
        tracing::debug!("Using API key from {}", var);
        Some(key)
    })
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("{}={} 값을 해석할 수 없어 기본값을 사용합니다", name, raw);
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

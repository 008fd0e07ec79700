//! 에러 분류 - 사용자에게 보여줄 메시지로 변환되는 에러 타입
//!
//! 내부 로직은 `anyhow::Result`로 전파하고, UI 경계(HTTP 핸들러, CLI)에서
//! `RagError`로 분류하여 친절한 메시지를 출력합니다.

use std::path::PathBuf;

use thiserror::Error;

/// RAG 시스템 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// API 키 미설정 (네트워크 호출 전에 감지)
    #[error("API key not configured")]
    MissingApiKey,

    /// 잘못된 설정값
    #[error("invalid configuration: {0}")]
    Config(String),

    /// 입력 문서 없음
    #[error("document not found: {0}")]
    DocumentNotFound(PathBuf),

    /// 파일 시스템 에러
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 임베딩/LLM 프로바이더 에러 (네트워크, rate limit, 응답 형식)
    #[error("provider error: {0}")]
    Provider(String),

    /// LLM 응답 시간 초과
    #[error("provider timed out after {0} seconds")]
    Timeout(u64),

    /// 벡터 저장소 에러
    #[error("vector store error: {0}")]
    Store(String),

    /// 세션이 초기화되지 않음
    #[error("session not initialized")]
    NotInitialized,

    /// 백업 없음
    #[error("backup not found: {0}")]
    BackupNotFound(String),
}

impl RagError {
    /// 사용자에게 보여줄 메시지
    pub fn user_message(&self) -> String {
        match self {
            RagError::MissingApiKey => "🔑 Google API 키가 필요합니다. \
                 .env 파일에 GOOGLE_API_KEY를 설정하거나 화면에서 입력해주세요."
                .to_string(),
            RagError::Config(msg) => format!("⚙️ 설정 오류: {}", msg),
            RagError::DocumentNotFound(path) => {
                format!("📄 문서를 찾을 수 없습니다: {}", path.display())
            }
            RagError::Io(e) => format!("💾 파일 처리 중 오류가 발생했습니다: {}", e),
            RagError::Provider(_) => {
                "죄송합니다. AI 서비스 호출 중 오류가 발생했습니다. 잠시 후 다시 시도해주세요."
                    .to_string()
            }
            RagError::Timeout(_) => {
                "죄송합니다. 응답 생성에 시간이 오래 걸리고 있습니다. 다시 시도해주세요."
                    .to_string()
            }
            RagError::Store(msg) => format!("💾 데이터베이스 오류: {}", msg),
            RagError::NotInitialized => {
                "⏳ 시스템이 아직 준비되지 않았습니다. 잠시 후 다시 시도해주세요.".to_string()
            }
            RagError::BackupNotFound(name) => format!("💿 백업을 찾을 수 없습니다: {}", name),
        }
    }

    /// anyhow 에러 체인에서 분류된 에러를 찾아 변환
    ///
    /// 체인에 `RagError`가 없으면 프로바이더 에러로 취급합니다.
    pub fn classify(err: anyhow::Error) -> Self {
        match err.downcast::<RagError>() {
            Ok(rag) => rag,
            Err(err) => {
                if let Some(io) = err.downcast_ref::<std::io::Error>() {
                    return RagError::Io(std::io::Error::new(io.kind(), format!("{:#}", err)));
                }
                RagError::Provider(format!("{:#}", err))
            }
        }
    }
}

impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::classify(err)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_preserves_rag_error() {
        let err = anyhow::Error::new(RagError::MissingApiKey).context("session init");
        assert!(matches!(RagError::classify(err), RagError::MissingApiKey));
    }

    #[test]
    fn test_classify_unknown_is_provider() {
        let err = anyhow::anyhow!("connection reset");
        match RagError::classify(err) {
            RagError::Provider(msg) => assert!(msg.contains("connection reset")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_classify_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = anyhow::Error::new(io).context("reading store");
        assert!(matches!(RagError::classify(err), RagError::Io(_)));
    }

    #[test]
    fn test_missing_key_message_mentions_env() {
        assert!(RagError::MissingApiKey.user_message().contains("GOOGLE_API_KEY"));
    }
}

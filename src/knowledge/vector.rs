//! Vector Store - 벡터 검색 트레이트 및 청크 타입
//!
//! 청크는 결정적 ID(SHA-256)로 저장되므로 같은 문서를 다시 넣어도 중복되지 않습니다.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use super::sha256_hex;

// ============================================================================
// Types
// ============================================================================

/// 문서 청크 (불변)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// 불투명 ID (source + index + text의 SHA-256)
    pub id: String,
    /// 원본 문서 경로
    pub source: String,
    /// 청크 인덱스 (0-based)
    pub chunk_index: i32,
    /// 청크 텍스트
    pub text: String,
}

impl Chunk {
    /// 새 청크 생성 (ID 자동 계산)
    pub fn new(source: &Path, chunk_index: usize, text: String) -> Self {
        let source = source.display().to_string();
        let id = chunk_id(&source, chunk_index, &text);
        Self {
            id,
            source,
            chunk_index: chunk_index as i32,
            text,
        }
    }
}

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub chunk: Chunk,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// 유사도 스코어 (0.0 ~ 1.0, 높을수록 가까움)
    pub score: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 업서트 (같은 ID는 덮어쓰기)
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 벡터 검색 (유사도 내림차순)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<RetrievedChunk>>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 특정 문서의 벡터 삭제
    async fn delete_by_source(&self, source: &str) -> Result<usize>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 청크 ID 계산
pub fn chunk_id(source: &str, chunk_index: usize, text: &str) -> String {
    let mut input = Vec::with_capacity(source.len() + text.len() + 16);
    input.extend_from_slice(source.as_bytes());
    input.push(0);
    input.extend_from_slice(chunk_index.to_string().as_bytes());
    input.push(0);
    input.extend_from_slice(text.as_bytes());
    sha256_hex(&input)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_deterministic() {
        let a = Chunk::new(Path::new("tax.docx"), 0, "제1조".to_string());
        let b = Chunk::new(Path::new("tax.docx"), 0, "제1조".to_string());
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 64);
    }

    #[test]
    fn test_chunk_id_distinguishes_fields() {
        let base = chunk_id("tax.docx", 1, "text");
        assert_ne!(base, chunk_id("tax.docx", 2, "text"));
        assert_ne!(base, chunk_id("other.docx", 1, "text"));
        assert_ne!(base, chunk_id("tax.docx", 1, "text2"));
        // 구분자 덕분에 필드 경계가 섞이지 않음
        assert_ne!(chunk_id("a", 11, "x"), chunk_id("a1", 1, "x"));
    }
}

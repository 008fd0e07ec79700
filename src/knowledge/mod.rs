//! Knowledge 모듈 - 세법 문서 벡터 저장소
//!
//! - Chunker: 재귀 문자 분할 (오버랩 유지)
//! - LanceDB: 청크 임베딩 저장 + ANN 검색
//! - Manifest: SQLite 적재 기록
//! - Database: 임베딩 공급자별 저장소 관리 (적재, 검색, 백업, 복원)

mod chunker;
mod database;
mod lance;
mod manifest;
mod vector;

use sha2::{Digest, Sha256};

// Re-exports
pub use chunker::{recursive_chunker, ChunkConfig, Chunker, RecursiveChunker};
pub use database::{BackupInfo, DatabaseManager, IngestReport, StoreStats};
pub use lance::LanceVectorStore;
pub use manifest::{IngestRecord, Manifest};
pub use vector::{chunk_id, Chunk, RetrievedChunk, VectorEntry, VectorStore};

/// SHA-256 해시 (hex)
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

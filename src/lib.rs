//! tax-rag - 소득세 RAG 챗봇
//!
//! 소득세법 문서를 청크로 나눠 LanceDB 벡터 저장소에 적재하고,
//! Gemini로 질문을 개선/답변하는 RAG 시스템입니다.
//! 사용자 웹 앱, 관리자 웹 앱, 터미널 대화 모드를 제공합니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod loader;
pub mod rag;
pub mod session;
pub mod web;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::Settings;
pub use embedding::{create_embedder, EmbeddingChoice, EmbeddingProvider, GeminiEmbedding};
pub use error::RagError;
pub use knowledge::{
    BackupInfo, Chunk, ChunkConfig, Chunker, DatabaseManager, IngestReport, LanceVectorStore,
    RetrievedChunk, StoreStats, VectorEntry, VectorStore,
};
pub use llm::{ChatModel, GeminiChat};
pub use rag::{ConversationHistory, EnhancedRag, QueryOutcome};
pub use session::{AppContext, SessionConfig, UserSession};

//! RAG 모듈 - 대화 히스토리, 프롬프트, 질의 처리 엔진, 명령어

mod commands;
mod engine;
mod history;
pub mod prompt;

pub use commands::{Command, CommandProcessor, HELP_TEXT};
pub use engine::{EngineOptions, EnhancedRag, OptimizationStatus, QueryOutcome};
pub use history::{ConversationHistory, HistoryStatus, Turn};

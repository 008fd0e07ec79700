//! Enhanced RAG - 쿼리 개선 -> 검색 -> 프롬프트 조립 -> 답변 생성

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::history::ConversationHistory;
use super::prompt::{build_answer_prompt, build_rewrite_prompt, clean_rewritten_query, TAX_DICTIONARY};
use crate::config::{Settings, DEFAULT_ANSWER_TIMEOUT_SECS, DEFAULT_TOP_K};
use crate::embedding::EmbeddingProvider;
use crate::error::RagError;
use crate::knowledge::{DatabaseManager, RetrievedChunk};
use crate::llm::ChatModel;

// ============================================================================
// Types
// ============================================================================

/// 엔진 옵션
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub top_k: usize,
    pub answer_timeout: Duration,
    pub use_query_optimization: bool,
    pub use_few_shot: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            answer_timeout: Duration::from_secs(DEFAULT_ANSWER_TIMEOUT_SECS),
            use_query_optimization: true,
            use_few_shot: true,
        }
    }
}

impl EngineOptions {
    /// 설정값으로 생성
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            top_k: settings.top_k,
            answer_timeout: Duration::from_secs(settings.answer_timeout_secs),
            use_query_optimization: settings.use_query_optimization,
            use_few_shot: settings.use_few_shot,
        }
    }
}

/// 질의 처리 결과
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub success: bool,
    pub answer: String,
    pub original_query: String,
    /// 검색에 사용한 질의 (최적화가 꺼져 있으면 원본과 동일)
    pub improved_query: String,
    pub sources: Vec<RetrievedChunk>,
    pub optimization_used: bool,
    pub elapsed_ms: u64,
}

/// 쿼리 최적화 상태
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationStatus {
    pub enabled: bool,
    pub few_shot: bool,
    pub dictionary_count: usize,
}

// ============================================================================
// EnhancedRag
// ============================================================================

/// 쿼리 개선을 포함한 RAG 엔진
///
/// 질의 임베딩은 세션의 임베딩으로 만들고 저장소는 공유합니다.
pub struct EnhancedRag {
    database: Arc<DatabaseManager>,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
    options: EngineOptions,
}

impl EnhancedRag {
    pub fn new(
        database: Arc<DatabaseManager>,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
        options: EngineOptions,
    ) -> Self {
        Self {
            database,
            embedder,
            chat,
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// 세법 사전으로 질문 개선 (실패 시 원본 질문)
    pub async fn improve_query(&self, question: &str) -> String {
        if !self.options.use_query_optimization {
            return question.to_string();
        }

        match self.chat.generate(&build_rewrite_prompt(question)).await {
            Ok(raw) => {
                let improved = clean_rewritten_query(&raw);
                if improved.is_empty() {
                    question.to_string()
                } else {
                    improved
                }
            }
            Err(e) => {
                tracing::warn!("쿼리 개선 실패, 원본 질문 사용: {:#}", e);
                question.to_string()
            }
        }
    }

    /// 문서 검색
    pub async fn search_documents(&self, query: &str) -> anyhow::Result<Vec<RetrievedChunk>> {
        self.database
            .search(self.embedder.as_ref(), query, self.options.top_k)
            .await
    }

    /// 질문 처리
    ///
    /// 에러는 `success = false`와 사용자용 메시지로 변환됩니다.
    pub async fn process_query(
        &self,
        question: &str,
        history: &ConversationHistory,
    ) -> QueryOutcome {
        let start = Instant::now();
        let optimization_used = self.options.use_query_optimization;

        tracing::info!("Processing query: {}", question);
        let search_query = self.improve_query(question).await;
        if search_query != question {
            tracing::info!("Improved query: {}", search_query);
        }

        let mut outcome = QueryOutcome {
            success: false,
            answer: String::new(),
            original_query: question.to_string(),
            improved_query: search_query.clone(),
            sources: vec![],
            optimization_used,
            elapsed_ms: 0,
        };

        match self.answer(question, &search_query, history).await {
            Ok((answer, sources)) => {
                outcome.success = true;
                outcome.answer = answer;
                outcome.sources = sources;
            }
            Err(err) => {
                tracing::warn!("Query failed: {}", err);
                outcome.answer = err.user_message();
            }
        }

        outcome.elapsed_ms = start.elapsed().as_millis() as u64;
        outcome
    }

    async fn answer(
        &self,
        question: &str,
        search_query: &str,
        history: &ConversationHistory,
    ) -> Result<(String, Vec<RetrievedChunk>), RagError> {
        let sources = self.search_documents(search_query).await?;
        tracing::debug!("Retrieved {} documents", sources.len());

        let prompt = build_answer_prompt(
            question,
            &sources,
            &history.relevant_context(question),
            self.options.use_few_shot,
        );

        let timeout = self.options.answer_timeout;
        let answer = tokio::time::timeout(timeout, self.chat.generate(&prompt))
            .await
            .map_err(|_| RagError::Timeout(timeout.as_secs()))??;

        Ok((answer.trim().to_string(), sources))
    }

    /// 쿼리 최적화 토글, 새 상태 반환
    pub fn toggle_optimization(&mut self) -> bool {
        self.options.use_query_optimization = !self.options.use_query_optimization;
        tracing::info!(
            "Query optimization {}",
            if self.options.use_query_optimization { "enabled" } else { "disabled" }
        );
        self.options.use_query_optimization
    }

    pub fn set_optimization(&mut self, enabled: bool) {
        self.options.use_query_optimization = enabled;
    }

    /// few-shot 예시 토글, 새 상태 반환
    pub fn toggle_few_shot(&mut self) -> bool {
        self.options.use_few_shot = !self.options.use_few_shot;
        self.options.use_few_shot
    }

    pub fn optimization_status(&self) -> OptimizationStatus {
        OptimizationStatus {
            enabled: self.options.use_query_optimization,
            few_shot: self.options.use_few_shot,
            dictionary_count: TAX_DICTIONARY.len(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingChoice;
    use crate::knowledge::ChunkConfig;
    use crate::testing::{sample_tax_text, KeywordEmbedder, ScriptedChat};
    use tempfile::TempDir;

    /// 적재된 저장소를 가진 테스트 데이터베이스
    async fn ingested_database(dir: &TempDir) -> Arc<DatabaseManager> {
        let document = dir.path().join("tax.txt");
        std::fs::write(&document, sample_tax_text()).unwrap();

        let database = Arc::new(DatabaseManager::new(
            &dir.path().join("data"),
            EmbeddingChoice::Gemini,
            ChunkConfig::new(150, 20).unwrap(),
        ));
        database
            .ingest(&KeywordEmbedder::new(), &document, false)
            .await
            .unwrap();
        database
    }

    fn engine(database: Arc<DatabaseManager>, chat: Arc<ScriptedChat>, optimize: bool) -> EnhancedRag {
        EnhancedRag::new(
            database,
            Arc::new(KeywordEmbedder::new()),
            chat,
            EngineOptions {
                use_query_optimization: optimize,
                ..EngineOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn test_optimization_off_uses_raw_query() {
        let dir = TempDir::new().unwrap();
        let chat = Arc::new(ScriptedChat::new("답변입니다."));
        let rag = engine(ingested_database(&dir).await, chat.clone(), false);

        let question = "  월급쟁이 세금은?  ";
        let outcome = rag.process_query(question, &ConversationHistory::default()).await;

        assert!(outcome.success);
        assert_eq!(outcome.improved_query, question);
        assert!(!outcome.optimization_used);
        // 답변 생성 1회만 호출
        assert_eq!(chat.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_optimization_rewrites_query() {
        let dir = TempDir::new().unwrap();
        let chat = Arc::new(
            ScriptedChat::new("근로소득은 급여입니다.").push(Ok("근로소득이 있는 거주자의 소득세")),
        );
        let rag = engine(ingested_database(&dir).await, chat.clone(), true);

        let outcome = rag
            .process_query("직장인 세금", &ConversationHistory::default())
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.original_query, "직장인 세금");
        assert_eq!(outcome.improved_query, "근로소득이 있는 거주자의 소득세");
        assert_eq!(outcome.answer, "근로소득은 급여입니다.");
        assert_eq!(outcome.sources.len(), 3);
        assert!(chat.prompts()[0].contains("세금 관련 사전"));
    }

    #[tokio::test]
    async fn test_rewrite_failure_falls_back() {
        let dir = TempDir::new().unwrap();
        let chat = Arc::new(ScriptedChat::new("답변").push(Err("quota exceeded")));
        let rag = engine(ingested_database(&dir).await, chat, true);

        let outcome = rag
            .process_query("양도소득 범위", &ConversationHistory::default())
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.improved_query, "양도소득 범위");
    }

    #[tokio::test]
    async fn test_same_question_same_sources() {
        let dir = TempDir::new().unwrap();
        let chat = Arc::new(ScriptedChat::new("답변"));
        let rag = engine(ingested_database(&dir).await, chat, false);
        let history = ConversationHistory::default();

        let first = rag.process_query("근로소득 세액공제", &history).await;
        let second = rag.process_query("근로소득 세액공제", &history).await;

        let ids = |o: &QueryOutcome| o.sources.iter().map(|s| s.chunk.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn test_answer_timeout_is_friendly() {
        let dir = TempDir::new().unwrap();
        let chat = Arc::new(ScriptedChat::new("늦은 답변").with_delay(Duration::from_millis(200)));
        let rag = EnhancedRag::new(
            ingested_database(&dir).await,
            Arc::new(KeywordEmbedder::new()),
            chat,
            EngineOptions {
                use_query_optimization: false,
                answer_timeout: Duration::from_millis(20),
                ..EngineOptions::default()
            },
        );

        let outcome = rag
            .process_query("근로소득", &ConversationHistory::default())
            .await;
        assert!(!outcome.success);
        assert!(outcome.answer.contains("시간이 오래 걸리고 있습니다"));
    }

    #[tokio::test]
    async fn test_generation_error_is_reported() {
        let dir = TempDir::new().unwrap();
        let chat = Arc::new(ScriptedChat::new("unused").push(Err("500 internal")));
        let rag = engine(ingested_database(&dir).await, chat, false);

        let outcome = rag
            .process_query("근로소득", &ConversationHistory::default())
            .await;
        assert!(!outcome.success);
        assert!(outcome.answer.starts_with("죄송합니다"));
    }

    #[tokio::test]
    async fn test_history_context_in_prompt() {
        let dir = TempDir::new().unwrap();
        let chat = Arc::new(ScriptedChat::new("답변"));
        let rag = engine(ingested_database(&dir).await, chat.clone(), false);

        let mut history = ConversationHistory::default();
        history.add_turn("근로소득?", "근로소득은 봉급입니다.", vec![]);

        rag.process_query("근로소득 공제는?", &history).await;
        assert!(chat.prompts()[0].contains("근로소득은 봉급입니다"));
    }

    #[tokio::test]
    async fn test_toggles_and_status() {
        let dir = TempDir::new().unwrap();
        let mut rag = engine(
            ingested_database(&dir).await,
            Arc::new(ScriptedChat::new("답변")),
            true,
        );

        assert!(!rag.toggle_optimization());
        assert!(!rag.toggle_few_shot());
        let status = rag.optimization_status();
        assert!(!status.enabled);
        assert!(!status.few_shot);
        assert_eq!(status.dictionary_count, TAX_DICTIONARY.len());

        rag.set_optimization(true);
        assert!(rag.options().use_query_optimization);
    }
}

//! 세션 모듈 - 공유 리소스 캐시와 사용자별 세션
//!
//! `AppContext`는 임베딩(공급자 + API 키 SHA-256별), 데이터베이스(공급자별),
//! 채팅 모델(API 키 SHA-256별)을 캐시합니다. 원본 API 키는 맵 키로 저장하지 않습니다.
//! Gemini 임베딩은 환경변수 키가 있으면 항상 그 키로 만들고,
//! 없을 때만 세션이 입력한 키를 씁니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::embedding::{create_embedder, EmbeddingChoice, EmbeddingProvider};
use crate::error::RagError;
use crate::knowledge::{sha256_hex, ChunkConfig, DatabaseManager};
use crate::llm::{ChatModel, GeminiChat};
use crate::rag::{
    CommandProcessor, ConversationHistory, EngineOptions, EnhancedRag, HistoryStatus,
    OptimizationStatus, QueryOutcome,
};

// ============================================================================
// Provider Factory
// ============================================================================

/// 임베딩/채팅 모델 생성 트레이트
pub trait ProviderFactory: Send + Sync {
    fn embedder(
        &self,
        choice: EmbeddingChoice,
        api_key: Option<&str>,
    ) -> Result<Arc<dyn EmbeddingProvider>>;

    fn chat_model(&self, api_key: &str, model: &str) -> Result<Arc<dyn ChatModel>>;
}

/// Gemini API 기반 기본 팩토리
pub struct GeminiProviders;

impl ProviderFactory for GeminiProviders {
    fn embedder(
        &self,
        choice: EmbeddingChoice,
        api_key: Option<&str>,
    ) -> Result<Arc<dyn EmbeddingProvider>> {
        create_embedder(choice, api_key)
    }

    fn chat_model(&self, api_key: &str, model: &str) -> Result<Arc<dyn ChatModel>> {
        Ok(Arc::new(GeminiChat::new(api_key, model)?))
    }
}

// ============================================================================
// Types
// ============================================================================

/// 세션 생성 설정
#[derive(Clone, Default)]
pub struct SessionConfig {
    /// 화면에서 입력한 키 (없으면 환경변수 키)
    pub api_key: Option<String>,
    pub embedding: Option<EmbeddingChoice>,
    pub use_query_optimization: Option<bool>,
    pub use_few_shot: Option<bool>,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("embedding", &self.embedding)
            .field("use_query_optimization", &self.use_query_optimization)
            .field("use_few_shot", &self.use_few_shot)
            .finish()
    }
}

/// 캐시된 리소스 현황
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub embeddings: Vec<EmbeddingChoice>,
    pub databases: Vec<EmbeddingChoice>,
    pub chat_models: usize,
}

/// 임베딩 캐시 키
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EmbedderKey {
    choice: EmbeddingChoice,
    /// API 키 SHA-256 (키가 필요 없는 공급자는 None)
    key_hash: Option<String>,
}

#[derive(Default)]
struct ResourceCache {
    embedders: HashMap<EmbedderKey, Arc<dyn EmbeddingProvider>>,
    databases: HashMap<EmbeddingChoice, Arc<DatabaseManager>>,
    /// key: API 키 SHA-256
    chat_models: HashMap<String, Arc<dyn ChatModel>>,
}

// ============================================================================
// AppContext
// ============================================================================

/// 프로세스 전체에서 공유하는 리소스 컨텍스트
pub struct AppContext {
    settings: Settings,
    providers: Arc<dyn ProviderFactory>,
    cache: Mutex<ResourceCache>,
}

impl AppContext {
    /// Gemini 팩토리로 생성
    pub fn new(settings: Settings) -> Self {
        Self::with_providers(settings, Arc::new(GeminiProviders))
    }

    pub fn with_providers(settings: Settings, providers: Arc<dyn ProviderFactory>) -> Self {
        Self {
            settings,
            providers,
            cache: Mutex::new(ResourceCache::default()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn chunk_config(&self) -> Result<ChunkConfig> {
        ChunkConfig::new(self.settings.chunk_size, self.settings.chunk_overlap)
            .map_err(|e| RagError::Config(e.to_string()).into())
    }

    /// 임베딩에 쓸 API 키 (환경변수 키 우선)
    fn embedding_key<'a>(
        &'a self,
        choice: EmbeddingChoice,
        session_key: Option<&'a str>,
    ) -> Option<&'a str> {
        if !choice.requires_api_key() {
            return None;
        }
        self.settings
            .api_key
            .as_deref()
            .or(session_key)
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// 임베딩 프로바이더 (공급자 + 키 해시별 캐시)
    ///
    /// 환경변수 키가 있으면 `session_key`는 무시합니다.
    pub async fn embedder(
        &self,
        choice: EmbeddingChoice,
        session_key: Option<&str>,
    ) -> Result<Arc<dyn EmbeddingProvider>> {
        let api_key = self.embedding_key(choice, session_key);
        let key = EmbedderKey {
            choice,
            key_hash: api_key.map(|k| sha256_hex(k.as_bytes())),
        };

        let mut cache = self.cache.lock().await;
        if let Some(embedder) = cache.embedders.get(&key) {
            return Ok(embedder.clone());
        }

        let embedder = self.providers.embedder(choice, api_key)?;
        tracing::info!("Created embedding provider: {}", embedder.name());
        cache.embedders.insert(key, embedder.clone());
        Ok(embedder)
    }

    /// 데이터베이스 관리자 (공급자별 캐시, 디스크는 건드리지 않음)
    pub async fn database(&self, choice: EmbeddingChoice) -> Arc<DatabaseManager> {
        let mut cache = self.cache.lock().await;
        cache
            .databases
            .entry(choice)
            .or_insert_with(|| {
                Arc::new(DatabaseManager::new(
                    &self.settings.data_dir,
                    choice,
                    self.chunk_config().unwrap_or_default(),
                ))
            })
            .clone()
    }

    /// 채팅 모델 (API 키 해시별 캐시)
    pub async fn chat_model(&self, api_key: &str) -> Result<Arc<dyn ChatModel>> {
        let key_hash = sha256_hex(api_key.trim().as_bytes());
        let mut cache = self.cache.lock().await;
        if let Some(chat) = cache.chat_models.get(&key_hash) {
            return Ok(chat.clone());
        }

        let chat = self
            .providers
            .chat_model(api_key, &self.settings.chat_model)?;
        tracing::info!("Created chat model: {}", chat.name());
        cache.chat_models.insert(key_hash, chat.clone());
        Ok(chat)
    }

    /// 사용자 세션 생성
    ///
    /// API 키가 없으면 어떤 프로바이더도 만들지 않고 `RagError::MissingApiKey`를 반환합니다.
    pub async fn create_session(&self, config: SessionConfig) -> Result<UserSession> {
        let api_key = self
            .settings
            .resolve_api_key(config.api_key.as_deref())
            .ok_or(RagError::MissingApiKey)?;

        let choice = config.embedding.unwrap_or(self.settings.embedding);
        self.chunk_config()?;
        let embedder = self.embedder(choice, Some(&api_key)).await?;
        let database = self.database(choice).await;
        let report = database
            .ensure_ingested(embedder.as_ref(), &self.settings.document_path)
            .await
            .context("Failed to prepare vector store")?;
        if !report.skipped {
            tracing::info!(
                "Vector store created with {} chunks",
                report.total_chunks
            );
        }
        let chat = self.chat_model(&api_key).await?;

        let mut options = EngineOptions::from_settings(&self.settings);
        if let Some(enabled) = config.use_query_optimization {
            options.use_query_optimization = enabled;
        }
        if let Some(enabled) = config.use_few_shot {
            options.use_few_shot = enabled;
        }

        let session = UserSession::new(
            choice,
            EnhancedRag::new(database, embedder, chat, options),
            ConversationHistory::new(self.settings.max_history),
        );
        tracing::info!("Created session {} ({})", session.id(), choice);
        Ok(session)
    }

    /// 캐시된 데이터베이스와 그 공급자의 임베딩 해제
    pub async fn clear_database_cache(&self, choice: EmbeddingChoice) -> bool {
        let (database, embedders) = {
            let mut cache = self.cache.lock().await;
            let before = cache.embedders.len();
            cache.embedders.retain(|key, _| key.choice != choice);
            (cache.databases.remove(&choice), before - cache.embedders.len())
        };

        if embedders > 0 {
            tracing::info!("Cleared {} cached embedding provider(s): {}", embedders, choice);
        }
        match database {
            Some(database) => {
                database.close().await;
                tracing::info!("Cleared cached database: {}", choice);
                true
            }
            None => embedders > 0,
        }
    }

    /// 캐시 현황
    pub async fn resource_status(&self) -> ResourceStatus {
        let cache = self.cache.lock().await;
        let mut embeddings: Vec<_> = cache.embedders.keys().map(|k| k.choice).collect();
        let mut databases: Vec<_> = cache.databases.keys().copied().collect();
        embeddings.sort_by_key(|c| c.key());
        embeddings.dedup();
        databases.sort_by_key(|c| c.key());

        ResourceStatus {
            embeddings,
            databases,
            chat_models: cache.chat_models.len(),
        }
    }
}

// ============================================================================
// UserSession
// ============================================================================

/// 입력 처리 결과
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionReply {
    /// 명령어 실행 결과
    Command { message: String },
    /// 질문 답변
    Answer(QueryOutcome),
}

/// 세션 상태
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: String,
    pub embedding: EmbeddingChoice,
    pub created_at: DateTime<Utc>,
    pub history: HistoryStatus,
    pub optimization: OptimizationStatus,
    pub top_k: usize,
}

/// 사용자별 세션 (엔진 + 대화 히스토리)
pub struct UserSession {
    id: String,
    embedding: EmbeddingChoice,
    created_at: DateTime<Utc>,
    engine: EnhancedRag,
    history: ConversationHistory,
}

impl UserSession {
    pub fn new(embedding: EmbeddingChoice, engine: EnhancedRag, history: ConversationHistory) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            embedding,
            created_at: Utc::now(),
            engine,
            history,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn engine(&self) -> &EnhancedRag {
        &self.engine
    }

    /// 질문 처리 (성공한 답변만 히스토리에 추가)
    pub async fn process_query(&mut self, question: &str) -> QueryOutcome {
        let outcome = self.engine.process_query(question, &self.history).await;
        if outcome.success {
            let sources = outcome.sources.iter().map(|s| s.chunk.clone()).collect();
            self.history.add_turn(question, &outcome.answer, sources);
        }
        outcome
    }

    /// 명령어면 실행, 아니면 질문으로 처리
    pub async fn handle_input(&mut self, input: &str) -> SessionReply {
        if let Some(message) = self.commands().process(input) {
            return SessionReply::Command { message };
        }
        SessionReply::Answer(self.process_query(input).await)
    }

    pub fn commands(&mut self) -> CommandProcessor<'_> {
        CommandProcessor::new(&mut self.history, &mut self.engine)
    }

    /// 대화 초기화 (히스토리 활성화)
    pub fn reset(&mut self) -> usize {
        self.history.reset()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            id: self.id.clone(),
            embedding: self.embedding,
            created_at: self.created_at,
            history: self.history.status(),
            optimization: self.engine.optimization_status(),
            top_k: self.engine.options().top_k,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

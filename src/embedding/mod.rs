//! 임베딩 모듈 - 텍스트 벡터화 프로바이더
//!
//! 두 가지 프로바이더를 제공합니다:
//! - Gemini API (`gemini-embedding-001`, 기본값)
//! - 로컬 다국어 모델 (`local-embedding` feature, 한국어 지원)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(EmbeddingChoice::Gemini, Some(&api_key))?;
//! let embedding = embedder.embed("근로소득공제").await?;
//! ```

#[cfg(feature = "local-embedding")]
mod local;

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::RagError;

#[cfg(feature = "local-embedding")]
pub use local::LocalEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 텍스트를 벡터로 변환하는 프로바이더
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩 (문서용)
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 검색 질의 임베딩 (기본 구현: 문서용과 동일)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 여러 문서 임베딩 (입력 순서 유지)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

// ============================================================================
// Embedding Choice
// ============================================================================

/// 임베딩 프로바이더 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingChoice {
    /// Google Gemini 임베딩
    Gemini,
    /// 로컬 다국어 모델 (한국어 지원)
    Local,
}

impl EmbeddingChoice {
    /// 저장소 디렉토리 이름 등에 쓰이는 키
    pub fn key(&self) -> &'static str {
        match self {
            EmbeddingChoice::Gemini => "gemini",
            EmbeddingChoice::Local => "local",
        }
    }

    /// 화면 표시용 이름
    pub fn label(&self) -> &'static str {
        match self {
            EmbeddingChoice::Gemini => "🌐 Google Gemini (gemini-embedding-001)",
            EmbeddingChoice::Local => "🇰🇷 로컬 다국어 모델 (paraphrase-multilingual-MiniLM-L12-v2)",
        }
    }

    /// 네트워크 임베딩 여부 (API 키 필요)
    pub fn requires_api_key(&self) -> bool {
        matches!(self, EmbeddingChoice::Gemini)
    }
}

impl fmt::Display for EmbeddingChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EmbeddingChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" | "2" => Ok(EmbeddingChoice::Gemini),
            "local" | "korean" | "1" => Ok(EmbeddingChoice::Local),
            other => Err(format!("unknown embedding provider: {}", other)),
        }
    }
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// 모델 이름 (MRL 지원으로 출력 차원 선택 가능)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_EMBED_MODEL: &str = "gemini-embedding-001";
const GEMINI_MODELS_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;
const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];
/// 이 차원에서만 API가 정규화된 벡터를 돌려줌
const FULL_DIMENSION: usize = 3072;

/// batchEmbedContents 요청당 최대 텍스트 수
const MAX_BATCH: usize = 100;

/// 무료 티어 한도 (분당 100 요청) + 요청 간 최소 간격
const REQUESTS_PER_MINUTE: usize = 100;
const PACING_WINDOW: Duration = Duration::from_secs(60);
const MIN_SPACING: Duration = Duration::from_millis(600);

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    pacer: Mutex<Pacer>,
}

/// 슬라이딩 윈도우 요청 간격 조절기
#[derive(Debug)]
struct Pacer {
    sent: VecDeque<Instant>,
    limit: usize,
    window: Duration,
    spacing: Duration,
}

impl Pacer {
    fn new(limit: usize, window: Duration, spacing: Duration) -> Self {
        Self {
            sent: VecDeque::with_capacity(limit),
            limit,
            window,
            spacing,
        }
    }

    /// `now`에 요청하려면 기다려야 하는 시간
    fn delay(&self, now: Instant) -> Duration {
        let spacing = self
            .sent
            .back()
            .map(|last| self.spacing.saturating_sub(now.duration_since(*last)))
            .unwrap_or_default();

        let recent = self
            .sent
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count();
        let window = match self.sent.iter().rev().nth(self.limit.saturating_sub(1)) {
            Some(oldest) if recent >= self.limit => {
                self.window.saturating_sub(now.duration_since(*oldest))
            }
            _ => Duration::ZERO,
        };

        spacing.max(window)
    }

    fn record(&mut self, at: Instant) {
        while self
            .sent
            .front()
            .is_some_and(|t| at.duration_since(*t) >= self.window)
        {
            self.sent.pop_front();
        }
        self.sent.push_back(at);
    }

    async fn wait_turn(&mut self) {
        loop {
            let delay = self.delay(Instant::now());
            if delay.is_zero() {
                break;
            }
            tracing::debug!("Pacing Gemini request: waiting {:?}", delay);
            tokio::time::sleep(delay).await;
        }
        self.record(Instant::now());
    }
}

/// 임베딩 작업 유형
/// source: https://ai.google.dev/api/embeddings#tasktype
#[derive(Debug, Clone, Copy)]
enum TaskType {
    Document,
    Query,
}

impl TaskType {
    fn as_str(&self) -> &'static str {
        match self {
            TaskType::Document => "RETRIEVAL_DOCUMENT",
            TaskType::Query => "RETRIEVAL_QUERY",
        }
    }
}

impl GeminiEmbedding {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 출력 차원 지정 (768, 1536, 3072)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&dimension) {
            return Err(RagError::Config(format!(
                "Invalid dimension: {} (supported: {:?})",
                dimension, SUPPORTED_DIMENSIONS
            ))
            .into());
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            dimension,
            pacer: Mutex::new(Pacer::new(REQUESTS_PER_MINUTE, PACING_WINDOW, MIN_SPACING)),
        })
    }

    fn request<'a>(&self, text: &'a str, task: TaskType) -> EmbedRequest<'a> {
        EmbedRequest {
            model: format!("models/{}", GEMINI_EMBED_MODEL),
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
            task_type: task.as_str(),
            output_dimensionality: self.dimension,
        }
    }

    /// 간격 조절 후 POST, 에러 응답은 상태/메시지로 변환
    async fn post<B: Serialize, R: DeserializeOwned>(&self, method: &str, body: &B) -> Result<R> {
        self.pacer.lock().await.wait_turn().await;

        let url = format!("{}/{}:{}", GEMINI_MODELS_URL, GEMINI_EMBED_MODEL, method);
        // API 키는 URL이 아닌 헤더로 전송
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            let detail = serde_json::from_str::<GeminiError>(&text)
                .map(|e| format!("{}: {}", e.error.status, e.error.message))
                .unwrap_or(text);
            anyhow::bail!("Gemini API error ({}): {}", status, detail);
        }

        serde_json::from_str(&text).with_context(|| format!("Failed to parse {} response", method))
    }

    async fn embed_one(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }
        let response: EmbedResponse = self
            .post("embedContent", &self.request(text, task))
            .await?;
        Ok(self.finish(response.embedding.values))
    }

    /// 잘린 차원(768, 1536)의 벡터는 단위 길이로 정규화
    fn finish(&self, values: Vec<f32>) -> Vec<f32> {
        if self.dimension == FULL_DIMENSION {
            values
        } else {
            l2_normalize(values)
        }
    }
}

/// L2 정규화 (영벡터는 그대로)
fn l2_normalize(mut values: Vec<f32>) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        values.iter_mut().for_each(|v| *v /= norm);
    }
    values
}

/// 임베딩 요청
/// source: https://ai.google.dev/api/embeddings#method:-models.embedcontent
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Values,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Values>,
}

#[derive(Debug, Deserialize)]
struct Values {
    values: Vec<f32>,
}

/// Gemini API 에러 응답 (채팅 모델과 공유)
#[derive(Debug, Deserialize)]
pub(crate) struct GeminiError {
    pub(crate) error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorDetail {
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) status: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text, TaskType::Document).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text, TaskType::Query).await
    }

    /// batchEmbedContents로 최대 100개씩 묶어 요청 (빈 텍스트는 영벡터)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = vec![vec![0.0; self.dimension]; texts.len()];
        let pending: Vec<usize> = (0..texts.len())
            .filter(|&i| !texts[i].trim().is_empty())
            .collect();

        for (n, group) in pending.chunks(MAX_BATCH).enumerate() {
            tracing::debug!(
                "Embedding batch {}/{} ({} texts)",
                n + 1,
                pending.len().div_ceil(MAX_BATCH),
                group.len()
            );
            let body = BatchEmbedRequest {
                requests: group
                    .iter()
                    .map(|&i| self.request(&texts[i], TaskType::Document))
                    .collect(),
            };
            let response: BatchEmbedResponse = self.post("batchEmbedContents", &body).await?;
            if response.embeddings.len() != group.len() {
                anyhow::bail!(
                    "Gemini returned {} embeddings for {} texts",
                    response.embeddings.len(),
                    group.len()
                );
            }
            for (&i, values) in group.iter().zip(response.embeddings) {
                results[i] = self.finish(values.values);
            }
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        GEMINI_EMBED_MODEL
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 선택한 임베딩 프로바이더 생성
///
/// Gemini는 API 키가 없으면 네트워크 호출 없이 `RagError::MissingApiKey`로 실패합니다.
pub fn create_embedder(
    choice: EmbeddingChoice,
    api_key: Option<&str>,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match choice {
        EmbeddingChoice::Gemini => {
            let api_key = api_key
                .filter(|k| !k.trim().is_empty())
                .ok_or(RagError::MissingApiKey)?;
            let embedder = GeminiEmbedding::new(api_key.to_string())?;
            tracing::info!(
                "Using Gemini API embedding (dimension: {})",
                embedder.dimension()
            );
            Ok(Arc::new(embedder))
        }
        EmbeddingChoice::Local => create_local_embedder(),
    }
}

#[cfg(feature = "local-embedding")]
fn create_local_embedder() -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder = LocalEmbedding::new()?;
    tracing::info!(
        "Using local embedding model (dimension: {})",
        embedder.dimension()
    );
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "local-embedding"))]
fn create_local_embedder() -> Result<Arc<dyn EmbeddingProvider>> {
    Err(RagError::Config(
        "로컬 임베딩 모델은 `local-embedding` 기능으로 빌드해야 사용할 수 있습니다".to_string(),
    )
    .into())
}

// ============================================================================
// Tests
// ============================================================================

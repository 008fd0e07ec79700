//! 로컬 다국어 임베딩 (fastembed / ONNX)
//!
//! 네트워크 호출 없이 한국어를 포함한 다국어 문장을 임베딩합니다.
//! 최초 실행 시 모델 파일을 내려받아 캐시합니다.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::EmbeddingProvider;

/// paraphrase-multilingual-MiniLM-L12-v2 출력 차원
const LOCAL_DIMENSION: usize = 384;

/// 로컬 임베딩 구현체
pub struct LocalEmbedding {
    // ONNX 세션은 동시 호출을 지원하지 않으므로 Mutex로 보호
    model: Arc<Mutex<TextEmbedding>>,
}

impl LocalEmbedding {
    /// 모델 로드
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(InitOptions::new(
            EmbeddingModel::ParaphraseMLMiniLML12V2,
        ))
        .context("Failed to load local embedding model")?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            model
                .lock()
                .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?
                .embed(texts, None)
        })
        .await
        .context("Local embedding task failed")?
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Local model returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.run(texts.to_vec()).await
    }

    fn dimension(&self) -> usize {
        LOCAL_DIMENSION
    }

    fn name(&self) -> &str {
        "paraphrase-multilingual-MiniLM-L12-v2"
    }
}

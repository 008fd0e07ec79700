//! Database Manager - 임베딩 공급자별 벡터 저장소 관리
//!
//! 저장소 레이아웃:
//! ```text
//! <data_dir>/store_<provider>/vectors.lance/   # LanceDB
//! <data_dir>/store_<provider>/manifest.db      # 적재 기록
//! <data_dir>/backups/store_<provider>_<YYYYmmdd_HHMMSS>/
//! ```
//!
//! 관리자는 저장소만 소유합니다. 적재와 검색은 호출자가 임베딩을 넘기므로
//! 같은 저장소를 서로 다른 API 키의 세션이 함께 씁니다.
//!
//! 같은 프로세스 안에서는 `ops` 뮤텍스로 적재/백업/복원/삭제/재구축을 직렬화합니다.
//! 프로세스 간 잠금은 없습니다.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use walkdir::WalkDir;

use super::chunker::{recursive_chunker, ChunkConfig};
use super::lance::LanceVectorStore;
use super::manifest::{IngestRecord, Manifest};
use super::vector::{Chunk, RetrievedChunk, VectorEntry, VectorStore};
use crate::embedding::{EmbeddingChoice, EmbeddingProvider};
use crate::error::RagError;
use crate::loader::load_document;

const LANCE_DIR: &str = "vectors.lance";
const MANIFEST_FILE: &str = "manifest.db";
const BACKUP_DIR: &str = "backups";

// ============================================================================
// Types
// ============================================================================

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub provider: EmbeddingChoice,
    pub path: PathBuf,
    pub exists: bool,
    pub chunk_count: usize,
    pub size_bytes: u64,
    pub file_count: usize,
    /// 적재된 문서 기록
    pub ingested: Vec<IngestRecord>,
}

/// 백업 정보
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// 적재 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub source: PathBuf,
    /// 기존 데이터가 있어 건너뛰었는지
    pub skipped: bool,
    /// 이번에 업서트한 청크 수
    pub chunks_written: usize,
    /// 적재 후 저장소 전체 청크 수
    pub total_chunks: usize,
    pub elapsed_ms: u64,
}

/// 열린 저장소 핸들
struct StoreHandles {
    vectors: LanceVectorStore,
    manifest: Manifest,
}

impl StoreHandles {
    async fn open(store_dir: &Path) -> Result<Self> {
        let vectors = LanceVectorStore::open(&store_dir.join(LANCE_DIR)).await?;
        let manifest = Manifest::open(&store_dir.join(MANIFEST_FILE))?;
        Ok(Self { vectors, manifest })
    }
}

// ============================================================================
// DatabaseManager
// ============================================================================

/// 임베딩 공급자 하나에 대응하는 벡터 저장소 관리자
pub struct DatabaseManager {
    choice: EmbeddingChoice,
    store_dir: PathBuf,
    backup_dir: PathBuf,
    chunk_config: ChunkConfig,
    handles: RwLock<Option<StoreHandles>>,
    ops: Mutex<()>,
}

impl DatabaseManager {
    /// 관리자 생성 (디스크는 건드리지 않음)
    pub fn new(data_dir: &Path, choice: EmbeddingChoice, chunk_config: ChunkConfig) -> Self {
        Self {
            choice,
            store_dir: data_dir.join(format!("store_{}", choice.key())),
            backup_dir: data_dir.join(BACKUP_DIR),
            chunk_config,
            handles: RwLock::new(None),
            ops: Mutex::new(()),
        }
    }

    pub fn choice(&self) -> EmbeddingChoice {
        self.choice
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// 저장소 디렉토리 존재 여부
    pub fn exists(&self) -> bool {
        self.store_dir.join(LANCE_DIR).exists()
    }

    /// 핸들 열기 (필요 시)
    async fn handles(&self) -> Result<RwLockReadGuard<'_, StoreHandles>> {
        if self.handles.read().await.is_none() {
            let mut guard = self.handles.write().await;
            if guard.is_none() {
                tracing::debug!("Opening vector store at {:?}", self.store_dir);
                *guard = Some(StoreHandles::open(&self.store_dir).await?);
            }
        }

        RwLockReadGuard::try_map(self.handles.read().await, Option::as_ref)
            .map_err(|_| anyhow::Error::from(RagError::NotInitialized))
    }

    /// 열린 핸들 닫기 (캐시 해제)
    pub async fn close(&self) {
        let mut guard = self.handles.write().await;
        if guard.take().is_some() {
            tracing::debug!("Closed vector store at {:?}", self.store_dir);
        }
    }

    /// 저장된 청크 수
    pub async fn count(&self) -> Result<usize> {
        if !self.exists() {
            return Ok(0);
        }
        self.handles().await?.vectors.count().await
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// 저장소가 비어 있을 때만 문서 적재
    pub async fn ensure_ingested(
        &self,
        embedder: &dyn EmbeddingProvider,
        document: &Path,
    ) -> Result<IngestReport> {
        self.ingest(embedder, document, false).await
    }

    /// 문서 적재
    ///
    /// `force`가 아니면 저장소에 청크가 있을 때 건너뜁니다.
    /// 청크 ID가 결정적이므로 같은 문서를 다시 넣어도 중복되지 않습니다.
    pub async fn ingest(
        &self,
        embedder: &dyn EmbeddingProvider,
        document: &Path,
        force: bool,
    ) -> Result<IngestReport> {
        let ops = self.ops.lock().await;
        self.ingest_locked(&ops, embedder, document, force).await
    }

    async fn ingest_locked(
        &self,
        _ops: &MutexGuard<'_, ()>,
        embedder: &dyn EmbeddingProvider,
        document: &Path,
        force: bool,
    ) -> Result<IngestReport> {
        let start = Instant::now();

        let existing = self.count().await?;
        if existing > 0 && !force {
            tracing::info!(
                "Vector store already has {} chunks, skipping ingestion",
                existing
            );
            return Ok(IngestReport {
                source: document.to_path_buf(),
                skipped: true,
                chunks_written: 0,
                total_chunks: existing,
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }

        let doc = load_document(document).await?;
        let source = doc.source.display().to_string();

        let chunker = recursive_chunker(self.chunk_config.clone());
        let texts = chunker.chunk(&doc.text);
        tracing::info!(
            "Split {:?} into {} chunks ({})",
            document,
            texts.len(),
            chunker.name()
        );

        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .context("Failed to embed document chunks")?;
        if embeddings.len() != texts.len() {
            anyhow::bail!(
                "Embedding count mismatch: {} chunks, {} embeddings",
                texts.len(),
                embeddings.len()
            );
        }

        let entries: Vec<VectorEntry> = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (text, embedding))| VectorEntry {
                chunk: Chunk::new(&doc.source, index, text),
                embedding,
            })
            .collect();

        let handles = self.handles().await?;

        // 내용이 바뀐 문서는 이전 청크를 먼저 제거
        if let Some(previous) = handles.manifest.get(&source, self.choice.key())? {
            if previous.content_hash != doc.content_hash {
                let removed = handles.vectors.delete_by_source(&source).await?;
                tracing::info!("Document changed, removed {} stale chunks", removed);
            }
        }

        let written = handles
            .vectors
            .upsert(&entries)
            .await
            .map_err(|e| RagError::Store(format!("{:#}", e)))?;

        handles.manifest.record(&IngestRecord {
            source,
            content_hash: doc.content_hash,
            chunk_count: written,
            provider: self.choice.key().to_string(),
            ingested_at: Utc::now(),
        })?;

        let total = handles.vectors.count().await?;
        tracing::info!(
            "Ingested {} chunks into {:?} (total {})",
            written,
            self.store_dir,
            total
        );

        Ok(IngestReport {
            source: document.to_path_buf(),
            skipped: false,
            chunks_written: written,
            total_chunks: total,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// 질의와 가장 가까운 청크 k개
    pub async fn search(
        &self,
        embedder: &dyn EmbeddingProvider,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        if !self.exists() {
            return Err(RagError::NotInitialized.into());
        }

        let embedding = embedder.embed_query(query).await?;
        let handles = self.handles().await?;
        let results = handles.vectors.search(&embedding, k).await?;

        tracing::debug!("Retrieved {} chunks for query", results.len());
        Ok(results)
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// 저장소 통계
    pub async fn stats(&self) -> Result<StoreStats> {
        let exists = self.exists();
        let (chunk_count, ingested) = if exists {
            let handles = self.handles().await?;
            (handles.vectors.count().await?, handles.manifest.list()?)
        } else {
            (0, vec![])
        };
        let (size_bytes, file_count) = dir_size(&self.store_dir);

        Ok(StoreStats {
            provider: self.choice,
            path: self.store_dir.clone(),
            exists,
            chunk_count,
            size_bytes,
            file_count,
            ingested,
        })
    }

    /// 타임스탬프 이름으로 저장소 백업
    pub async fn backup(&self) -> Result<BackupInfo> {
        let _ops = self.ops.lock().await;

        if !self.exists() {
            return Err(RagError::Store("백업할 데이터베이스가 없습니다".to_string()).into());
        }

        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let mut name = format!("{}{}", self.backup_prefix(), stamp);
        let mut suffix = 1;
        while self.backup_dir.join(&name).exists() {
            suffix += 1;
            name = format!("{}{}_{}", self.backup_prefix(), stamp, suffix);
        }
        let target = self.backup_dir.join(&name);

        // 쓰기 중인 핸들이 없도록 닫고 복사
        self.close().await;
        copy_dir(&self.store_dir, &target).await?;

        tracing::info!("Backed up {:?} to {:?}", self.store_dir, target);
        backup_info(name, target)
    }

    /// 이 공급자의 백업 목록 (최신순)
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        if !self.backup_dir.exists() {
            return Ok(vec![]);
        }

        let prefix = self.backup_prefix();
        let mut backups = Vec::new();
        for entry in std::fs::read_dir(&self.backup_dir)
            .with_context(|| format!("Failed to read {:?}", self.backup_dir))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.path().is_dir() && name.starts_with(&prefix) {
                backups.push(backup_info(name, entry.path())?);
            }
        }

        backups.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(backups)
    }

    /// 백업에서 복원 (현재 저장소를 교체)
    pub async fn restore(&self, name: &str) -> Result<StoreStats> {
        {
            let _ops = self.ops.lock().await;

            let valid_name = name.starts_with(&self.backup_prefix())
                && !name.contains(['/', '\\'])
                && !name.contains("..");
            let source = self.backup_dir.join(name);
            if !valid_name || !source.is_dir() {
                return Err(RagError::BackupNotFound(name.to_string()).into());
            }

            self.close().await;
            remove_dir(&self.store_dir).await?;
            copy_dir(&source, &self.store_dir).await?;
            tracing::info!("Restored {:?} from {:?}", self.store_dir, source);
        }

        self.stats().await
    }

    /// 저장소 삭제 (없으면 false)
    pub async fn delete(&self) -> Result<bool> {
        let ops = self.ops.lock().await;
        self.delete_locked(&ops).await
    }

    async fn delete_locked(&self, _ops: &MutexGuard<'_, ()>) -> Result<bool> {
        self.close().await;

        if !self.store_dir.exists() {
            return Ok(false);
        }
        remove_dir(&self.store_dir).await?;
        tracing::info!("Deleted vector store {:?}", self.store_dir);
        Ok(true)
    }

    /// 삭제 후 다시 적재
    ///
    /// 삭제와 적재 사이에 다른 작업이 끼어들지 않도록 잠금을 끝까지 유지합니다.
    pub async fn rebuild(
        &self,
        embedder: &dyn EmbeddingProvider,
        document: &Path,
    ) -> Result<IngestReport> {
        let ops = self.ops.lock().await;

        // 문서가 없으면 기존 저장소를 지우기 전에 실패
        if !document.exists() {
            return Err(RagError::DocumentNotFound(document.to_path_buf()).into());
        }
        self.delete_locked(&ops).await?;
        self.ingest_locked(&ops, embedder, document, true).await
    }

    fn backup_prefix(&self) -> String {
        format!("store_{}_", self.choice.key())
    }
}

// ============================================================================
// Filesystem Helpers
// ============================================================================

/// 디렉토리 전체 크기와 파일 수
fn dir_size(path: &Path) -> (u64, usize) {
    if !path.exists() {
        return (0, 0);
    }

    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(size, count), e| {
            let len = e.metadata().map(|m| m.len()).unwrap_or(0);
            (size + len, count + 1)
        })
}

fn backup_info(name: String, path: PathBuf) -> Result<BackupInfo> {
    let created_at = std::fs::metadata(&path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    let (size_bytes, _) = dir_size(&path);

    Ok(BackupInfo {
        name,
        path,
        created_at,
        size_bytes,
    })
}

/// 디렉토리 재귀 복사
async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    let from = from.to_path_buf();
    let to = to.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        for entry in WalkDir::new(&from) {
            let entry = entry.with_context(|| format!("Failed to walk {:?}", from))?;
            let relative = entry
                .path()
                .strip_prefix(&from)
                .context("Unexpected path outside of copy root")?;
            let target = to.join(relative);

            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)
                    .with_context(|| format!("Failed to create {:?}", target))?;
            } else {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(entry.path(), &target)
                    .with_context(|| format!("Failed to copy {:?}", entry.path()))?;
            }
        }
        Ok(())
    })
    .await
    .context("Copy task failed")?
}

async fn remove_dir(path: &Path) -> Result<()> {
    if path.exists() {
        tokio::fs::remove_dir_all(path)
            .await
            .with_context(|| format!("Failed to remove {:?}", path))?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

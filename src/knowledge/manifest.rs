//! Ingestion Manifest - rusqlite 기반 적재 기록
//!
//! 어떤 문서(경로 + 내용 해시)가 어느 임베딩 저장소에 몇 개의 청크로
//! 적재되었는지 기록합니다. 저장 위치: `<store_dir>/manifest.db`

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;

// ============================================================================
// Types
// ============================================================================

/// 적재 기록
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestRecord {
    /// 원본 문서 경로
    pub source: String,
    /// 원본 파일 SHA-256
    pub content_hash: String,
    /// 적재된 청크 수
    pub chunk_count: usize,
    /// 임베딩 공급자 키 (gemini / local)
    pub provider: String,
    pub ingested_at: DateTime<Utc>,
}

// ============================================================================
// Manifest
// ============================================================================

/// 적재 기록 저장소
pub struct Manifest {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl Manifest {
    /// 매니페스트 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create manifest directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open manifest database")?;

        let manifest = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        manifest.initialize()?;
        Ok(manifest)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS ingestions (
                source TEXT NOT NULL,
                provider TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                chunk_count INTEGER NOT NULL,
                ingested_at TEXT NOT NULL,
                PRIMARY KEY (source, provider)
            )",
            [],
        )
        .context("Failed to create ingestions table")?;

        tracing::debug!("Manifest initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 적재 기록 저장 (같은 문서/공급자는 덮어쓰기)
    pub fn record(&self, record: &IngestRecord) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "INSERT OR REPLACE INTO ingestions
                (source, provider, content_hash, chunk_count, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.source,
                record.provider,
                record.content_hash,
                record.chunk_count as i64,
                record.ingested_at.to_rfc3339(),
            ],
        )
        .context("Failed to write ingestion record")?;

        tracing::info!(
            "Recorded ingestion: {} ({} chunks, {})",
            record.source,
            record.chunk_count,
            record.provider
        );
        Ok(())
    }

    /// 문서/공급자로 적재 기록 조회
    pub fn get(&self, source: &str, provider: &str) -> Result<Option<IngestRecord>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT source, content_hash, chunk_count, provider, ingested_at
             FROM ingestions WHERE source = ?1 AND provider = ?2",
        )?;

        let mut rows = stmt.query_map(params![source, provider], row_to_record)?;
        rows.next().transpose().context("Failed to read ingestion record")
    }

    /// 전체 적재 기록 (최신순)
    pub fn list(&self) -> Result<Vec<IngestRecord>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT source, content_hash, chunk_count, provider, ingested_at
             FROM ingestions ORDER BY ingested_at DESC",
        )?;

        let records = stmt
            .query_map([], row_to_record)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<IngestRecord> {
    Ok(IngestRecord {
        source: row.get(0)?,
        content_hash: row.get(1)?,
        chunk_count: row.get::<_, i64>(2)?.max(0) as usize,
        provider: row.get(3)?,
        ingested_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

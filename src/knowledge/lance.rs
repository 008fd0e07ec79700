//! LanceDB Vector Store - 청크 임베딩 저장 및 ANN 검색
//!
//! 청크 ID를 키로 merge insert 하므로 같은 청크를 다시 넣으면 덮어씁니다.
//! 임베딩 차원은 첫 업서트의 벡터 길이로 정해집니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::vector::{Chunk, RetrievedChunk, VectorEntry, VectorStore};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "vectors";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db })
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[VectorEntry]) -> Result<RecordBatch> {
        let first = entries
            .first()
            .ok_or_else(|| anyhow::anyhow!("Cannot create batch from empty entries"))?;
        let dimension = first.embedding.len();
        if dimension == 0 {
            anyhow::bail!("Embedding must not be empty");
        }
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {} (chunk {})",
                dimension,
                bad.embedding.len(),
                bad.chunk.id
            );
        }

        let ids: Vec<&str> = entries.iter().map(|e| e.chunk.id.as_str()).collect();
        let sources: Vec<&str> = entries.iter().map(|e| e.chunk.source.as_str()).collect();
        let chunk_indices: Vec<i32> = entries.iter().map(|e| e.chunk.chunk_index).collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.chunk.text.as_str()).collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let dimension = dimension as i32;
        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(sources)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == TABLE_NAME))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vector table")
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            let table = self.open_table().await?;
            let mut merge = table.merge_insert(&["id"]);
            merge
                .when_matched_update_all(None)
                .when_not_matched_insert_all();
            merge
                .execute(Box::new(batches))
                .await
                .context("Failed to merge vectors into table")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create vector table")?;
        }

        tracing::debug!("Upserted {} vectors", entries.len());
        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<RetrievedChunk>> {
        if limit == 0 || !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;
        let results = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results.try_collect().await?;
        let mut retrieved = Vec::new();

        for batch in batches {
            let ids = string_column(&batch, "id")?;
            let sources = string_column(&batch, "source")?;
            let texts = string_column(&batch, "text")?;
            let chunk_indices = batch
                .column_by_name("chunk_index")
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing chunk_index column"))?;
            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                // L2 거리 -> (0, 1] 유사도
                let score = 1.0 / (1.0 + distances.value(i));
                retrieved.push(RetrievedChunk {
                    chunk: Chunk {
                        id: ids.value(i).to_string(),
                        source: sources.value(i).to_string(),
                        chunk_index: chunk_indices.value(i),
                        text: texts.value(i).to_string(),
                    },
                    score,
                });
            }
        }

        // 동점이면 ID 순으로 고정 (같은 질문 -> 같은 출처 순서)
        retrieved.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        retrieved.truncate(limit);

        Ok(retrieved)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let before_count = table.count_rows(None).await.context("Failed to count rows")?;

        // 작은따옴표 이스케이프 (SQL 문자열 리터럴)
        let filter = format!("source = '{}'", source.replace('\'', "''"));
        table
            .delete(&filter)
            .await
            .context("Failed to delete vectors")?;

        let after_count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(before_count.saturating_sub(after_count))
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn entry(index: usize, text: &str, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry {
            chunk: Chunk::new(Path::new("tax.docx"), index, text.to_string()),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_lance_store_basic() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("test.lance"))
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 0);

        let entries = vec![
            entry(0, "제1조", vec![1.0, 0.0, 0.0]),
            entry(1, "제2조", vec![0.0, 1.0, 0.0]),
        ];
        assert_eq!(store.upsert(&entries).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_same_ids_does_not_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("dedup.lance"))
            .await
            .unwrap();

        let entries = vec![
            entry(0, "제1조", vec![1.0, 0.0]),
            entry(1, "제2조", vec![0.0, 1.0]),
        ];
        store.upsert(&entries).await.unwrap();
        store.upsert(&entries).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        store.upsert(&[entry(2, "제3조", vec![1.0, 1.0])]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_lance_search_orders_by_similarity() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("search.lance"))
            .await
            .unwrap();

        store
            .upsert(&[
                entry(0, "근로소득", vec![1.0, 0.0, 0.0]),
                entry(1, "양도소득", vec![0.0, 1.0, 0.0]),
                entry(2, "이자소득", vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[0.9, 0.1, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "근로소득");
        assert!(results[0].score >= results[1].score);
        assert!(results[0].score <= 1.0);
    }

    #[tokio::test]
    async fn test_search_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("empty.lance"))
            .await
            .unwrap();
        assert!(store.search(&[1.0, 0.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_source() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("delete.lance"))
            .await
            .unwrap();

        let other = VectorEntry {
            chunk: Chunk::new(Path::new("o'brien.txt"), 0, "기타".to_string()),
            embedding: vec![0.5, 0.5],
        };
        store
            .upsert(&[
                entry(0, "제1조", vec![1.0, 0.0]),
                entry(1, "제2조", vec![0.0, 1.0]),
                other,
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_by_source("tax.docx").await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.delete_by_source("o'brien.txt").await.unwrap(), 1);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let entries = vec![entry(0, "a", vec![1.0, 0.0]), entry(1, "b", vec![1.0])];
        assert!(LanceVectorStore::entries_to_batch(&entries).is_err());
    }
}

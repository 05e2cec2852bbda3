//! LanceDB Document Store - 로컬 영구 벡터 저장소
//!
//! 외부 서버 없이 데이터 디렉토리에 컬렉션(`app_{app_id}`)마다 테이블 하나를 둡니다.
//! 테이블은 첫 문서가 추가될 때 생성되며, 임베딩 차원도 그때 고정됩니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use tokio::sync::Mutex;

use super::vector::{CollectionHandle, Document, DocumentStore, Metadata, QueryResult};

// ============================================================================
// LanceStore
// ============================================================================

/// LanceDB 문서 저장소
pub struct LanceStore {
    db: Connection,
    /// 테이블 생성 직렬화 (확인 후 생성 사이의 경쟁 방지)
    create_lock: Mutex<()>,
}

impl LanceStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            tokio::fs::create_dir_all(path)
                .await
                .context("Failed to create LanceDB directory")?;
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            db,
            create_lock: Mutex::new(()),
        })
    }

    /// 문서 테이블 스키마 생성
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
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

    /// 문서 하나를 Arrow RecordBatch로 변환
    fn document_to_batch(
        text: &str,
        embedding: &[f32],
        metadata: &Metadata,
    ) -> Result<RecordBatch> {
        if embedding.is_empty() {
            anyhow::bail!("Cannot store an empty embedding");
        }

        let dimension = i32::try_from(embedding.len()).context("Embedding too large")?;
        let metadata_json =
            serde_json::to_string(metadata).context("Failed to serialize metadata")?;

        let values = Float32Array::from(embedding.to_vec());
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(vec![uuid::Uuid::new_v4().to_string()])),
                Arc::new(StringArray::from(vec![text])),
                Arc::new(StringArray::from(vec![metadata_json])),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self, name: &str) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list LanceDB tables")?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn open_table(&self, name: &str) -> Result<lancedb::table::Table> {
        self.db
            .open_table(name)
            .execute()
            .await
            .with_context(|| format!("Failed to open table {name}"))
    }

    async fn append(&self, name: &str, batch: RecordBatch) -> Result<()> {
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        self.open_table(name)
            .await?
            .add(batches)
            .execute()
            .await
            .context("Failed to add document to table")?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for LanceStore {
    async fn get_or_create_collection(&self, app_id: &str) -> Result<CollectionHandle> {
        // 테이블은 스키마(차원)가 정해지는 첫 add에서 생성
        Ok(CollectionHandle::local(app_id))
    }

    async fn add(
        &self,
        collection: &CollectionHandle,
        text: &str,
        embedding: &[f32],
        metadata: &Metadata,
    ) -> Result<()> {
        let batch = Self::document_to_batch(text, embedding, metadata)?;

        if self.table_exists(&collection.id).await? {
            return self.append(&collection.id, batch).await;
        }

        // 첫 add가 동시에 들어오면 한쪽만 생성하고 나머지는 추가로 전환
        let _guard = self.create_lock.lock().await;
        if self.table_exists(&collection.id).await? {
            return self.append(&collection.id, batch).await;
        }

        tracing::info!("Creating LanceDB table {}", collection.id);
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        self.db
            .create_table(&collection.id, batches)
            .execute()
            .await
            .context("Failed to create table")?;

        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionHandle,
        embedding: &[f32],
        k: usize,
    ) -> Result<QueryResult> {
        if k == 0 || !self.table_exists(&collection.id).await? {
            return Ok(QueryResult::empty());
        }

        let table = self.open_table(&collection.id).await?;

        let stream = table
            .vector_search(embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(k)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut scored: Vec<(f32, Document)> = Vec::new();

        for batch in batches {
            let texts = batch
                .column_by_name("text")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing text column"))?;

            let metadatas = batch
                .column_by_name("metadata")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing metadata column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                let metadata: Metadata = serde_json::from_str(metadatas.value(i))
                    .context("Corrupt metadata column")?;
                scored.push((
                    distances.value(i),
                    Document::new(texts.value(i), metadata),
                ));
            }
        }

        // 거리 오름차순 = 유사도 내림차순
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(QueryResult::new(scored.into_iter().map(|(_, d)| d).collect()))
    }

    async fn count(&self, collection: &CollectionHandle) -> Result<usize> {
        if !self.table_exists(&collection.id).await? {
            return Ok(0);
        }

        let count = self
            .open_table(&collection.id)
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")?;
        Ok(count)
    }

    fn name(&self) -> &str {
        "lance"
    }
}

// ============================================================================
// Tests
// ============================================================================

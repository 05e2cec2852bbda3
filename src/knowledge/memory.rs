//! In-Memory Document Store - 프로세스 내 임시 저장소
//!
//! 외부 벡터 DB에 연결할 수 없을 때의 폴백이자 테스트용 저장소입니다.
//! 프로세스가 종료되면 모든 문서가 사라집니다.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::vector::{
    cosine_similarity, CollectionHandle, Document, DocumentStore, Metadata, QueryResult,
};

#[derive(Debug, Clone)]
struct StoredEntry {
    document: Document,
    embedding: Vec<f32>,
}

/// 인메모리 문서 저장소 (전수 코사인 유사도 검색)
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<StoredEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_or_create_collection(&self, app_id: &str) -> Result<CollectionHandle> {
        let handle = CollectionHandle::local(app_id);
        self.collections
            .write()
            .await
            .entry(handle.id.clone())
            .or_default();
        Ok(handle)
    }

    async fn add(
        &self,
        collection: &CollectionHandle,
        text: &str,
        embedding: &[f32],
        metadata: &Metadata,
    ) -> Result<()> {
        self.collections
            .write()
            .await
            .entry(collection.id.clone())
            .or_default()
            .push(StoredEntry {
                document: Document::new(text, metadata.clone()),
                embedding: embedding.to_vec(),
            });
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionHandle,
        embedding: &[f32],
        k: usize,
    ) -> Result<QueryResult> {
        let collections = self.collections.read().await;
        let Some(entries) = collections.get(&collection.id) else {
            return Ok(QueryResult::empty());
        };

        let mut scored: Vec<(f32, &StoredEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(embedding, &e.embedding), e))
            .collect();

        // 안정 정렬: 동점이면 먼저 추가된 문서가 앞
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(QueryResult::new(
            scored.into_iter().map(|(_, e)| e.document.clone()).collect(),
        ))
    }

    async fn count(&self, collection: &CollectionHandle) -> Result<usize> {
        Ok(self
            .collections
            .read()
            .await
            .get(&collection.id)
            .map(Vec::len)
            .unwrap_or(0))
    }

    fn name(&self) -> &str {
        "memory"
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

// ============================================================================
// Tests
// ============================================================================

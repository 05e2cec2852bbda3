//! Retriever - 정규화 + 임베딩 + 저장소 검색 조합
//!
//! 수집과 검색 모두 같은 `normalize`를 거친 텍스트를 임베딩하므로
//! 악센트 유무와 대소문자에 관계없이 서로 검색됩니다.
//! 저장되는 텍스트는 항상 원문입니다.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{validate_app_id, RagError, RagResult};
use crate::handle::Dependency;
use crate::normalize::normalize;

use super::vector::{Document, DocumentStore, QueryResult};

/// 기본 검색 결과 수
pub const DEFAULT_TOP_K: usize = 3;

/// 문서 검색기
pub struct Retriever {
    embedder: Arc<Dependency<dyn EmbeddingProvider>>,
    store: Arc<Dependency<dyn DocumentStore>>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<Dependency<dyn EmbeddingProvider>>,
        store: Arc<Dependency<dyn DocumentStore>>,
    ) -> Self {
        Self { embedder, store }
    }

    /// 준비된 구현체로 바로 생성
    pub fn from_parts(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn DocumentStore>) -> Self {
        Self::new(
            Arc::new(Dependency::ready("embedding provider", embedder)),
            Arc::new(Dependency::ready("document store", store)),
        )
    }

    async fn embedder(&self) -> RagResult<Arc<dyn EmbeddingProvider>> {
        self.embedder
            .get()
            .await
            .map_err(RagError::EmbeddingUnavailable)
    }

    async fn store(&self) -> RagResult<Arc<dyn DocumentStore>> {
        self.store.get().await.map_err(RagError::StoreUnavailable)
    }

    /// 임베딩 프로바이더가 준비되었는지 (초기화를 유발하지 않음)
    pub fn embeddings_ready(&self) -> bool {
        self.embedder.is_ready()
    }

    /// 질의와 가장 가까운 문서 최대 `k`개 검색
    ///
    /// 빈 컬렉션이면 빈 결과를 반환합니다 (에러 아님).
    pub async fn retrieve(&self, app_id: &str, query: &str, k: usize) -> RagResult<QueryResult> {
        validate_app_id(app_id)?;

        let normalized = normalize(query);
        let embedder = self.embedder().await?;
        let embedding = embedder
            .embed(&normalized)
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(format!("{:#}", e)))?;

        let store = self.store().await?;
        let collection = store.get_or_create_collection(app_id).await?;
        let result = store.query(&collection, &embedding, k).await?;

        tracing::debug!(
            app_id,
            k,
            hits = result.len(),
            store = store.name(),
            "Retrieved documents"
        );
        Ok(result)
    }

    /// 문서 추가
    ///
    /// 문서마다 독립적으로 정규화/임베딩 후 저장하며, 저장된 문서 수를 반환합니다.
    /// 임베딩은 한 번의 배치 요청으로 처리합니다.
    pub async fn add_documents(&self, app_id: &str, docs: &[Document]) -> RagResult<usize> {
        validate_app_id(app_id)?;
        if docs.is_empty() {
            return Ok(0);
        }

        let normalized: Vec<String> = docs.iter().map(|d| normalize(&d.text)).collect();
        let embedder = self.embedder().await?;
        let embeddings = embedder
            .embed_batch(&normalized)
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(format!("{:#}", e)))?;

        if embeddings.len() != docs.len() {
            return Err(RagError::Internal(anyhow::anyhow!(
                "embedder returned {} vectors for {} documents",
                embeddings.len(),
                docs.len()
            )));
        }

        let store = self.store().await?;
        let collection = store.get_or_create_collection(app_id).await?;

        for (doc, embedding) in docs.iter().zip(&embeddings) {
            store
                .add(&collection, &doc.text, embedding, &doc.metadata)
                .await?;
        }

        tracing::info!(
            app_id,
            count = docs.len(),
            collection = %collection.name,
            "Added documents"
        );
        Ok(docs.len())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;

    use crate::embedding::HashingEmbedding;
    use crate::knowledge::MemoryStore;

    /// 마지막 입력을 기록하는 임베더
    struct RecordingEmbedder {
        inner: HashingEmbedding,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.seen.lock().unwrap().push(text.to_string());
            self.inner.embed(text).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn retriever() -> Retriever {
        Retriever::from_parts(
            Arc::new(HashingEmbedding::new(256).unwrap()),
            Arc::new(MemoryStore::new()),
        )
    }

    #[tokio::test]
    async fn test_accent_insensitive_retrieval() {
        let embedder = Arc::new(RecordingEmbedder {
            inner: HashingEmbedding::new(256).unwrap(),
            seen: Mutex::new(Vec::new()),
        });
        let retriever = Retriever::from_parts(embedder.clone(), Arc::new(MemoryStore::new()));

        retriever
            .add_documents("test", &[Document::with_source("Το ERP σύστημα", "s#1")])
            .await
            .unwrap();
        let result = retriever.retrieve("test", "ERP;", DEFAULT_TOP_K).await.unwrap();

        let seen = embedder.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["το erp συστημα".to_string(), "erp;".to_string()]);
        assert_eq!(result.documents(), vec!["Το ERP σύστημα"]);
    }

    #[tokio::test]
    async fn test_end_to_end_acme() {
        let retriever = retriever();
        retriever
            .add_documents("acme", &[Document::with_source("Το ERP σύστημα", "doc#1")])
            .await
            .unwrap();

        let result = retriever.retrieve("acme", "erp", DEFAULT_TOP_K).await.unwrap();
        assert_eq!(result.documents(), vec!["Το ERP σύστημα"]);
        assert_eq!(
            result.metadatas()[0].get("source").map(String::as_str),
            Some("doc#1")
        );
    }

    #[tokio::test]
    async fn test_empty_collection_returns_empty() {
        let result = retriever().retrieve("nobody", "anything", 3).await.unwrap();
        let (docs, metas) = result.into_parts();
        assert!(docs.is_empty());
        assert!(metas.is_empty());
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let retriever = retriever();
        retriever
            .add_documents("a", &[Document::with_source("secret of tenant a", "a#1")])
            .await
            .unwrap();

        assert!(retriever.retrieve("b", "secret of tenant a", 3).await.unwrap().is_empty());
        assert_eq!(retriever.retrieve("a", "secret", 3).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_results_are_aligned_and_bounded() {
        let retriever = retriever();
        let docs: Vec<Document> = (0..5)
            .map(|i| Document::with_source(format!("erp module {i}"), format!("doc#{i}")))
            .collect();
        assert_eq!(retriever.add_documents("acme", &docs).await.unwrap(), 5);

        let result = retriever.retrieve("acme", "erp module 3", 3).await.unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result.documents()[0], "erp module 3");

        let citations = result.citations();
        for (text, citation) in result.documents().iter().zip(&citations) {
            let idx = text.rsplit(' ').next().unwrap();
            assert_eq!(citation, &format!("doc#{idx}"));
        }
    }

    #[tokio::test]
    async fn test_embedding_unavailable() {
        let retriever = Retriever::new(
            Arc::new(Dependency::unavailable("embedding provider", "model missing")),
            Arc::new(Dependency::ready(
                "document store",
                Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>,
            )),
        );

        let err = retriever.retrieve("acme", "erp", 3).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(_)));

        let err = retriever
            .add_documents("acme", &[Document::with_source("x", "y")])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_invalid_app_id() {
        let err = retriever().retrieve("../etc", "erp", 3).await.unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }
}

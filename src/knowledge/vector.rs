//! Document Store - 벡터 저장소 트레이트 및 공통 타입
//!
//! 테넌트(app_id)마다 하나의 컬렉션을 두고, 문서 추가와 최근접 검색만 지원합니다.
//! 문서는 저장 후 변경되지 않습니다 (수정/삭제 없음).

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 문서 메타데이터 (예: `{"source": "manual.pdf#page=3"}`)
pub type Metadata = BTreeMap<String, String>;

/// 인용으로 노출되는 메타데이터 키
pub const SOURCE_KEY: &str = "source";

// ============================================================================
// Types
// ============================================================================

/// 문서
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// 원문 텍스트 (정규화 전)
    pub text: String,
    /// 메타데이터
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// `source` 메타데이터만 가진 문서
    pub fn with_source(text: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self::new(text, metadata)
    }

    /// 인용 문자열 (`source`, 없으면 빈 문자열)
    pub fn citation(&self) -> &str {
        self.metadata
            .get(SOURCE_KEY)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// 컬렉션 핸들
///
/// 같은 app_id는 항상 같은 `name`으로 해석됩니다.
/// `id`는 저장소 고유 식별자입니다 (Chroma UUID 등, 없으면 name과 같음).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionHandle {
    pub name: String,
    pub id: String,
}

impl CollectionHandle {
    /// app_id에 대응하는 컬렉션 이름
    pub fn collection_name(app_id: &str) -> String {
        format!("app_{app_id}")
    }

    /// 이름을 id로도 쓰는 핸들 (로컬 저장소용)
    pub fn local(app_id: &str) -> Self {
        let name = Self::collection_name(app_id);
        Self {
            id: name.clone(),
            name,
        }
    }
}

/// 검색 결과
///
/// 유사도 내림차순으로 정렬된 문서 목록입니다.
/// 텍스트와 메타데이터는 한 문서 단위로 보관되므로 순위가 항상 일치합니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    hits: Vec<Document>,
}

impl QueryResult {
    pub fn new(hits: Vec<Document>) -> Self {
        Self { hits }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn hits(&self) -> &[Document] {
        &self.hits
    }

    /// 문서 텍스트 목록 (순위 순)
    pub fn documents(&self) -> Vec<&str> {
        self.hits.iter().map(|d| d.text.as_str()).collect()
    }

    /// 메타데이터 목록 (순위 순)
    pub fn metadatas(&self) -> Vec<&Metadata> {
        self.hits.iter().map(|d| &d.metadata).collect()
    }

    /// 인용 목록 (순위 순, `source`가 없으면 빈 문자열)
    pub fn citations(&self) -> Vec<String> {
        self.hits.iter().map(|d| d.citation().to_string()).collect()
    }

    /// `(documents, metadatas)`로 분해
    pub fn into_parts(self) -> (Vec<String>, Vec<Metadata>) {
        self.hits.into_iter().map(|d| (d.text, d.metadata)).unzip()
    }
}

// ============================================================================
// DocumentStore Trait
// ============================================================================

/// DocumentStore 트레이트 (async)
///
/// 외부 벡터 데이터베이스에 대한 테넌트별 컬렉션 추상화입니다.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 컬렉션 조회 또는 생성 (멱등)
    async fn get_or_create_collection(&self, app_id: &str) -> Result<CollectionHandle>;

    /// 문서 하나 추가 (중복 허용)
    async fn add(
        &self,
        collection: &CollectionHandle,
        text: &str,
        embedding: &[f32],
        metadata: &Metadata,
    ) -> Result<()>;

    /// 최근접 문서 최대 `k`개 (유사도 내림차순)
    async fn query(
        &self,
        collection: &CollectionHandle,
        embedding: &[f32],
        k: usize,
    ) -> Result<QueryResult>;

    /// 컬렉션 문서 수
    async fn count(&self, collection: &CollectionHandle) -> Result<usize>;

    /// 저장소 이름
    fn name(&self) -> &str;

    /// 영구 저장 여부 (임시 저장소면 false)
    fn is_persistent(&self) -> bool {
        true
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_mismatch_and_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_collection_name() {
        assert_eq!(CollectionHandle::collection_name("acme"), "app_acme");
        let handle = CollectionHandle::local("acme");
        assert_eq!(handle.id, handle.name);
    }

    #[test]
    fn test_query_result_parts_are_aligned() {
        let result = QueryResult::new(vec![
            Document::with_source("first", "a#1"),
            Document::new("second", Metadata::new()),
        ]);

        assert_eq!(result.documents(), vec!["first", "second"]);
        assert_eq!(result.citations(), vec!["a#1".to_string(), String::new()]);

        let (docs, metas) = result.into_parts();
        assert_eq!(docs.len(), metas.len());
        assert_eq!(metas[0].get(SOURCE_KEY).map(String::as_str), Some("a#1"));
    }
}

//! Chroma Document Store - HTTP REST 클라이언트
//!
//! Chroma 서버의 `/api/v1` REST API를 사용합니다.
//! ref: https://docs.trychroma.com/reference/py-client
//!
//! 컬렉션은 `app_{app_id}` 이름으로 `get_or_create` 생성되며,
//! 이름 → UUID 매핑은 프로세스 내에 캐시됩니다.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use super::vector::{CollectionHandle, Document, DocumentStore, Metadata, QueryResult};

/// Chroma HTTP 저장소
#[derive(Debug)]
pub struct ChromaStore {
    base_url: String,
    client: reqwest::Client,
    /// 컬렉션 이름 → id 캐시
    collections: RwLock<HashMap<String, String>>,
}

impl ChromaStore {
    /// Chroma 서버에 연결 (heartbeat 확인)
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_url(&format!("http://{host}:{port}")).await
    }

    /// 전체 URL로 연결
    pub async fn connect_url(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to create HTTP client")?;

        let store = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            collections: RwLock::new(HashMap::new()),
        };

        store.heartbeat().await?;
        Ok(store)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// 서버 상태 확인
    pub async fn heartbeat(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/heartbeat"))
            .send()
            .await
            .with_context(|| format!("Failed to reach Chroma at {}", self.base_url))?;

        if !response.status().is_success() {
            anyhow::bail!("Chroma heartbeat failed ({})", response.status());
        }
        Ok(())
    }

    /// JSON POST 후 성공 응답 본문 반환
    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Chroma request failed: {path}"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read Chroma response body")?;

        if !status.is_success() {
            anyhow::bail!("Chroma API error ({}) on {}: {}", status, path, text);
        }
        Ok(text)
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    get_or_create: bool,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    ids: Vec<String>,
    embeddings: Vec<&'a [f32]>,
    documents: Vec<&'a str>,
    /// Chroma는 빈 메타데이터 객체를 거부하므로 null로 보냄
    metadatas: Vec<Option<&'a Metadata>>,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query_embeddings: Vec<&'a [f32]>,
    n_results: usize,
    include: [&'static str; 3],
}

/// 쿼리 응답 (쿼리 임베딩마다 한 줄)
#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<HashMap<String, Value>>>>>,
}

impl QueryResponse {
    /// 첫 번째 쿼리의 결과를 순위 정렬된 문서로 변환
    fn into_result(self) -> QueryResult {
        let documents = self
            .documents
            .and_then(|rows| rows.into_iter().next())
            .unwrap_or_default();
        let mut metadatas = self
            .metadatas
            .and_then(|rows| rows.into_iter().next())
            .unwrap_or_default()
            .into_iter();

        let hits = documents
            .into_iter()
            .map(|text| {
                let metadata = metadatas
                    .next()
                    .flatten()
                    .map(metadata_from_json)
                    .unwrap_or_default();
                Document::new(text.unwrap_or_default(), metadata)
            })
            .collect();

        QueryResult::new(hits)
    }
}

/// Chroma 메타데이터 값(문자열/숫자/불리언)을 문자열 맵으로 변환
fn metadata_from_json(raw: HashMap<String, Value>) -> Metadata {
    raw.into_iter()
        .filter_map(|(k, v)| match v {
            Value::Null => None,
            Value::String(s) => Some((k, s)),
            other => Some((k, other.to_string())),
        })
        .collect()
}

#[async_trait]
impl DocumentStore for ChromaStore {
    async fn get_or_create_collection(&self, app_id: &str) -> Result<CollectionHandle> {
        let name = CollectionHandle::collection_name(app_id);

        if let Some(id) = self.collections.read().await.get(&name) {
            return Ok(CollectionHandle {
                name,
                id: id.clone(),
            });
        }

        let body = self
            .post_json(
                "/collections",
                &CreateCollectionRequest {
                    name: &name,
                    get_or_create: true,
                },
            )
            .await?;
        let created: CollectionResponse =
            serde_json::from_str(&body).context("Failed to parse Chroma collection response")?;

        tracing::debug!("Resolved Chroma collection {} -> {}", name, created.id);
        self.collections
            .write()
            .await
            .insert(name.clone(), created.id.clone());

        Ok(CollectionHandle {
            name,
            id: created.id,
        })
    }

    async fn add(
        &self,
        collection: &CollectionHandle,
        text: &str,
        embedding: &[f32],
        metadata: &Metadata,
    ) -> Result<()> {
        let request = AddRequest {
            ids: vec![uuid::Uuid::new_v4().to_string()],
            embeddings: vec![embedding],
            documents: vec![text],
            metadatas: vec![(!metadata.is_empty()).then_some(metadata)],
        };

        self.post_json(&format!("/collections/{}/add", collection.id), &request)
            .await
            .context("Failed to add document to Chroma")?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionHandle,
        embedding: &[f32],
        k: usize,
    ) -> Result<QueryResult> {
        if k == 0 {
            return Ok(QueryResult::empty());
        }

        let request = QueryRequest {
            query_embeddings: vec![embedding],
            n_results: k,
            include: ["documents", "metadatas", "distances"],
        };

        let body = self
            .post_json(&format!("/collections/{}/query", collection.id), &request)
            .await
            .context("Failed to query Chroma")?;
        let response: QueryResponse =
            serde_json::from_str(&body).context("Failed to parse Chroma query response")?;

        let mut result = response.into_result();
        if result.len() > k {
            result = QueryResult::new(result.hits()[..k].to_vec());
        }
        Ok(result)
    }

    async fn count(&self, collection: &CollectionHandle) -> Result<usize> {
        let response = self
            .client
            .get(self.url(&format!("/collections/{}/count", collection.id)))
            .send()
            .await
            .context("Chroma count request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Chroma count failed ({})", response.status());
        }

        response
            .json::<usize>()
            .await
            .context("Failed to parse Chroma count")
    }

    fn name(&self) -> &str {
        "chroma"
    }
}

// ============================================================================
// Tests
// ============================================================================

//! 임베딩 모듈 - 정규화된 텍스트를 고정 길이 벡터로 변환
//!
//! 두 가지 프로바이더를 제공합니다.
//! - `HttpEmbedding`: OpenAI 호환 `/v1/embeddings` 엔드포인트
//!   (text-embeddings-inference, vLLM, Ollama 등에서 `intfloat/multilingual-e5-large` 서빙)
//! - `HashingEmbedding`: 외부 의존성 없는 결정적 해싱 임베딩 (오프라인/테스트용)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = HttpEmbedding::new("http://localhost:8081", "intfloat/multilingual-e5-large", 1024)?;
//! let vectors = embedder.embed_batch(&["το erp συστημα".to_string()]).await?;
//! ```

mod hashing;

pub use hashing::HashingEmbedding;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingSettings;
use crate::handle::Dependency;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 같은 모델 버전이면 같은 입력에 대해 항상 같은 벡터를 반환해야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    ///
    /// 출력 길이와 순서는 입력과 같습니다.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// HTTP Embedding (OpenAI 호환)
// ============================================================================

/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// OpenAI 호환 임베딩 API 구현체
///
/// 기본은 요청당 한 번만 시도합니다. `with_retries`로 429 및 전송 에러에 대한
/// 지수 백오프 재시도를 켤 수 있으며, 이 경우 요청 지연이 백오프만큼 늘어납니다.
#[derive(Debug)]
pub struct HttpEmbedding {
    base_url: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
    max_retries: u32,
    initial_backoff: Duration,
}

impl HttpEmbedding {
    /// 새 HTTP 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `base_url` - 서버 주소 (예: `http://localhost:8081`)
    /// * `model` - 모델 식별자
    /// * `dimension` - 기대 임베딩 차원
    pub fn new(base_url: &str, model: &str, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Invalid dimension: 0");
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            dimension,
            max_retries: 0,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// 429 및 전송 에러 시 재시도 횟수 설정 (0이면 재시도 없음)
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 재시도 백오프 조정
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.base_url)
    }

    /// 서버 연결 확인 (짧은 텍스트 하나를 한 번만 요청)
    pub async fn check_connection(&self) -> Result<()> {
        let vectors = self
            .request(&["ping"], 0)
            .await
            .context("Embedding connection check failed")?;
        tracing::debug!(
            "Embedding connection ok (dimension {})",
            vectors.first().map(Vec::len).unwrap_or_default()
        );
        Ok(())
    }

    /// 비어있지 않은 텍스트들만 실제로 요청
    async fn request(&self, inputs: &[&str], max_retries: u32) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: inputs,
        };

        let mut last_error: Option<anyhow::Error> = None;

        // 재시도 루프 (429 및 전송 에러 시 지수 백오프)
        for attempt in 0..=max_retries {
            let backoff = self.initial_backoff * 2u32.saturating_pow(attempt);

            let response = match self.client.post(self.endpoint()).json(&request).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Failed to send embedding request: {}", e));
                    if attempt < max_retries {
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            max_retries
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                let parsed: EmbedResponse =
                    serde_json::from_str(&body).context("Failed to parse embedding response")?;
                return self.collect_vectors(parsed, inputs.len());
            }

            if status.as_u16() == 429 {
                last_error = Some(anyhow::anyhow!("Rate limit exceeded (429)"));

                if attempt < max_retries {
                    tracing::warn!(
                        "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                        backoff,
                        attempt + 1,
                        max_retries
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                    anyhow::bail!("Embedding API error ({}): {}", status, error.message());
                }
                anyhow::bail!("Embedding API error ({}): {}", status, body);
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Embedding request failed")))
    }

    /// 응답을 입력 순서로 정렬하고 차원 검증
    fn collect_vectors(&self, response: EmbedResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
        let mut data = response.data;
        if data.len() != expected {
            anyhow::bail!(
                "Embedding API returned {} vectors for {} inputs",
                data.len(),
                expected
            );
        }

        data.sort_by_key(|d| d.index);

        data.into_iter()
            .map(|d| {
                if d.embedding.len() != self.dimension {
                    anyhow::bail!(
                        "Dimension mismatch: expected {}, got {}",
                        self.dimension,
                        d.embedding.len()
                    );
                }
                Ok(d.embedding)
            })
            .collect()
    }
}

/// 임베딩 API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

/// 임베딩 API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// 에러 응답 (`{"error": {"message": ..}}` 또는 `{"error": ".."}`)
#[derive(Debug, Deserialize)]
struct ApiError {
    error: serde_json::Value,
}

impl ApiError {
    fn message(&self) -> String {
        match &self.error {
            serde_json::Value::String(s) => s.clone(),
            other => other
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding API returned no vectors"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // 빈 텍스트는 요청하지 않고 영벡터로 채움
        let pending: Vec<(usize, &str)> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, t)| (i, t.as_str()))
            .collect();

        let mut results = vec![vec![0.0; self.dimension]; texts.len()];
        if pending.is_empty() {
            return Ok(results);
        }

        let inputs: Vec<&str> = pending.iter().map(|(_, t)| *t).collect();
        tracing::debug!("Embedding {} texts via {}", inputs.len(), self.model);
        let vectors = self.request(&inputs, self.max_retries).await?;

        for ((i, _), vector) in pending.into_iter().zip(vectors) {
            results[i] = vector;
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정으로부터 임베딩 프로바이더 핸들 생성
///
/// 최초 사용 시 초기화되며, HTTP 프로바이더는 연결 확인까지 마쳐야 준비 상태가 됩니다.
/// 실패하면 `EmbeddingUnavailable`로 보고되고 프로세스는 계속 동작합니다.
pub fn embedder_handle(settings: &EmbeddingSettings) -> Dependency<dyn EmbeddingProvider> {
    let settings = settings.clone();

    Dependency::lazy("embedding provider", move || {
        let settings = settings.clone();
        async move { create_embedder(&settings).await }
    })
}

/// 임베딩 프로바이더 생성
pub async fn create_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "http" => {
            let embedder =
                HttpEmbedding::new(&settings.base_url, &settings.model, settings.dimension)?
                    .with_retries(settings.max_retries);
            embedder.check_connection().await?;
            tracing::info!(
                "Using HTTP embedding {} at {} (dimension: {})",
                settings.model,
                settings.base_url,
                settings.dimension
            );
            Ok(Arc::new(embedder))
        }
        "hashing" => {
            tracing::info!(
                "Using hashing embedding (dimension: {})",
                settings.dimension
            );
            Ok(Arc::new(HashingEmbedding::new(settings.dimension)?))
        }
        other => {
            anyhow::bail!("Unknown embedding provider: {other:?} (expected http or hashing)")
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

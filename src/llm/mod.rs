//! 언어 모델 모듈 - llama.cpp 서버 클라이언트
//!
//! 모델 가중치는 별도의 llama.cpp 서버 프로세스가 로드하고,
//! 여기서는 `/completion` 엔드포인트로 프롬프트를 보내 완성 텍스트를 받습니다.
//! ref: https://github.com/ggerganov/llama.cpp/tree/master/examples/server

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmSettings;
use crate::handle::Dependency;

/// 언어 모델 트레이트
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 프롬프트 완성 (최대 `max_tokens` 토큰 생성)
    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// llama.cpp server
// ============================================================================

/// 생성 요청 타임아웃
const COMPLETION_TIMEOUT_SECS: u64 = 120;

/// llama.cpp 서버 모델
#[derive(Debug)]
pub struct LlamaServerModel {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LlamaServerModel {
    /// # Arguments
    /// * `base_url` - 서버 주소 (예: `http://localhost:8082`)
    /// * `model` - 로그에 남길 모델 식별자
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        if base_url.trim().is_empty() {
            anyhow::bail!("Language model base_url is empty");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(COMPLETION_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/completion", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: usize,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl LanguageModel for LlamaServerModel {
    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        let request = CompletionRequest {
            prompt,
            n_predict: max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach language model at {}", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion request failed ({}): {}", status, body);
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        tracing::debug!(
            model = %self.model,
            chars = completion.content.len(),
            "Completion received"
        );
        Ok(completion.content)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory
// ============================================================================

/// 설정으로부터 언어 모델 핸들 생성
///
/// `base_url`이 비어 있으면 사용 불가 상태가 됩니다.
/// 서버 도달 여부는 여기서 확인하지 않고 호출 시 서킷 브레이커가 추적합니다.
pub fn model_handle(settings: &LlmSettings) -> Dependency<dyn LanguageModel> {
    if settings.base_url.trim().is_empty() {
        return Dependency::unavailable("language model", "llm.base_url is not configured");
    }

    match LlamaServerModel::new(&settings.base_url, &settings.model) {
        Ok(model) => {
            tracing::info!("Using language model {} at {}", settings.model, settings.base_url);
            Dependency::ready("language model", Arc::new(model) as Arc<dyn LanguageModel>)
        }
        Err(e) => Dependency::unavailable("language model", format!("{:#}", e)),
    }
}

// ============================================================================
// Tests
// ============================================================================

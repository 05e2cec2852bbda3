//! Chat Orchestrator - 검색 + 프롬프트 구성 + 언어 모델 호출
//!
//! 요청 상태는 저장하지 않습니다. 모든 모델 호출은 공유 서킷 브레이커를 거치며,
//! 회로가 열려 있으면 검색조차 하지 않고 바로 `CircuitOpen`을 반환합니다.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, RagResult};
use crate::handle::Dependency;
use crate::knowledge::{QueryResult, Retriever};
use crate::llm::LanguageModel;
use crate::resilience::{BreakerError, CircuitBreaker};

/// 시스템 지시문: 그리스어 질문에는 그리스어로, 그 외에는 영어로 답하고 출처를 인용
pub const SYSTEM_PROMPT: &str = "Είσαι ένας έμπειρος βοηθός. Απάντησε στα Ελληνικά όταν η ερώτηση είναι στα Ελληνικά, αλλιώς στα Αγγλικά.\nΧρησιμοποίησε παραπομπές όπου χρειάζεται. Αγγλικοί τεχνικοί όροι επιτρέπονται.";

/// 헬스 체크 프롬프트
const HEALTH_PROMPT: &str = "ping";
/// 헬스 체크 제한 시간
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// 챗 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    /// 검색 순위와 같은 순서의 출처 목록
    pub citations: Vec<String>,
}

impl ChatAnswer {
    /// 답변 글자 수 (바이트가 아닌 문자 단위)
    pub fn char_count(&self) -> usize {
        self.answer.chars().count()
    }
}

/// 챗 오케스트레이터
pub struct ChatOrchestrator {
    retriever: Arc<Retriever>,
    model: Arc<Dependency<dyn LanguageModel>>,
    breaker: Arc<CircuitBreaker>,
    top_k: usize,
    max_tokens: usize,
}

impl ChatOrchestrator {
    pub fn new(
        retriever: Arc<Retriever>,
        model: Arc<Dependency<dyn LanguageModel>>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            retriever,
            model,
            breaker,
            top_k: crate::knowledge::DEFAULT_TOP_K,
            max_tokens: 512,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// 질문에 대한 답변과 출처 생성
    pub async fn chat(&self, app_id: &str, question: &str) -> RagResult<ChatAnswer> {
        if self.breaker.is_open() {
            return Err(RagError::CircuitOpen);
        }

        let retrieved = self.retriever.retrieve(app_id, question, self.top_k).await?;
        let prompt = build_prompt(&retrieved, question);

        let raw = self.invoke(&prompt, self.max_tokens).await?;
        let answer = ChatAnswer {
            answer: raw.trim().to_string(),
            citations: retrieved.citations(),
        };

        tracing::info!(
            app_id,
            hits = retrieved.len(),
            answer_chars = answer.char_count(),
            "Chat answered"
        );

        Ok(answer)
    }

    /// 언어 모델 응답 여부 확인 (브레이커 경유, 2초 제한)
    pub async fn health_check(&self) -> RagResult<()> {
        match tokio::time::timeout(HEALTH_TIMEOUT, self.invoke(HEALTH_PROMPT, 1)).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => {
                tracing::warn!("Language model health check timed out");
                Err(RagError::ModelUnavailable("health check timed out".to_string()))
            }
        }
    }

    /// 브레이커를 통해 모델 호출 후 에러 분류
    async fn invoke(&self, prompt: &str, max_tokens: usize) -> RagResult<String> {
        let model = self.model.get().await.map_err(RagError::ModelUnavailable)?;

        match self
            .breaker
            .call(|| async { model.complete(prompt, max_tokens).await })
            .await
        {
            Ok(answer) => Ok(answer),
            Err(BreakerError::Open) => Err(RagError::CircuitOpen),
            Err(BreakerError::Inner(e)) => {
                tracing::error!(model = model.name(), "Model invocation failed: {:#}", e);
                Err(RagError::ModelInvocation(format!("{:#}", e)))
            }
        }
    }
}

/// 프롬프트 구성: 시스템 지시문 + 검색 문맥 + 질문 + 답변 유도
pub fn build_prompt(retrieved: &QueryResult, question: &str) -> String {
    let context = retrieved.documents().join("\n");
    format!("{SYSTEM_PROMPT}\n\ncontext:\n{context}\n\nΕρώτηση: {question}\nΑπάντηση:")
}

// ============================================================================
// Tests
// ============================================================================

//! 공유 서버 상태

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use subtle::ConstantTimeEq;

use crate::chat::ChatOrchestrator;
use crate::config::{ServerSettings, Settings};
use crate::embedding::embedder_handle;
use crate::handle::Dependency;
use crate::knowledge::{store_handle, Retriever};
use crate::llm::{model_handle, LanguageModel};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};

/// 속도 제한 윈도우
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 이 개수를 넘으면 만료된 클라이언트 항목을 정리
const RATE_LIMIT_SWEEP_THRESHOLD: usize = 1024;

/// 요청 핸들러가 공유하는 상태
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<ServerSettings>,
    pub chat: Arc<ChatOrchestrator>,
    /// 클라이언트 IP -> (요청 수, 윈도우 시작)
    pub rate_limiter: Arc<DashMap<String, (u32, Instant)>>,
}

impl AppState {
    pub fn new(settings: ServerSettings, chat: Arc<ChatOrchestrator>) -> Self {
        Self {
            settings: Arc::new(settings),
            chat,
            rate_limiter: Arc::new(DashMap::new()),
        }
    }

    /// 전체 설정으로부터 상태 구성
    ///
    /// 임베딩/저장소는 첫 요청에서 초기화되고, 언어 모델은 설정만 검사합니다.
    pub fn from_settings(settings: &Settings) -> Self {
        let retriever = Arc::new(Retriever::new(
            Arc::new(embedder_handle(&settings.embedding)),
            Arc::new(store_handle(&settings.store)),
        ));
        let model: Arc<Dependency<dyn LanguageModel>> = Arc::new(model_handle(&settings.llm));
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::from(
            settings.breaker,
        )));

        let chat = ChatOrchestrator::new(retriever, model, breaker)
            .with_top_k(settings.chat.top_k)
            .with_max_tokens(settings.llm.max_tokens);

        Self::new(settings.server.clone(), Arc::new(chat))
    }

    /// 토큰 검증 (상수 시간 비교)
    pub fn is_valid_token(&self, token: &str) -> bool {
        let expected = self.settings.api_token.as_bytes();
        !expected.is_empty() && bool::from(token.as_bytes().ct_eq(expected))
    }

    /// 클라이언트별 고정 윈도우 속도 제한 (0이면 비활성)
    pub fn check_rate_limit(&self, client: &str) -> bool {
        let limit = self.settings.rate_limit_per_minute;
        if limit == 0 {
            return true;
        }

        let now = Instant::now();
        // entry()가 샤드 잠금을 쥐기 전에 정리해야 함
        if self.rate_limiter.len() > RATE_LIMIT_SWEEP_THRESHOLD {
            self.sweep_expired(now);
        }

        let mut entry = self
            .rate_limiter
            .entry(client.to_string())
            .or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) > RATE_LIMIT_WINDOW {
            *count = 0;
            *window_start = now;
        }

        if *count >= limit {
            return false;
        }

        *count += 1;
        true
    }

    /// 윈도우가 끝난 클라이언트 항목 제거
    pub fn sweep_expired(&self, now: Instant) {
        let before = self.rate_limiter.len();
        self.rate_limiter.retain(|_, (_, window_start)| {
            now.duration_since(*window_start) <= RATE_LIMIT_WINDOW
        });

        let removed = before.saturating_sub(self.rate_limiter.len());
        if removed > 0 {
            tracing::debug!("Evicted {} expired rate limit entries", removed);
        }
    }
}

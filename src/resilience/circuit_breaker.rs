//! 서킷 브레이커 - 불안정한 외부 호출(언어 모델) 보호
//!
//! 연속 실패가 `fail_max`에 도달하면 `reset_timeout` 동안 호출을 즉시 거절합니다.
//! 시간이 지나면 다음 호출 하나를 시도(half-open)하고, 성공하면 닫힙니다.
//!
//! 상태는 원자 변수 두 개(실패 횟수, 열림 만료 시각)로만 표현합니다.
//! 동시 실패 시 카운터가 근사치가 될 수 있지만 보호 장치로서는 충분합니다.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// 서킷 브레이커 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// 회로를 여는 연속 실패 횟수
    pub fail_max: u32,
    /// 열린 회로가 다시 시도를 허용하기까지의 시간
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            fail_max: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// 회로 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// 정상 호출
    Closed,
    /// 호출 거절 중
    Open,
    /// 만료됨, 다음 호출이 시험 호출
    HalfOpen,
}

/// 브레이커를 통한 호출 에러
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// 회로가 열려 있어 호출하지 않음
    #[error("circuit open")]
    Open,
    /// 호출은 했지만 실패
    #[error(transparent)]
    Inner(E),
}

/// 서킷 브레이커
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    failure_count: AtomicU32,
    /// `epoch` 기준 나노초 (0 = 한 번도 열린 적 없음)
    open_until: AtomicU64,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            failure_count: AtomicU32::new(0),
            open_until: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// 현재 호출이 거절될 상태인지 (빠른 경로 확인용)
    pub fn is_open(&self) -> bool {
        self.now_nanos() < self.open_until.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> CircuitState {
        let open_until = self.open_until.load(Ordering::Relaxed);
        if open_until == 0 {
            CircuitState::Closed
        } else if self.now_nanos() < open_until {
            CircuitState::Open
        } else {
            CircuitState::HalfOpen
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// 성공 기록: 실패 카운터와 열림 시각 초기화
    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        self.open_until.store(0, Ordering::Relaxed);
    }

    /// 실패 기록: 임계치에 도달하면 회로 열기
    pub fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.config.fail_max {
            let reset = u64::try_from(self.config.reset_timeout.as_nanos()).unwrap_or(u64::MAX);
            // 0은 "닫힘" 표시이므로 최소 1
            let until = self.now_nanos().saturating_add(reset).max(1);
            self.open_until.store(until, Ordering::Relaxed);

            tracing::warn!(
                failures,
                reset_timeout_secs = self.config.reset_timeout.as_secs_f64(),
                "Circuit opened"
            );
        }
    }

    /// 브레이커를 통해 비동기 호출
    ///
    /// 회로가 열려 있으면 `f`를 호출하지 않고 `BreakerError::Open`을 반환합니다.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.is_open() {
            return Err(BreakerError::Open);
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

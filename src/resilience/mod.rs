//! Resilience 모듈 - 외부 의존성 장애 격리

mod circuit_breaker;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState};

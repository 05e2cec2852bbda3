//! 선택적 의존성 핸들
//!
//! 임베딩 모델, 벡터 저장소, 언어 모델처럼 무거운 외부 의존성을
//! "준비됨 / 사용 불가 / 지연 초기화" 세 가지 상태로 표현합니다.
//! 지연 초기화는 최초 사용 시 한 번만 실행되며, 실패하면 사유와 함께
//! 사용 불가 상태로 고정됩니다.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::OnceCell;

type InitFn<T> = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<Arc<T>>> + Send + Sync>;

/// 선택적 의존성 핸들
pub struct Dependency<T: ?Sized> {
    name: &'static str,
    cell: OnceCell<Result<Arc<T>, String>>,
    init: Option<InitFn<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Dependency<T> {
    /// 이미 준비된 의존성
    pub fn ready(name: &'static str, value: Arc<T>) -> Self {
        Self {
            name,
            cell: OnceCell::new_with(Some(Ok(value))),
            init: None,
        }
    }

    /// 사용 불가 의존성
    pub fn unavailable(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            cell: OnceCell::new_with(Some(Err(reason.into()))),
            init: None,
        }
    }

    /// 최초 사용 시 초기화되는 의존성
    pub fn lazy<F, Fut>(name: &'static str, init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Arc<T>>> + Send + 'static,
    {
        Self {
            name,
            cell: OnceCell::new(),
            init: Some(Box::new(
                move || -> BoxFuture<'static, anyhow::Result<Arc<T>>> { Box::pin(init()) },
            )),
        }
    }

    /// 의존성 이름
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 의존성 획득 (필요하면 초기화)
    ///
    /// 사용 불가 상태면 사유 문자열을 반환합니다.
    pub async fn get(&self) -> Result<Arc<T>, String> {
        let state = self
            .cell
            .get_or_init(|| async {
                let Some(init) = self.init.as_ref() else {
                    return Err(format!("{} was never configured", self.name));
                };

                match init().await {
                    Ok(value) => {
                        tracing::info!("{} initialised", self.name);
                        Ok(value)
                    }
                    Err(e) => {
                        tracing::warn!("{} unavailable: {:#}", self.name, e);
                        Err(format!("{:#}", e))
                    }
                }
            })
            .await;

        state.clone()
    }

    /// 초기화가 끝났고 사용 가능한지 여부 (초기화를 유발하지 않음)
    pub fn is_ready(&self) -> bool {
        matches!(self.cell.get(), Some(Ok(_)))
    }

    /// 사용 불가로 확정되었는지 여부 (초기화를 유발하지 않음)
    pub fn is_unavailable(&self) -> bool {
        matches!(self.cell.get(), Some(Err(_)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_ready_and_unavailable() {
        let ready: Dependency<str> = Dependency::ready("greeting", Arc::from("hello"));
        assert!(ready.is_ready());
        assert_eq!(&*ready.get().await.unwrap(), "hello");

        let missing: Dependency<str> = Dependency::unavailable("model", "file not found");
        assert!(missing.is_unavailable());
        assert_eq!(missing.get().await.unwrap_err(), "file not found");
    }

    #[tokio::test]
    async fn test_lazy_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let dep: Dependency<usize> = Dependency::lazy("counter", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(42))
            }
        });

        assert!(!dep.is_ready());
        assert_eq!(*dep.get().await.unwrap(), 42);
        assert_eq!(*dep.get().await.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(dep.is_ready());
    }

    #[tokio::test]
    async fn test_lazy_failure_is_sticky() {
        let dep: Dependency<usize> =
            Dependency::lazy("broken", || async { Err(anyhow::anyhow!("connection refused")) });

        let err = dep.get().await.unwrap_err();
        assert!(err.contains("connection refused"));
        assert!(dep.is_unavailable());
    }
}

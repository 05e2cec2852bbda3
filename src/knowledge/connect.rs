//! 저장소 연결 - 설정된 백엔드에 연결하고 실패하면 임시 저장소로 폴백

use std::sync::Arc;

use anyhow::Result;

use crate::config::StoreSettings;
use crate::error::RagError;
use crate::handle::Dependency;

use super::chroma::ChromaStore;
use super::lance::LanceStore;
use super::memory::MemoryStore;
use super::vector::DocumentStore;

/// 설정된 백엔드에 연결
///
/// 연결 실패는 `StoreUnavailable`로 기록하고 인메모리 저장소를 반환합니다
/// (영구 저장은 안 되지만 서비스는 계속 동작).
pub async fn connect_store(settings: &StoreSettings) -> Arc<dyn DocumentStore> {
    match try_connect(settings).await {
        Ok(store) => {
            tracing::info!("Connected to {} document store", store.name());
            store
        }
        Err(e) => {
            let error = RagError::StoreUnavailable(format!("{:#}", e));
            tracing::warn!("{}; falling back to ephemeral in-memory store", error);
            Arc::new(MemoryStore::new())
        }
    }
}

async fn try_connect(settings: &StoreSettings) -> Result<Arc<dyn DocumentStore>> {
    match settings.backend.as_str() {
        "chroma" => Ok(Arc::new(
            ChromaStore::connect(&settings.host, settings.port).await?,
        )),
        "lance" => Ok(Arc::new(
            LanceStore::open(&settings.data_dir.join("documents.lance")).await?,
        )),
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => {
            anyhow::bail!("Unknown store backend: {other:?} (expected chroma, lance or memory)")
        }
    }
}

/// 최초 사용 시 연결되는 저장소 핸들
pub fn store_handle(settings: &StoreSettings) -> Dependency<dyn DocumentStore> {
    let settings = settings.clone();

    Dependency::lazy("document store", move || {
        let settings = settings.clone();
        async move { Ok(connect_store(&settings).await) }
    })
}

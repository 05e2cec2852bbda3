//! Knowledge 모듈 - app_id별 문서 저장소와 검색
//!
//! - Chroma: 원격 벡터 DB (기본 백엔드)
//! - LanceDB: 로컬 영구 저장소
//! - Memory: 연결 실패 시 임시 폴백
//! - Retriever: 정규화 + 임베딩 + 검색 조합

mod chroma;
mod connect;
mod lance;
mod memory;
mod retriever;
mod vector;

// Re-exports
pub use chroma::ChromaStore;
pub use connect::{connect_store, store_handle};
pub use lance::LanceStore;
pub use memory::MemoryStore;
pub use retriever::{Retriever, DEFAULT_TOP_K};
pub use vector::{
    cosine_similarity, CollectionHandle, Document, DocumentStore, Metadata, QueryResult,
    SOURCE_KEY,
};

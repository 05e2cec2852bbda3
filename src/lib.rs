//! apphelper-rag - 테넌트별 RAG 챗봇
//!
//! 앱(app_id)마다 분리된 벡터 컬렉션에서 문서를 검색하고,
//! 서킷 브레이커로 보호되는 언어 모델 호출로 인용이 포함된 답변을 생성합니다.

pub mod chat;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod handle;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod normalize;
pub mod resilience;
pub mod server;

// Re-exports
pub use chat::{ChatAnswer, ChatOrchestrator};
pub use config::Settings;
pub use embedding::{EmbeddingProvider, HashingEmbedding, HttpEmbedding};
pub use error::{RagError, RagResult};
pub use handle::Dependency;
pub use knowledge::{
    ChromaStore, CollectionHandle, Document, DocumentStore, LanceStore, MemoryStore, Metadata,
    QueryResult, Retriever,
};
pub use llm::{LanguageModel, LlamaServerModel};
pub use normalize::normalize;
pub use resilience::{CircuitBreaker, CircuitBreakerConfig};
pub use server::{build_router, AppState};

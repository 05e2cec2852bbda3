//! 에러 타입
//!
//! 어댑터 계층은 `anyhow::Result`로 컨텍스트를 쌓고,
//! 컴포넌트 경계(Retriever, ChatOrchestrator)에서 `RagError`로 변환합니다.

/// RAG 파이프라인 에러
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// 임베딩 프로바이더가 로드되지 않음
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// 벡터 저장소 연결 실패 (보통 임시 저장소로 복구됨)
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// 서킷 브레이커가 열려 있음
    #[error("circuit open: language model marked down")]
    CircuitOpen,

    /// 언어 모델이 로드되지 않음
    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),

    /// 언어 모델 호출 중 예상하지 못한 실패
    #[error("model invocation failed: {0}")]
    ModelInvocation(String),

    /// 잘못된 요청 페이로드
    #[error("validation error: {0}")]
    Validation(String),

    /// 그 밖의 내부 에러
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RagError {
    /// 의존성 장애로 인한 서비스 저하 여부 (503 매핑 대상)
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            RagError::CircuitOpen
                | RagError::ModelUnavailable(_)
                | RagError::EmbeddingUnavailable(_)
                | RagError::StoreUnavailable(_)
        )
    }
}

pub type RagResult<T> = std::result::Result<T, RagError>;

/// app_id 검증
///
/// 컬렉션 이름(`app_{app_id}`)이 Chroma/LanceDB 양쪽에서 유효하도록
/// 1~56자의 `[A-Za-z0-9_-]`만 허용합니다.
pub fn validate_app_id(app_id: &str) -> RagResult<()> {
    if app_id.is_empty() || app_id.len() > 56 {
        return Err(RagError::Validation(format!(
            "app_id must be 1-56 characters, got {}",
            app_id.len()
        )));
    }

    if !app_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(RagError::Validation(format!(
            "app_id contains invalid characters: {app_id:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_app_id() {
        assert!(validate_app_id("acme").is_ok());
        assert!(validate_app_id("test_app-2").is_ok());
        assert!(validate_app_id("").is_err());
        assert!(validate_app_id("a/b").is_err());
        assert!(validate_app_id("ακμή").is_err());
        assert!(validate_app_id(&"a".repeat(57)).is_err());
    }

    #[test]
    fn test_degraded_classification() {
        assert!(RagError::CircuitOpen.is_degraded());
        assert!(RagError::ModelUnavailable("x".into()).is_degraded());
        assert!(!RagError::ModelInvocation("x".into()).is_degraded());
        assert!(!RagError::Validation("x".into()).is_degraded());
    }
}

//! HTTP 에러 응답 매핑
//!
//! 내부 에러 상세는 로그에만 남기고 클라이언트에는 고정 메시지만 반환합니다.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::RagError;

pub type ServerResult<T> = Result<T, ServerError>;

/// 서버 에러
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limit exceeded")]
    RateLimited,

    /// 요청 본문을 해석할 수 없음
    #[error("invalid payload: {0}")]
    Payload(String),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Rag(#[from] RagError),
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::Payload(rejection.body_text())
    }
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServerError::Payload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Rag(RagError::Validation(_)) => StatusCode::BAD_REQUEST,
            ServerError::Rag(e) if e.is_degraded() => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Rag(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            ServerError::Unauthorized => json!({ "detail": "unauthorized" }),
            ServerError::RateLimited => json!({ "detail": "rate_limited" }),
            ServerError::Payload(message) => json!({ "detail": message }),
            ServerError::NotFound => json!({ "detail": "not_found" }),
            ServerError::Rag(RagError::Validation(message)) => json!({ "detail": message }),
            ServerError::Rag(RagError::CircuitOpen | RagError::ModelUnavailable(_)) => {
                json!({ "error": "llm_down" })
            }
            ServerError::Rag(RagError::EmbeddingUnavailable(_)) => {
                json!({ "error": "embedding_unavailable" })
            }
            ServerError::Rag(RagError::StoreUnavailable(_)) => {
                json!({ "error": "store_unavailable" })
            }
            ServerError::Rag(_) => json!({ "detail": "internal_error" }),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(status = %status, "Request failed: {}", self);
        } else {
            tracing::debug!(status = %status, "Request rejected: {}", self);
        }

        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServerError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServerError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ServerError::Rag(RagError::Validation("bad".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Rag(RagError::CircuitOpen).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::Rag(RagError::ModelInvocation("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_not_leaked() {
        let body = ServerError::Rag(RagError::ModelInvocation("stack trace here".into())).body();
        assert_eq!(body, json!({ "detail": "internal_error" }));

        let body = ServerError::Rag(RagError::Internal(anyhow::anyhow!("db password"))).body();
        assert_eq!(body, json!({ "detail": "internal_error" }));
    }

    #[test]
    fn test_degraded_bodies() {
        assert_eq!(
            ServerError::Rag(RagError::CircuitOpen).body(),
            json!({ "error": "llm_down" })
        );
        assert_eq!(
            ServerError::Rag(RagError::EmbeddingUnavailable("x".into())).body(),
            json!({ "error": "embedding_unavailable" })
        );
    }
}

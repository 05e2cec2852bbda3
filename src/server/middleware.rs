//! 요청 인터셉터 (axum `from_fn` 미들웨어)
//!
//! 적용 순서: request id -> 요청 로그 -> [보호 경로만] 토큰 인증 -> 속도 제한

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

use super::error::ServerError;
use super::state::AppState;

/// 토큰 헤더
pub const TOKEN_HEADER: &str = "x-api-token";
/// 요청 ID 헤더
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 요청 ID (request extensions에 저장)
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// 공유 비밀 토큰 인증
///
/// `X-API-Token` 또는 `Authorization: Bearer <token>`을 받습니다.
pub async fn token_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let token = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        });

    if !token.is_some_and(|t| state.is_valid_token(t)) {
        tracing::warn!(uri = %request.uri(), "Rejected request with missing or invalid token");
        return Err(ServerError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// 클라이언트 IP당 속도 제한
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let client = client_key(&request);

    if !state.check_rate_limit(&client) {
        tracing::warn!(client = %client, "Rate limit exceeded");
        return Err(ServerError::RateLimited);
    }

    Ok(next.run(request).await)
}

/// 속도 제한 키: 연결 주소, 없으면 `X-Forwarded-For`의 첫 항목
fn client_key(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// 요청 ID 부여 (클라이언트가 보낸 값이 있으면 재사용)
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// 요청 시작/종료 로그
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    tracing::info!(
        method = %method,
        uri = %uri,
        request_id = %request_id,
        "Request started"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        request_id = %request_id,
        "Request completed"
    );

    response
}

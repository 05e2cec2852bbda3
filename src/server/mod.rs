//! HTTP 서버 - 라우터 구성과 실행
//!
//! - 공개 경로: `GET /healthz`
//! - 보호 경로: `POST /chat/{app_id}`, `POST /ingest/{app_id}` (토큰 필요)

mod error;
mod middleware;
mod routes;
mod state;

pub use error::{ServerError, ServerResult};
pub use middleware::{RequestId, REQUEST_ID_HEADER, TOKEN_HEADER};
pub use routes::{HealthResponse, IngestResponse};
pub use state::AppState;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Settings;

/// 라우터 구성
///
/// 미들웨어는 바깥쪽부터 request id -> 요청 로그 -> 타임아웃 순이며,
/// 보호 경로에는 토큰 인증 -> 속도 제한이 추가됩니다.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new().route("/healthz", get(routes::healthz));

    let protected_routes = Router::new()
        .route("/chat/{app_id}", post(routes::chat))
        .route("/ingest/{app_id}", post(routes::ingest))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(from_fn_with_state(state.clone(), middleware::token_auth));

    let timeout = state.settings.timeout();

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(routes::not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(from_fn(middleware::log_requests))
        .layer(from_fn(middleware::request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 서버 시작 (Ctrl+C / SIGTERM까지 실행)
pub async fn start_server(settings: Settings) -> Result<()> {
    let addr = settings.server.socket_addr()?;
    let state = AppState::from_settings(&settings);
    let app = build_router(state);

    tracing::info!("Starting apphelper-rag server on {}", addr);
    tracing::info!(
        "Timeout: {}s, rate limit: {} requests/minute",
        settings.server.timeout_secs,
        settings.server.rate_limit_per_minute
    );
    tracing::info!(
        "Embedding: {} ({}), store: {} ({}:{}), model: {}",
        settings.embedding.provider,
        settings.embedding.model,
        settings.store.backend,
        settings.store.host,
        settings.store.port,
        settings.llm.model
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 종료 시그널 대기
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

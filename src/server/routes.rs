//! HTTP 핸들러

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::chat::ChatAnswer;
use crate::error::RagError;
use crate::knowledge::Document;

use super::error::{ServerError, ServerResult};
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub text: String,
    pub source: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub loaded: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// POST /chat/{app_id}
pub async fn chat(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ServerResult<Json<ChatAnswer>> {
    let Json(request) = payload?;
    if request.question.trim().is_empty() {
        return Err(RagError::Validation("question must not be empty".to_string()).into());
    }

    let answer = state.chat.chat(&app_id, &request.question).await?;
    Ok(Json(answer))
}

/// POST /ingest/{app_id}
pub async fn ingest(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> ServerResult<Json<IngestResponse>> {
    let Json(item) = payload?;

    let loaded = state
        .chat
        .retriever()
        .add_documents(&app_id, &[Document::with_source(item.text, item.source)])
        .await?;

    Ok(Json(IngestResponse { loaded }))
}

/// GET /healthz
pub async fn healthz(State(state): State<AppState>) -> ServerResult<Json<HealthResponse>> {
    state.chat.health_check().await.map_err(|e| {
        // 원인과 관계없이 모델 장애로 보고
        tracing::warn!("Health check failed: {}", e);
        ServerError::Rag(RagError::CircuitOpen)
    })?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

/// 404 fallback
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}

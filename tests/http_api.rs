//! HTTP API 통합 테스트 (Router를 tower `oneshot`으로 직접 호출)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use apphelper_rag::config::ServerSettings;
use apphelper_rag::{
    build_router, AppState, ChatOrchestrator, CircuitBreaker, CircuitBreakerConfig, Dependency,
    HashingEmbedding, LanguageModel, MemoryStore, Retriever,
};

const TOKEN: &str = "secret-token";

/// 검색 문맥 존재 여부를 답하는 모델
struct ContextModel {
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl LanguageModel for ContextModel {
    async fn complete(&self, prompt: &str, _max_tokens: usize) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("inference backend crashed");
        }
        if prompt.contains("Το ERP σύστημα") {
            Ok("  Το ERP είναι ένα σύστημα. [doc#1]\n".to_string())
        } else {
            Ok("δεν ξέρω".to_string())
        }
    }

    fn name(&self) -> &str {
        "context-model"
    }
}

fn app_with(model: Dependency<dyn LanguageModel>, rate_limit_per_minute: u32) -> Router {
    let retriever = Arc::new(Retriever::from_parts(
        Arc::new(HashingEmbedding::new(256).unwrap()),
        Arc::new(MemoryStore::new()),
    ));
    let chat = ChatOrchestrator::new(
        retriever,
        Arc::new(model),
        Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
    );

    let settings = ServerSettings {
        api_token: TOKEN.to_string(),
        rate_limit_per_minute,
        ..ServerSettings::default()
    };
    build_router(AppState::new(settings, Arc::new(chat)))
}

fn app(fail: bool) -> Router {
    let model: Arc<dyn LanguageModel> = Arc::new(ContextModel {
        fail,
        calls: AtomicUsize::new(0),
    });
    app_with(Dependency::ready("language model", model), 0)
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header("X-API-Token", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_missing_or_wrong_token_is_unauthorized() {
    let app = app(false);

    let (status, body) = send(&app, post("/chat/acme", None, json!({"question": "erp"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"detail": "unauthorized"}));

    let (status, _) = send(
        &app,
        post("/ingest/acme", Some("wrong"), json!({"text": "x", "source": "y"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_token_is_accepted() {
    let app = app(false);
    let request = Request::builder()
        .method("POST")
        .uri("/ingest/acme")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::from(json!({"text": "x", "source": "y"}).to_string()))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"loaded": 1}));
}

#[tokio::test]
async fn test_ingest_then_chat_returns_citations() {
    let app = app(false);

    let (status, body) = send(
        &app,
        post(
            "/ingest/acme",
            Some(TOKEN),
            json!({"text": "Το ERP σύστημα", "source": "doc#1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"loaded": 1}));

    let (status, body) = send(
        &app,
        post("/chat/acme", Some(TOKEN), json!({"question": "Τι είναι το ERP;"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Το ERP είναι ένα σύστημα. [doc#1]");
    assert_eq!(body["citations"], json!(["doc#1"]));
}

#[tokio::test]
async fn test_tenants_do_not_share_documents() {
    let app = app(false);
    send(
        &app,
        post(
            "/ingest/acme",
            Some(TOKEN),
            json!({"text": "Το ERP σύστημα", "source": "doc#1"}),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        post("/chat/other", Some(TOKEN), json!({"question": "erp"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["citations"], json!([]));
    assert_eq!(body["answer"], "δεν ξέρω");
}

#[tokio::test]
async fn test_malformed_payloads_are_client_errors() {
    let app = app(false);

    let (status, _) = send(&app, post("/chat/acme", Some(TOKEN), json!({"q": "erp"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, post("/chat/acme", Some(TOKEN), json!({"question": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post("/ingest/bad%20id", Some(TOKEN), json!({"text": "x", "source": "y"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_model_failures_open_circuit() {
    let app = app(true);

    for _ in 0..2 {
        let (status, body) = send(
            &app,
            post("/chat/acme", Some(TOKEN), json!({"question": "erp"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"detail": "internal_error"}));
    }

    let (status, body) = send(
        &app,
        post("/chat/acme", Some(TOKEN), json!({"question": "erp"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"error": "llm_down"}));
}

#[tokio::test]
async fn test_healthz() {
    let request = || Request::builder().uri("/healthz").body(Body::empty()).unwrap();

    let (status, body) = send(&app(false), request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let unavailable = app_with(Dependency::unavailable("language model", "not loaded"), 0);
    let (status, body) = send(&unavailable, request()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"error": "llm_down"}));
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let model: Arc<dyn LanguageModel> = Arc::new(ContextModel {
        fail: false,
        calls: AtomicUsize::new(0),
    });
    let app = app_with(Dependency::ready("language model", model), 2);

    let item = json!({"text": "x", "source": "y"});
    for _ in 0..2 {
        let (status, _) = send(&app, post("/ingest/acme", Some(TOKEN), item.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _) = send(&app, post("/ingest/acme", Some(TOKEN), item)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let request = Request::builder()
        .uri("/healthz")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();

    let response = app(false).oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
}

//! REST API tests driven through the axum router with `tower::ServiceExt`.
//!
//! Covers:
//! 1. Request validation (exactly one change source)
//! 2. The full POST /api/reviews flow with a stubbed LLM
//! 3. The `message` alias on wire findings
//! 4. GET by id, status, and history
//! 5. Health endpoint
//! 6. Per-origin rate limiting

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use reviewd::rest::{build_router, rate_limit::RateLimiter};
use reviewd::service::ReviewService;
use reviewd::store::ReviewStore;
use reviewd::AppContext;

use common::{test_config, StubLlm};

const SECURITY_REPLY: &str = r#"[{"line": 2, "severity": "critical",
    "description": "SQL injection", "suggestion": "parameterize"}]"#;

async fn app(stub: Arc<StubLlm>, rate_limit: u32) -> axum::Router {
    let mut config = test_config();
    config.rate_limit_per_minute = rate_limit;
    let config = Arc::new(config);
    let store = ReviewStore::in_memory().await.unwrap();
    let service = Arc::new(ReviewService::new(
        Arc::clone(&config),
        stub,
        store.clone(),
    ));
    build_router(Arc::new(AppContext {
        config,
        service,
        store,
        limiter: RateLimiter::new(rate_limit),
        started_at: std::time::Instant::now(),
    }))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ─── Test 1: validation ───────────────────────────────────────────────────────

#[tokio::test]
async fn missing_change_source_is_400() {
    let app = app(StubLlm::silent(), 100).await;
    let response = app
        .oneshot(post_json("/api/reviews", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error_code"], "validation_error");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn conflicting_change_sources_are_400() {
    let app = app(StubLlm::silent(), 100).await;
    let response = app
        .oneshot(post_json(
            "/api/reviews",
            json!({
                "pr_url": "https://github.com/octo/demo/pull/1",
                "diff_content": common::SIMPLE_DIFF,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unparseable_diff_is_400() {
    let app = app(StubLlm::silent(), 100).await;
    let response = app
        .oneshot(post_json(
            "/api/reviews",
            json!({ "diff_content": "definitely not a diff" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "diff_parse_error");
}

// ─── Test 2 & 3: review flow and the message alias ────────────────────────────

#[tokio::test]
async fn manual_review_returns_findings_with_message_alias() {
    let stub = Arc::new(StubLlm::new().with_reply("security_analyzer", SECURITY_REPLY));
    let app = app(stub, 100).await;

    let response = app
        .oneshot(post_json(
            "/api/reviews",
            json!({ "diff_content": common::SQL_INJECTION_DIFF }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["review_id"].is_string());
    assert_eq!(body["pr_metadata"]["repository"], "manual-review");
    assert_eq!(body["summary"]["total_findings"], 1);

    let finding = &body["findings"][0];
    assert_eq!(finding["description"], "SQL injection");
    assert_eq!(finding["message"], "SQL injection");
    assert_eq!(finding["severity"], "critical");
    assert_eq!(finding["category"], "security");

    assert!(body["formatted_comments"]
        .as_str()
        .unwrap()
        .contains("db.py"));
    assert_eq!(body["diagnostics"], json!([]));
}

// ─── Test 4: get / status / history ───────────────────────────────────────────

#[tokio::test]
async fn stored_review_is_readable_by_id_status_and_history() {
    let stub = Arc::new(StubLlm::new().with_reply("security_analyzer", SECURITY_REPLY));
    let app = app(stub, 100).await;

    let created = body_json(
        app.clone()
            .oneshot(post_json(
                "/api/reviews",
                json!({ "diff_content": common::SQL_INJECTION_DIFF }),
            ))
            .await
            .unwrap(),
    )
    .await;
    let id = created["review_id"].as_str().unwrap().to_string();

    // GET by id
    let response = app
        .clone()
        .oneshot(get(&format!("/api/reviews/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["review_id"], id.as_str());
    assert_eq!(body["findings"][0]["message"], "SQL injection");

    // GET status
    let response = app
        .clone()
        .oneshot(get(&format!("/api/reviews/{id}/status")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["findings_count"], 1);

    // GET history
    let response = app
        .clone()
        .oneshot(get("/api/reviews/history?repository=manual-review"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["reviews"].as_array().unwrap().len(), 1);

    // Unknown id
    let response = app
        .oneshot(get(&format!(
            "/api/reviews/{}",
            uuid::Uuid::new_v4()
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn history_rejects_unknown_severity() {
    let app = app(StubLlm::silent(), 100).await;
    let response = app
        .oneshot(get("/api/reviews/history?severity=apocalyptic"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ─── Test 5: health ───────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_database_status() {
    let app = app(StubLlm::silent(), 100).await;
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
}

// ─── Test 6: rate limiting ────────────────────────────────────────────────────

#[tokio::test]
async fn requests_over_quota_get_429() {
    let app = app(StubLlm::silent(), 2).await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(get("/api/reviews/history"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(get("/api/reviews/history"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "rate_limited");

    // Health is exempt from the quota.
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

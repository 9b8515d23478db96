// tests/api_http.rs
//
// HTTP-level tests for the ingestion Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET  /health
// - POST /api/nps-responses (auth gate, validation, storage failure)
// - GET  /api/nps-responses (auth gate, scoping, ordering, limit)
// - CORS headers

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{HeaderValue, Request, StatusCode},
    Router,
};
use serde_json::json;
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use nps_ingest::api::{self, AppState};
use nps_ingest::auth::{CredentialGate, PrefixOnlyRegistry, StaticKeyRegistry};
use nps_ingest::model::{AccountId, FeedbackSubmission, ResponseId, StoredResponse};
use nps_ingest::store::{InMemoryStore, ResponseStore, StoreError};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

/// Router with the demo registry: any `sk_` key is accepted.
fn test_router() -> Router {
    let gate = CredentialGate::new("sk_", Arc::new(PrefixOnlyRegistry));
    api::router(AppState::new(gate, Arc::new(InMemoryStore::default())))
}

fn post(auth: Option<&str>, body: &str) -> Request<Body> {
    let mut b = Request::builder()
        .method("POST")
        .uri("/api/nps-responses")
        .header("content-type", "application/json");
    if let Some(a) = auth {
        b = b.header("authorization", a);
    }
    b.body(Body::from(body.to_string()))
        .expect("build POST /api/nps-responses")
}

fn get(auth: Option<&str>, uri: &str) -> Request<Body> {
    let mut b = Request::builder().method("GET").uri(uri);
    if let Some(a) = auth {
        b = b.header("authorization", a);
    }
    b.body(Body::empty()).expect("build GET")
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Json) {
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router();
    let resp = app
        .oneshot(get(None, "/health"))
        .await
        .expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    assert_eq!(String::from_utf8_lossy(&bytes).trim(), "OK");
}

#[tokio::test]
async fn post_with_valid_key_returns_id() {
    let app = test_router();
    let (status, v) = send(&app, post(Some("Bearer sk_abc"), r#"{"score":9}"#)).await;
    assert_eq!(status, StatusCode::OK, "body: {v}");
    assert_eq!(v["success"], true);
    assert_eq!(v["message"], "Response saved successfully");
    let id = v["id"].as_str().expect("id must be a string");
    assert!(!id.is_empty(), "id must be non-empty");
}

#[tokio::test]
async fn post_with_full_widget_payload_is_accepted() {
    let app = test_router();
    let payload = json!({
        "score": 7,
        "feedback": "Onboarding took too long",
        "timestamp": "2025-06-01T10:00:00.000Z",
        "url": "https://shop.example.com/checkout",
        "userAgent": "Mozilla/5.0 ".repeat(30),
    });
    let (status, v) = send(&app, post(Some("Bearer sk_abc"), &payload.to_string())).await;
    assert_eq!(status, StatusCode::OK, "body: {v}");
}

#[tokio::test]
async fn post_without_authorization_is_401_key_required() {
    let app = test_router();
    let (status, v) = send(&app, post(None, r#"{"score":9}"#)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v, json!({ "error": "API key required" }));
}

#[tokio::test]
async fn post_with_empty_bearer_is_401_key_required() {
    let app = test_router();
    let (status, v) = send(&app, post(Some("Bearer "), r#"{"score":9}"#)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v["error"], "API key required");
}

#[tokio::test]
async fn post_with_wrong_prefix_is_401_invalid_key() {
    let app = test_router();
    for auth in ["Bearer pk_abc", "Bearer demo-key", "Basic c2tfYWJj"] {
        let (status, v) = send(&app, post(Some(auth), r#"{"score":9}"#)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "auth header {auth}");
        assert_eq!(v, json!({ "error": "Invalid API key" }));
    }
}

#[tokio::test]
async fn auth_is_checked_before_payload() {
    let app = test_router();
    let (status, v) = send(&app, post(None, "this is not json")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "body: {v}");
}

#[tokio::test]
async fn score_boundaries_are_inclusive() {
    let app = test_router();
    for score in [0, 10] {
        let (status, _) = send(
            &app,
            post(Some("Bearer sk_abc"), &json!({ "score": score }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "score {score} must be accepted");
    }
    for score in [-1, 11] {
        let (status, v) = send(
            &app,
            post(Some("Bearer sk_abc"), &json!({ "score": score }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "score {score} must be rejected");
        assert_eq!(v["error"], "Invalid payload");
    }
}

#[tokio::test]
async fn invalid_payload_lists_every_violation() {
    let app = test_router();
    let body = json!({ "score": "nine", "feedback": 3, "timestamp": "soon" }).to_string();
    let (status, v) = send(&app, post(Some("Bearer sk_abc"), &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let details = v["details"].as_array().expect("details array");
    assert_eq!(details.len(), 3, "details: {details:?}");
}

#[tokio::test]
async fn malformed_json_is_400() {
    let app = test_router();
    let (status, v) = send(&app, post(Some("Bearer sk_abc"), "{\"score\": ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], "Invalid payload");
}

#[tokio::test]
async fn get_requires_key() {
    let app = test_router();
    let (status, v) = send(&app, get(None, "/api/nps-responses")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v, json!({ "error": "API key required" }));
}

#[tokio::test]
async fn get_returns_own_responses_most_recent_first() {
    let app = test_router();
    for (key, score) in [("sk_a", 1), ("sk_a", 2), ("sk_b", 9), ("sk_a", 3)] {
        let (status, _) = send(
            &app,
            post(
                Some(&format!("Bearer {key}")),
                &json!({ "score": score, "url": "/pricing" }).to_string(),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, v) = send(&app, get(Some("Bearer sk_a"), "/api/nps-responses")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = v["responses"].as_array().expect("responses array");
    let scores: Vec<i64> = rows.iter().map(|r| r["score"].as_i64().unwrap()).collect();
    assert_eq!(scores, vec![3, 2, 1], "only sk_a rows, newest first");
    for r in rows {
        for field in ["id", "score", "feedback", "timestamp", "url"] {
            assert!(r.get(field).is_some(), "row missing '{field}': {r}");
        }
        assert_eq!(r["url"], "/pricing");
    }

    let (_, v) = send(&app, get(Some("Bearer sk_a"), "/api/nps-responses?limit=1")).await;
    assert_eq!(v["responses"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn static_registry_rejects_unknown_and_scopes_by_account() {
    let reg = StaticKeyRegistry::new()
        .issue("sk_acme_1", "acme", None)
        .issue("sk_acme_2", "acme", None)
        .issue("sk_revoked", "acme", None)
        .revoke("sk_revoked");
    let gate = CredentialGate::new("sk_", Arc::new(reg));
    let app = api::router(AppState::new(gate, Arc::new(InMemoryStore::default())));

    let (status, v) = send(&app, post(Some("Bearer sk_stranger"), r#"{"score":5}"#)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v["error"], "Invalid API key");

    let (status, _) = send(&app, post(Some("Bearer sk_revoked"), r#"{"score":5}"#)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, post(Some("Bearer sk_acme_1"), r#"{"score":8}"#)).await;
    assert_eq!(status, StatusCode::OK);

    // Second key of the same account sees the response.
    let (_, v) = send(&app, get(Some("Bearer sk_acme_2"), "/api/nps-responses")).await;
    assert_eq!(v["responses"].as_array().unwrap().len(), 1);
}

struct BrokenStore;

#[async_trait::async_trait]
impl ResponseStore for BrokenStore {
    async fn insert(
        &self,
        _account: &AccountId,
        _submission: FeedbackSubmission,
    ) -> Result<ResponseId, StoreError> {
        Err(StoreError::Write("disk full".into()))
    }

    async fn list(
        &self,
        _account: &AccountId,
        _limit: usize,
    ) -> Result<Vec<StoredResponse>, StoreError> {
        Err(StoreError::Unavailable("connection reset".into()))
    }
}

#[tokio::test]
async fn storage_failure_is_500() {
    let gate = CredentialGate::new("sk_", Arc::new(PrefixOnlyRegistry));
    let app = api::router(AppState::new(gate, Arc::new(BrokenStore)));

    let (status, v) = send(&app, post(Some("Bearer sk_abc"), r#"{"score":9}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(v, json!({ "error": "Failed to save response" }));

    let (status, _) = send(&app, get(Some("Bearer sk_abc"), "/api/nps-responses")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let app = test_router();

    let req = Request::builder()
        .method("OPTIONS")
        .uri("/api/nps-responses")
        .header("origin", "https://customer-site.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization,content-type")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert!(resp.status().is_success(), "preflight: {}", resp.status());
    let allow = resp
        .headers()
        .get("access-control-allow-origin")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    assert_eq!(allow, "*");

    let mut req = post(Some("Bearer sk_abc"), r#"{"score":9}"#);
    req.headers_mut()
        .insert("origin", "https://customer-site.example".parse().unwrap());
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|h| h.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn full_app_serves_widget_assets_and_limits_body() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("nps-widget.js"), "window.NPSWidget = {};").unwrap();

    let mut cfg = nps_ingest::ServiceConfig::default();
    cfg.http.asset_dir = Some(dir.path().to_path_buf());
    cfg.http.max_body_bytes = 256;
    let app = nps_ingest::app_with_config(&cfg).expect("app");

    let resp = app
        .clone()
        .oneshot(get(None, "/assets/nps-widget.js"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"window.NPSWidget = {};");

    let big = json!({ "score": 5, "feedback": "x".repeat(1_000) }).to_string();
    let resp = app.oneshot(post(Some("Bearer sk_abc"), &big)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn list_checks_key_before_query() {
    let app = test_router();

    let resp = app
        .clone()
        .oneshot(get(None, "/api/nps-responses?limit=abc"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    let v: Json = serde_json::from_slice(&bytes).expect("JSON error body");
    assert_eq!(v, json!({ "error": "API key required" }));

    let resp = app
        .oneshot(get(Some("Bearer sk_abc"), "/api/nps-responses?limit=abc"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.headers()
            .get("content-type")
            .and_then(|h| h.to_str().ok()),
        Some("application/json")
    );
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    let v: Json = serde_json::from_slice(&bytes).expect("JSON error body");
    assert_eq!(v["error"], "Invalid query");
    assert_eq!(v["details"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn unreadable_authorization_header_is_invalid_not_missing() {
    let app = test_router();

    let mut req = post(None, r#"{"score":9}"#);
    req.headers_mut().insert(
        "authorization",
        HeaderValue::from_bytes(b"Bearer sk_\xffkey").unwrap(),
    );
    let (status, v) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v, json!({ "error": "Invalid API key" }));

    let mut req = get(None, "/api/nps-responses");
    req.headers_mut()
        .insert("authorization", HeaderValue::from_bytes(b"sk_\xe9").unwrap());
    let (status, v) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v["error"], "Invalid API key");
}

#[tokio::test]
async fn rotating_demo_keys_cannot_grow_store_without_bound() {
    let mut cfg = nps_ingest::ServiceConfig::default();
    cfg.store.max_per_account = 1;
    cfg.store.max_accounts = 10;
    let app = nps_ingest::app_with_config(&cfg).expect("app");

    for i in 0..200 {
        let (status, _) = send(
            &app,
            post(Some(&format!("Bearer sk_{i}")), r#"{"score":8}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, v) = send(&app, get(Some("Bearer sk_0"), "/api/nps-responses")).await;
    assert!(v["responses"].as_array().unwrap().is_empty(), "oldest key evicted");
    let (_, v) = send(&app, get(Some("Bearer sk_199"), "/api/nps-responses")).await;
    assert_eq!(v["responses"].as_array().unwrap().len(), 1);
}

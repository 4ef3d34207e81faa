mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use lcaudit::config::{ApiKeys, AuditConfig};
use lcaudit::detached::DetachedTasks;
use lcaudit::log_capture::LogState;
use lcaudit::server::build_router;
use lcaudit::state::{AppState, AuditTracker, SharedState};
use lcaudit::storage::{ReportStore, Viewport};

use common::*;

fn test_config(dir: &tempfile::TempDir, rate_limit_max: usize) -> AuditConfig {
    AuditConfig {
        port: 3000,
        data_dir: dir.path().to_path_buf(),
        log_dir: None,
        public_base_url: "http://localhost:3000".into(),
        collector_timeout: Duration::from_secs(5),
        analyser_timeout: Duration::from_secs(5),
        audit_budget: Duration::from_secs(60),
        rate_limit_max,
        rate_limit_window: Duration::from_secs(60),
        keys: ApiKeys::default(),
    }
}

fn app(dir: &tempfile::TempDir, rate_limit_max: usize) -> (Router, SharedState) {
    let store = store(dir);
    let logs = Arc::new(LogState::new());
    let tracker = Arc::new(AuditTracker::new());
    let pipeline = Arc::new(pipeline(
        healthy_suite(Duration::from_secs(5)),
        store.clone(),
        tracker.clone(),
        logs.clone(),
    ));
    let detached = DetachedTasks::new(logs.clone());
    let state: SharedState = Arc::new(AppState::new(
        test_config(dir, rate_limit_max),
        logs,
        tracker,
        store,
        pipeline,
        detached,
    ));
    (build_router(state.clone()), state)
}

fn post_audit(body: &str, client: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/audit")
        .header("content-type", "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(&dir, 5);
    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["activeAudits"], 0);
}

#[tokio::test]
async fn test_legacy_audit_then_fetch_report() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(&dir, 5);

    let response = router
        .clone()
        .oneshot(post_audit(r#"{"url":"acme.test"}"#, "1.1.1.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["hostname"], "acme.test");
    let audit_id = body["data"]["auditId"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(get(&format!("/audits/{audit_id}/report")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["auditId"], audit_id.as_str());

    let response = router.clone().oneshot(get("/audits/history")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"][0]["status"], "complete");

    let response = router
        .oneshot(get("/audits/history?limit=18446744073709551615"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_multi_page_audit() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(&dir, 5);
    let response = router
        .oneshot(post_audit(
            r#"{"pages":[{"url":"acme.test"},{"url":"acme.test/products/1","label":"product-page"}]}"#,
            "1.1.1.1",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["reports"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["reports"][1]["pageLabel"], "product-page");
    assert!(body["data"]["failures"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_input_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(&dir, 5);

    let response = router
        .clone()
        .oneshot(post_audit(r#"{"url":"http://localhost:8080"}"#, "1.1.1.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "invalid_input");

    let response = router
        .oneshot(post_audit("{not json", "1.1.1.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "invalid_input");
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(&dir, 1);

    let first = router
        .clone()
        .oneshot(post_audit(r#"{"url":"ftp://acme.test"}"#, "9.9.9.9"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::BAD_REQUEST);

    let second = router
        .clone()
        .oneshot(post_audit(r#"{"url":"acme.test"}"#, "9.9.9.9"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(second).await["code"], "rate_limited");

    // Read-only routes are not limited.
    let health = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_report_lookup_errors() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = app(&dir, 5);

    let response = router
        .clone()
        .oneshot(get("/audits/audit_1700000000000_abc123/report"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router.oneshot(get("/audits/..%2Fetc/report")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_serves_stored_screenshot() {
    let dir = tempfile::tempdir().unwrap();
    let (router, state) = app(&dir, 5);
    let id = "audit_1700000000000_abc123";
    state
        .store
        .store_screenshot(id, Viewport::Mobile, Bytes::from_static(b"\x89PNG"))
        .await
        .unwrap();

    let response = router
        .clone()
        .oneshot(get(&format!("/audits/{id}/mobile.png")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");

    let response = router
        .oneshot(get(&format!("/audits/{id}/secrets.txt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_active_and_log_history() {
    let dir = tempfile::tempdir().unwrap();
    let (router, state) = app(&dir, 5);
    state
        .logs
        .emit_for(
            "audit_1700000000000_abc123",
            lcaudit::log_capture::LogSource::Pipeline,
            lcaudit::log_capture::LogLevel::Info,
            "hello",
        )
        .await;

    let response = router.clone().oneshot(get("/audits/active")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(json_body(response).await["data"].as_array().unwrap().is_empty());

    let response = router
        .oneshot(get("/logs/history?audit_id=audit_1700000000000_abc123"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["entries"][0]["message"], "hello");
}

//! HTTP surface tests over the in-memory store and mock notifier.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use postdate_api::{create_router, AppState};
use postdate_core::{BroadcastHub, Clock, DeliveryStatus, TestClock};
use postdate_sweep::{
    notifier::mock::{Behavior, MockNotifier},
    store::{memory::MemoryItemStore, ItemStore},
    SweepConfig, SweepScheduler,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    store: Arc<MemoryItemStore>,
    notifier: Arc<MockNotifier>,
    clock: Arc<TestClock>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryItemStore::new());
    let notifier = Arc::new(MockNotifier::new());
    let clock = Arc::new(TestClock::new());
    let hub = BroadcastHub::new(8);
    let scheduler = Arc::new(SweepScheduler::new(
        store.clone(),
        notifier.clone(),
        SweepConfig::default(),
        clock.clone(),
        Arc::new(hub.clone()),
    ));
    let state = AppState { scheduler, store: store.clone(), hub, clock: clock.clone() };
    TestApp { router: create_router(state), store, notifier, clock }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_body(app: &TestApp, owner_id: Uuid, minutes_from_now: i64) -> Value {
    json!({
        "owner_id": owner_id,
        "file_name": "report.pdf",
        "storage_key": "files/report.pdf",
        "recipient": "dest@example.com",
        "scheduled_at": app.clock.now_utc() + Duration::minutes(minutes_from_now),
    })
}

#[tokio::test]
async fn create_item_returns_pending_item() {
    let app = test_app();
    let owner = Uuid::new_v4();

    let body = create_body(&app, owner, 30);
    let response = app.router.oneshot(json_request("POST", "/items", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let item = body_json(response).await;
    assert_eq!(item["status"], "pending");
    assert_eq!(item["recipient"], "dest@example.com");
    assert_eq!(item["access_token"].as_str().unwrap().len(), 64);
    assert!(item["sent_at"].is_null());
}

#[tokio::test]
async fn create_item_rejects_bad_recipient() {
    let app = test_app();
    let mut body = create_body(&app, Uuid::new_v4(), 30);
    body["recipient"] = json!("not-an-address");

    let response = app.router.oneshot(json_request("POST", "/items", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let error = body_json(response).await;
    assert_eq!(error["error"]["code"], "invalid_input");
}

#[tokio::test]
async fn list_items_is_scoped_to_owner() {
    let app = test_app();
    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();

    for minutes in [10, 20] {
        let response = app
            .router
            .clone()
            .oneshot(json_request("POST", "/items", create_body(&app, owner, minutes)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/items", create_body(&app, other, 10)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .router
        .oneshot(empty_request("GET", &format!("/items?owner_id={owner}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let items = body_json(response).await;
    assert_eq!(items.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn missing_item_is_404() {
    let app = test_app();
    let response = app
        .router
        .oneshot(empty_request("GET", &format!("/items/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let error = body_json(response).await;
    assert_eq!(error["error"]["code"], "not_found");
}

#[tokio::test]
async fn patch_applies_while_pending() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/items", create_body(&app, Uuid::new_v4(), 30)))
        .await
        .unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .router
        .oneshot(json_request(
            "PATCH",
            &format!("/items/{id}"),
            json!({"recipient": "moved@example.com"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let item = body_json(response).await;
    assert_eq!(item["recipient"], "moved@example.com");
    assert_eq!(item["status"], "pending");
}

#[tokio::test]
async fn empty_patch_is_rejected() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/items", create_body(&app, Uuid::new_v4(), 30)))
        .await
        .unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .router
        .oneshot(json_request("PATCH", &format!("/items/{id}"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let error = body_json(response).await;
    assert_eq!(error["error"]["code"], "invalid_input");
}

#[tokio::test]
async fn patch_after_claim_conflicts() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/items", create_body(&app, Uuid::new_v4(), -5)))
        .await
        .unwrap();
    let created = body_json(response).await;
    let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();

    // The sweep machinery claims the item.
    assert!(app.store.try_claim(id.into(), Utc::now()).await.unwrap().is_some());

    let response = app
        .router
        .oneshot(json_request(
            "PATCH",
            &format!("/items/{id}"),
            json!({"recipient": "moved@example.com"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error = body_json(response).await;
    assert_eq!(error["error"]["code"], "conflict");
}

#[tokio::test]
async fn delete_is_idempotent() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/items", create_body(&app, Uuid::new_v4(), 30)))
        .await
        .unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response =
        app.router.clone().oneshot(empty_request("DELETE", &format!("/items/{id}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response =
        app.router.oneshot(empty_request("DELETE", &format!("/items/{id}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn manual_sweep_delivers_due_items() {
    let app = test_app();
    app.notifier.set_behavior(Behavior::Accept { email_id: Some("250 Ok".to_string()) }).await;

    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/items", create_body(&app, Uuid::new_v4(), -5)))
        .await
        .unwrap();
    let id: Uuid = body_json(response).await["id"].as_str().unwrap().parse().unwrap();

    let response = app.router.clone().oneshot(empty_request("POST", "/sweep")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["processed"], 1);
    assert_eq!(report["succeeded"], 1);
    assert_eq!(report["failed"], 0);

    assert_eq!(app.store.status_of(id.into()).await, Some(DeliveryStatus::Sent));
    assert_eq!(app.notifier.sent_count().await, 1);

    // Triggering again is harmless.
    let response = app.router.oneshot(empty_request("POST", "/sweep")).await.unwrap();
    let report = body_json(response).await;
    assert_eq!(report["processed"], 0);
    assert_eq!(app.notifier.sent_count().await, 1);
}

#[tokio::test]
async fn sweep_reports_store_failure() {
    let app = test_app();
    app.store.inject_list_error("connection refused").await;

    let response = app.router.oneshot(empty_request("POST", "/sweep")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let error = body_json(response).await;
    assert_eq!(error["error"]["code"], "store_unavailable");
}

#[tokio::test]
async fn health_reports_healthy_store() {
    let app = test_app();
    let response = app.router.oneshot(empty_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["checks"]["store"]["status"], "up");
}

#[tokio::test]
async fn liveness_is_always_alive() {
    let app = test_app();
    let response = app.router.oneshot(empty_request("GET", "/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "alive");
}

#[tokio::test]
async fn responses_carry_request_ids() {
    let app = test_app();
    let response = app.router.oneshot(empty_request("GET", "/live")).await.unwrap();
    assert!(response.headers().contains_key("X-Request-Id"));
}

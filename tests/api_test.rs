//! HTTP API tests driving the router in-process.

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use chrono::Utc;
use featuregate::{
    backend::{router::build_router, state::AppState},
    db::{PoolSettings, lazy_pool},
    gate::{
        BillingPeriod, CapabilityLimit, GateSources, SubscriptionSnapshot, SubscriptionStatus,
        memory::MemoryStore,
    },
};
use serde_json::Value;
use tower::ServiceExt;

const API_KEY: &str = "test-key";

fn store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.set_plan(
        "starter",
        vec![
            CapabilityLimit::flag("api_access", true),
            CapabilityLimit::bounded("rfq_limit_monthly", 10),
        ],
    );
    store.set_subscription(SubscriptionSnapshot {
        subscriber_id: "supplier-7".into(),
        plan_id: "starter".into(),
        status: SubscriptionStatus::Active,
        trial_end: None,
        current_period_end: None,
        cancel_at_period_end: false,
    });
    // Pinned so the tests do not depend on the month they run in.
    store.set_period(BillingPeriod::calendar_month(Utc::now()));
    store
}

fn app(store: &Arc<MemoryStore>) -> Router {
    let state = AppState::new(GateSources::from_store(store.clone()), API_KEY);
    build_router(Arc::new(state))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {}", API_KEY))
        .body(Body::empty())
        .unwrap()
}

fn post_usage(subscriber: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/v1/subscribers/{}/usage", subscriber))
        .header("Authorization", format!("Bearer {}", API_KEY))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn period() -> BillingPeriod {
    BillingPeriod::calendar_month(Utc::now())
}

#[tokio::test]
async fn rejects_missing_api_key() {
    let store = store();
    let req = Request::builder()
        .uri("/v1/subscribers/supplier-7/entitlements")
        .body(Body::empty())
        .unwrap();

    let resp = app(&store).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_needs_no_key() {
    let store = store();
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();

    let resp = app(&store).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "ok");
}

#[tokio::test]
async fn health_is_unavailable_when_the_database_is_down() {
    let store = store();
    let settings = PoolSettings {
        max_connections: 1,
        acquire_timeout: Duration::from_millis(300),
    };
    // Nothing listens on port 1.
    let pool = lazy_pool("postgres://gate@127.0.0.1:1/featuregate", &settings).unwrap();
    let state = AppState::new(GateSources::from_store(store.clone()), API_KEY)
        .with_pool(Arc::new(pool));

    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = build_router(Arc::new(state)).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = json_body(resp).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], false);
}

#[tokio::test]
async fn entitlements_summary() {
    let store = store();
    store.set_usage("supplier-7", "rfq_limit_monthly", period(), 3);

    let resp = app(&store)
        .oneshot(get("/v1/subscribers/supplier-7/entitlements"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["plan_id"], "starter");
    assert_eq!(body["status"], "active");
    assert_eq!(body["is_active"], true);
    assert_eq!(body["capabilities"]["api_access"]["has_capability"], true);
    assert_eq!(body["capabilities"]["rfq_limit_monthly"]["remaining"], 7);
}

#[tokio::test]
async fn unknown_subscriber_gets_empty_entitlements() {
    let store = store();
    let resp = app(&store)
        .oneshot(get("/v1/subscribers/ghost/entitlements"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["is_active"], false);
    assert_eq!(body["plan_id"], Value::Null);
}

#[tokio::test]
async fn capability_report() {
    let store = store();
    let resp = app(&store)
        .oneshot(get("/v1/subscribers/supplier-7/capabilities/white_label"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["has_capability"], false);
    assert_eq!(body["can_consume"], false);
    assert_eq!(body["limit"], 0);
    assert_eq!(body["remaining"], 0);
}

#[tokio::test]
async fn records_usage() {
    let store = store();
    let resp = app(&store)
        .oneshot(post_usage(
            "supplier-7",
            serde_json::json!({"capability_key": "rfq_limit_monthly", "amount": 2}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["applied"], true);
    assert_eq!(body["usage"], 2);
    assert_eq!(body["remaining"], 8);
    assert_eq!(store.stored_usage("supplier-7", "rfq_limit_monthly", period()), 2);
}

#[tokio::test]
async fn amount_defaults_to_one() {
    let store = store();
    let resp = app(&store)
        .oneshot(post_usage(
            "supplier-7",
            serde_json::json!({"capability_key": "rfq_limit_monthly"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(store.stored_usage("supplier-7", "rfq_limit_monthly", period()), 1);
}

#[tokio::test]
async fn exhausted_quota_is_too_many_requests() {
    let store = store();
    store.set_usage("supplier-7", "rfq_limit_monthly", period(), 10);

    let resp = app(&store)
        .oneshot(post_usage(
            "supplier-7",
            serde_json::json!({"capability_key": "rfq_limit_monthly", "amount": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    let body = json_body(resp).await;
    assert_eq!(body["applied"], false);
    assert_eq!(body["reason"], "quota_exceeded");
    assert_eq!(store.ledger_writes(), 0);
}

#[tokio::test]
async fn flag_capability_cannot_be_consumed() {
    let store = store();
    let resp = app(&store)
        .oneshot(post_usage(
            "supplier-7",
            serde_json::json!({"capability_key": "api_access", "amount": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(resp).await["reason"], "not_entitled");
}

#[tokio::test]
async fn zero_amount_is_bad_request() {
    let store = store();
    let resp = app(&store)
        .oneshot(post_usage(
            "supplier-7",
            serde_json::json!({"capability_key": "rfq_limit_monthly", "amount": 0}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ledger_failure_is_service_unavailable() {
    let store = store();
    store.fail_writes(true);

    let resp = app(&store)
        .oneshot(post_usage(
            "supplier-7",
            serde_json::json!({"capability_key": "rfq_limit_monthly", "amount": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn read_failure_is_service_unavailable() {
    let store = store();
    store.fail_reads(true);

    let resp = app(&store)
        .oneshot(get("/v1/subscribers/supplier-7/entitlements"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(resp).await["status"], 503);
}

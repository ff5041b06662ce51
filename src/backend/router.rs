use std::sync::Arc;

use crate::{
    backend::{
        handlers::{
            capability_handler, entitlements_handler, health_handler, record_usage_handler,
        },
        middleware::api_key_auth,
        state::AppState,
    },
    utils::metrics::metrics_handler,
};
use axum::{
    Router,
    middleware::{self},
    routing,
};

pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/v1/subscribers/:subscriber_id/entitlements",
            routing::get(entitlements_handler),
        )
        .route(
            "/v1/subscribers/:subscriber_id/capabilities/:capability_key",
            routing::get(capability_handler),
        )
        .route(
            "/v1/subscribers/:subscriber_id/usage",
            routing::post(record_usage_handler),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), api_key_auth));

    Router::new()
        .route("/healthz", routing::get(health_handler))
        .route("/metrics", routing::get(metrics_handler))
        .merge(api)
        .with_state(state)
}

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    backend::{error::ApiError, state::AppState},
    db::health_check,
    gate::{
        evaluator::{CapabilityReport, EntitlementSummary, FeatureGate, UsageOutcome},
        types::Limit,
    },
    utils::{logs_fmt::abbrev, metrics::METRICS},
};

#[derive(Debug, Deserialize)]
pub struct RecordUsageRequest {
    pub capability_key: String,
    #[serde(default = "default_amount")]
    pub amount: u64,
}

fn default_amount() -> u64 {
    1
}

#[derive(Debug, Serialize)]
pub struct RecordUsageResponse {
    pub subscriber_id: String,
    pub capability_key: String,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    pub usage: u64,
    pub remaining: Limit,
}

async fn load_gate(state: &AppState, subscriber_id: &str) -> Result<FeatureGate, ApiError> {
    let timer = METRICS.gate_load_duration.start_timer();
    let result = FeatureGate::load(&state.sources, subscriber_id, Utc::now()).await;
    timer.observe_duration();

    match result {
        Ok(gate) => {
            METRICS.gate_loads.inc();
            Ok(gate)
        }
        Err(e) => {
            METRICS.gate_load_failures.inc();
            warn!(error = %e, subscriber = %abbrev(subscriber_id), "Failed to load feature gate");
            Err(e.into())
        }
    }
}

#[instrument(skip(state))]
pub async fn entitlements_handler(
    State(state): State<Arc<AppState>>,
    Path(subscriber_id): Path<String>,
) -> Result<Json<EntitlementSummary>, ApiError> {
    let gate = load_gate(&state, &subscriber_id).await?;
    Ok(Json(gate.summary()))
}

#[instrument(skip(state))]
pub async fn capability_handler(
    State(state): State<Arc<AppState>>,
    Path((subscriber_id, capability_key)): Path<(String, String)>,
) -> Result<Json<CapabilityReport>, ApiError> {
    let gate = load_gate(&state, &subscriber_id).await?;
    let report = gate.report(&capability_key);

    if !report.has_capability && !report.can_consume {
        METRICS.capability_denied.inc();
    }

    Ok(Json(report))
}

#[instrument(skip(state, payload), fields(key = %payload.capability_key, amount = payload.amount))]
pub async fn record_usage_handler(
    State(state): State<Arc<AppState>>,
    Path(subscriber_id): Path<String>,
    Json(payload): Json<RecordUsageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.amount == 0 {
        return Err(ApiError::InvalidRequest("amount must be > 0".to_string()));
    }

    let mut gate = load_gate(&state, &subscriber_id).await?;
    let key = payload.capability_key.as_str();

    let outcome = match gate.try_increment_usage(key, payload.amount).await {
        Ok(outcome) => outcome,
        Err(e) => {
            METRICS.usage_write_failures.inc();
            warn!(
                error = %e,
                subscriber = %abbrev(&subscriber_id),
                key = %key,
                "Failed to record usage"
            );
            return Err(e.into());
        }
    };

    let (status, reason) = match outcome {
        UsageOutcome::Applied { .. } => {
            METRICS.usage_applied.inc();
            info!(
                subscriber = %subscriber_id,
                key = %key,
                amount = payload.amount,
                usage = outcome.usage(),
                "Usage recorded"
            );
            (StatusCode::OK, None)
        }
        UsageOutcome::Denied { .. } => {
            METRICS.usage_rejected.inc();
            let reason = if gate.declared(key).is_some_and(|kind| kind.is_metered()) {
                "quota_exceeded"
            } else {
                "not_entitled"
            };
            (StatusCode::TOO_MANY_REQUESTS, Some(reason))
        }
        UsageOutcome::LedgerRejected { .. } => {
            METRICS.usage_rejected.inc();
            (StatusCode::TOO_MANY_REQUESTS, Some("quota_exceeded"))
        }
    };

    Ok((
        status,
        Json(RecordUsageResponse {
            subscriber_id,
            capability_key: payload.capability_key.clone(),
            applied: outcome.is_applied(),
            reason,
            usage: outcome.usage(),
            remaining: gate.remaining(key),
        }),
    ))
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_ok = match &state.pool {
        Some(pool) => health_check(pool).await.is_ok(),
        None => true,
    };
    let (code, status) = if db_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "database": db_ok,
            "service": "featuregate"
        })),
    )
}

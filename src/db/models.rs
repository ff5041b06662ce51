use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use crate::{
    gate::types::{CapabilityKind, CapabilityLimit, SubscriptionSnapshot, SubscriptionStatus},
    utils::error::GateError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "feature_kind", rename_all = "snake_case")]
pub enum FeatureKind {
    Boolean,
    Bounded,
    Unlimited,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PlanFeature {
    pub plan_id: String,
    pub feature_key: String,
    pub kind: FeatureKind,
    pub enabled: Option<bool>,
    pub limit_value: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl PlanFeature {
    /// Column values for a capability, in (kind, enabled, limit_value) order.
    pub fn columns(kind: &CapabilityKind) -> (FeatureKind, Option<bool>, Option<i64>) {
        match kind {
            CapabilityKind::Flag(enabled) => (FeatureKind::Boolean, Some(*enabled), None),
            CapabilityKind::Bounded(limit) => (
                FeatureKind::Bounded,
                None,
                Some(i64::try_from(*limit).unwrap_or(i64::MAX)),
            ),
            CapabilityKind::Unlimited => (FeatureKind::Unlimited, None, None),
        }
    }
}

impl TryFrom<PlanFeature> for CapabilityLimit {
    type Error = GateError;

    fn try_from(row: PlanFeature) -> Result<Self, Self::Error> {
        let kind = match row.kind {
            FeatureKind::Boolean => CapabilityKind::Flag(row.enabled.unwrap_or(false)),
            FeatureKind::Bounded => {
                let limit = row.limit_value.ok_or_else(|| {
                    GateError::Catalog(format!(
                        "plan {} feature {} is bounded but has no limit",
                        row.plan_id, row.feature_key
                    ))
                })?;
                let limit = u64::try_from(limit).map_err(|_| {
                    GateError::Catalog(format!(
                        "plan {} feature {} has negative limit {}",
                        row.plan_id, row.feature_key, limit
                    ))
                })?;
                CapabilityKind::Bounded(limit)
            }
            FeatureKind::Unlimited => CapabilityKind::Unlimited,
        };

        Ok(CapabilityLimit {
            key: row.feature_key,
            kind,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub subscriber_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub trial_end: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionSnapshot {
    fn from(row: Subscription) -> Self {
        SubscriptionSnapshot {
            subscriber_id: row.subscriber_id,
            plan_id: row.plan_id,
            status: row.status,
            trial_end: row.trial_end,
            current_period_end: row.current_period_end,
            cancel_at_period_end: row.cancel_at_period_end,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UsageRow {
    pub feature_key: String,
    pub count: i64,
}

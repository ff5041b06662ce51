use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::{
    db::models::{Plan, PlanFeature, Subscription, UsageRow},
    gate::{
        store::{LedgerWrite, PlanCatalog, SubscriptionRecord, UsageLedger},
        types::{BillingPeriod, CapabilityLimit, Limit, SubscriptionSnapshot, UsageCounter},
    },
    utils::{config::PeriodPolicy, error::GateError},
};

pub struct Repository {
    pool: Arc<PgPool>,
    period_policy: PeriodPolicy,
}

impl Repository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            period_policy: PeriodPolicy::default(),
        }
    }

    pub fn with_period_policy(mut self, policy: PeriodPolicy) -> Self {
        self.period_policy = policy;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn upsert_plan(
        &self,
        plan_id: &str,
        name: &str,
        description: Option<String>,
    ) -> Result<Plan, GateError> {
        let plan = sqlx::query_as::<_, Plan>(
            r#"
            INSERT INTO plans (plan_id, name, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (plan_id) DO UPDATE
            SET name = EXCLUDED.name,
                description = COALESCE(EXCLUDED.description, plans.description),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(plan_id)
        .bind(name)
        .bind(description)
        .fetch_one(self.pool())
        .await?;

        Ok(plan)
    }

    pub async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>, GateError> {
        let plan = sqlx::query_as("SELECT * FROM plans WHERE plan_id = $1")
            .bind(plan_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(plan)
    }

    pub async fn list_plans(&self, limit: i64) -> Result<Vec<Plan>, GateError> {
        let plans = sqlx::query_as(
            "SELECT * FROM plans WHERE is_active = true ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(plans)
    }

    pub async fn list_plan_features(&self, plan_id: &str) -> Result<Vec<PlanFeature>, GateError> {
        let features = sqlx::query_as(
            r#"
            SELECT plan_id, feature_key, kind, enabled, limit_value, updated_at
            FROM plan_features
            WHERE plan_id = $1
            ORDER BY feature_key ASC
            "#,
        )
        .bind(plan_id)
        .fetch_all(self.pool())
        .await?;

        Ok(features)
    }

    pub async fn upsert_plan_feature(
        &self,
        plan_id: &str,
        capability: &CapabilityLimit,
    ) -> Result<PlanFeature, GateError> {
        let (kind, enabled, limit_value) = PlanFeature::columns(&capability.kind);

        let feature = sqlx::query_as::<_, PlanFeature>(
            r#"
            INSERT INTO plan_features (plan_id, feature_key, kind, enabled, limit_value)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (plan_id, feature_key) DO UPDATE
            SET kind = EXCLUDED.kind,
                enabled = EXCLUDED.enabled,
                limit_value = EXCLUDED.limit_value,
                updated_at = NOW()
            RETURNING plan_id, feature_key, kind, enabled, limit_value, updated_at
            "#,
        )
        .bind(plan_id)
        .bind(&capability.key)
        .bind(kind)
        .bind(enabled)
        .bind(limit_value)
        .fetch_one(self.pool())
        .await?;

        Ok(feature)
    }

    pub async fn remove_plan_feature(&self, plan_id: &str, key: &str) -> Result<bool, GateError> {
        let result = sqlx::query("DELETE FROM plan_features WHERE plan_id = $1 AND feature_key = $2")
            .bind(plan_id)
            .bind(key)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn upsert_subscription(
        &self,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<Subscription, GateError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions
            (subscriber_id, plan_id, status, trial_end, current_period_end, cancel_at_period_end)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (subscriber_id) DO UPDATE
            SET plan_id = EXCLUDED.plan_id,
                status = EXCLUDED.status,
                trial_end = EXCLUDED.trial_end,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&snapshot.subscriber_id)
        .bind(&snapshot.plan_id)
        .bind(snapshot.status)
        .bind(snapshot.trial_end)
        .bind(snapshot.current_period_end)
        .bind(snapshot.cancel_at_period_end)
        .fetch_one(self.pool())
        .await?;

        Ok(subscription)
    }

    async fn stored_count(
        &self,
        subscriber_id: &str,
        key: &str,
        period: &BillingPeriod,
    ) -> Result<u64, GateError> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT count FROM usage_counters
            WHERE subscriber_id = $1 AND feature_key = $2
              AND period_start = $3 AND period_end = $4
            "#,
        )
        .bind(subscriber_id)
        .bind(key)
        .bind(period.start)
        .bind(period.end)
        .fetch_optional(self.pool())
        .await?;

        Ok(count.map(count_to_u64).unwrap_or(0))
    }
}

fn count_to_u64(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

#[async_trait]
impl PlanCatalog for Repository {
    async fn plan_capabilities(&self, plan_id: &str) -> Result<Vec<CapabilityLimit>, GateError> {
        self.list_plan_features(plan_id)
            .await?
            .into_iter()
            .map(CapabilityLimit::try_from)
            .collect()
    }
}

#[async_trait]
impl UsageLedger for Repository {
    async fn period_usage(
        &self,
        subscriber_id: &str,
        period: &BillingPeriod,
    ) -> Result<Vec<UsageCounter>, GateError> {
        let rows = sqlx::query_as::<_, UsageRow>(
            r#"
            SELECT feature_key, count FROM usage_counters
            WHERE subscriber_id = $1 AND period_start = $2 AND period_end = $3
            "#,
        )
        .bind(subscriber_id)
        .bind(period.start)
        .bind(period.end)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| UsageCounter {
                key: row.feature_key,
                count: count_to_u64(row.count),
            })
            .collect())
    }

    async fn increment(
        &self,
        subscriber_id: &str,
        key: &str,
        period: &BillingPeriod,
        delta: u64,
        limit: Limit,
    ) -> Result<LedgerWrite, GateError> {
        let delta = i64::try_from(delta)
            .map_err(|_| GateError::Other(format!("usage delta {} out of range", delta)))?;
        let limit = limit
            .bounded()
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX));

        // Guarded on both the insert and the conflict branch, so the limit
        // check and the add happen under the row lock.
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO usage_counters
            (subscriber_id, feature_key, period_start, period_end, count)
            SELECT $1, $2, $3, $4, $5::BIGINT
            WHERE $6::BIGINT IS NULL OR $5::BIGINT <= $6::BIGINT
            ON CONFLICT (subscriber_id, feature_key, period_start, period_end) DO UPDATE
            SET count = usage_counters.count + EXCLUDED.count, updated_at = NOW()
            WHERE $6::BIGINT IS NULL OR usage_counters.count + EXCLUDED.count <= $6::BIGINT
            RETURNING count
            "#,
        )
        .bind(subscriber_id)
        .bind(key)
        .bind(period.start)
        .bind(period.end)
        .bind(delta)
        .bind(limit)
        .fetch_optional(self.pool())
        .await?;

        match total {
            Some(total) => Ok(LedgerWrite::Applied {
                total: count_to_u64(total),
            }),
            None => {
                let current = self.stored_count(subscriber_id, key, period).await?;
                debug!(
                    subscriber = %subscriber_id,
                    key = %key,
                    current,
                    "Usage increment rejected by limit"
                );
                Ok(LedgerWrite::Rejected { total: current })
            }
        }
    }
}

#[async_trait]
impl SubscriptionRecord for Repository {
    async fn subscription(
        &self,
        subscriber_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, GateError> {
        let row: Option<Subscription> =
            sqlx::query_as("SELECT * FROM subscriptions WHERE subscriber_id = $1")
                .bind(subscriber_id)
                .fetch_optional(self.pool())
                .await?;

        Ok(row.map(SubscriptionSnapshot::from))
    }

    fn current_period(
        &self,
        snapshot: Option<&SubscriptionSnapshot>,
        now: DateTime<Utc>,
    ) -> BillingPeriod {
        resolve_period(self.period_policy, snapshot, now)
    }
}

pub fn resolve_period(
    policy: PeriodPolicy,
    snapshot: Option<&SubscriptionSnapshot>,
    now: DateTime<Utc>,
) -> BillingPeriod {
    match (policy, snapshot.and_then(|s| s.current_period_end)) {
        (PeriodPolicy::Anniversary, Some(period_end)) => BillingPeriod::ending_at(period_end),
        _ => BillingPeriod::calendar_month(now),
    }
}

use async_trait::async_trait;
use redis::{Client as RedisClient, aio::MultiplexedConnection};
use std::collections::HashMap;
use tracing::debug;

use crate::{
    gate::{
        store::{LedgerWrite, UsageLedger},
        types::{BillingPeriod, Limit, UsageCounter},
    },
    utils::{
        constants::{LUA_CONDITIONAL_INCREMENT, USAGE_RETENTION_SECS},
        error::GateError,
    },
};

/// Usage ledger kept in one redis hash per subscriber and period, with the
/// capability keys as fields.
pub struct RedisUsageLedger {
    redis: MultiplexedConnection,
    script: redis::Script,
}

impl RedisUsageLedger {
    pub async fn new(redis_client: &RedisClient) -> Result<Self, GateError> {
        let redis = redis_client.get_multiplexed_async_connection().await?;
        Ok(Self {
            redis,
            script: redis::Script::new(LUA_CONDITIONAL_INCREMENT),
        })
    }

    fn usage_key(&self, subscriber_id: &str, period: &BillingPeriod) -> String {
        usage_key(subscriber_id, period)
    }
}

pub fn usage_key(subscriber_id: &str, period: &BillingPeriod) -> String {
    format!("usage:{}:{}:{}", subscriber_id, period.start, period.end)
}

/// Unix seconds at which a period's hash may be dropped.
pub fn expire_at(period: &BillingPeriod) -> i64 {
    period
        .end
        .succ_opt()
        .unwrap_or(period.end)
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
        + USAGE_RETENTION_SECS
}

#[async_trait]
impl UsageLedger for RedisUsageLedger {
    async fn period_usage(
        &self,
        subscriber_id: &str,
        period: &BillingPeriod,
    ) -> Result<Vec<UsageCounter>, GateError> {
        let mut conn = self.redis.clone();
        let fields: HashMap<String, i64> = redis::cmd("HGETALL")
            .arg(self.usage_key(subscriber_id, period))
            .query_async(&mut conn)
            .await?;

        Ok(fields
            .into_iter()
            .map(|(key, count)| UsageCounter {
                key,
                count: u64::try_from(count).unwrap_or(0),
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
        let mut conn = self.redis.clone();
        let limit_arg: i64 = match limit {
            Limit::Bounded(n) => i64::try_from(n).unwrap_or(i64::MAX),
            Limit::Unlimited => -1,
        };

        let (applied, total): (i64, i64) = self
            .script
            .key(self.usage_key(subscriber_id, period))
            .arg(key)
            .arg(delta)
            .arg(limit_arg)
            .arg(expire_at(period))
            .invoke_async(&mut conn)
            .await?;

        let total = u64::try_from(total).unwrap_or(0);
        if applied == 1 {
            Ok(LedgerWrite::Applied { total })
        } else {
            debug!(subscriber = %subscriber_id, key = %key, total, "Usage increment rejected by limit");
            Ok(LedgerWrite::Rejected { total })
        }
    }
}

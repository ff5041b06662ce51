//! In-process store implementing every gate collaborator.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    gate::{
        store::{LedgerWrite, PlanCatalog, SubscriptionRecord, UsageLedger},
        types::{BillingPeriod, CapabilityLimit, Limit, SubscriptionSnapshot, UsageCounter},
    },
    utils::error::GateError,
};

type UsageKey = (String, String, BillingPeriod);

#[derive(Default)]
pub struct MemoryStore {
    plans: Mutex<HashMap<String, Vec<CapabilityLimit>>>,
    subscriptions: Mutex<HashMap<String, SubscriptionSnapshot>>,
    usage: Mutex<HashMap<UsageKey, u64>>,
    period: Mutex<Option<BillingPeriod>>,
    ledger_writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_plan(&self, plan_id: &str, capabilities: Vec<CapabilityLimit>) {
        self.plans
            .lock()
            .unwrap()
            .insert(plan_id.to_string(), capabilities);
    }

    pub fn set_subscription(&self, snapshot: SubscriptionSnapshot) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(snapshot.subscriber_id.clone(), snapshot);
    }

    pub fn set_usage(&self, subscriber_id: &str, key: &str, period: BillingPeriod, count: u64) {
        self.usage
            .lock()
            .unwrap()
            .insert((subscriber_id.to_string(), key.to_string(), period), count);
    }

    pub fn stored_usage(&self, subscriber_id: &str, key: &str, period: BillingPeriod) -> u64 {
        self.usage
            .lock()
            .unwrap()
            .get(&(subscriber_id.to_string(), key.to_string(), period))
            .copied()
            .unwrap_or(0)
    }

    /// Pins the billing period instead of deriving it from the clock.
    pub fn set_period(&self, period: BillingPeriod) {
        *self.period.lock().unwrap() = Some(period);
    }

    /// Number of increment calls that reached the ledger, applied or not.
    pub fn ledger_writes(&self) -> usize {
        self.ledger_writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<(), GateError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GateError::Other("memory store read failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PlanCatalog for MemoryStore {
    async fn plan_capabilities(&self, plan_id: &str) -> Result<Vec<CapabilityLimit>, GateError> {
        self.check_reads()?;
        Ok(self
            .plans
            .lock()
            .unwrap()
            .get(plan_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl UsageLedger for MemoryStore {
    async fn period_usage(
        &self,
        subscriber_id: &str,
        period: &BillingPeriod,
    ) -> Result<Vec<UsageCounter>, GateError> {
        self.check_reads()?;
        Ok(self
            .usage
            .lock()
            .unwrap()
            .iter()
            .filter(|((sub, _, p), _)| sub == subscriber_id && p == period)
            .map(|((_, key, _), count)| UsageCounter {
                key: key.clone(),
                count: *count,
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
        self.ledger_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GateError::Other("memory store write failure".into()));
        }

        let mut usage = self.usage.lock().unwrap();
        let count = usage
            .entry((subscriber_id.to_string(), key.to_string(), *period))
            .or_insert(0);
        let total = count.saturating_add(delta);

        match limit {
            Limit::Bounded(max) if total > max => Ok(LedgerWrite::Rejected { total: *count }),
            _ => {
                *count = total;
                Ok(LedgerWrite::Applied { total })
            }
        }
    }
}

#[async_trait]
impl SubscriptionRecord for MemoryStore {
    async fn subscription(
        &self,
        subscriber_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, GateError> {
        self.check_reads()?;
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .get(subscriber_id)
            .cloned())
    }

    fn current_period(
        &self,
        _snapshot: Option<&SubscriptionSnapshot>,
        now: DateTime<Utc>,
    ) -> BillingPeriod {
        self.period
            .lock()
            .unwrap()
            .unwrap_or_else(|| BillingPeriod::calendar_month(now))
    }
}

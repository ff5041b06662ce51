//! Collaborator contracts the gate reads from and writes to.
//!
//! Implementations live in `db` (Postgres), `adapters` (Redis ledger, plan
//! cache) and `gate::memory` (in-process, for tests and local tooling).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    gate::types::{BillingPeriod, CapabilityLimit, Limit, SubscriptionSnapshot, UsageCounter},
    utils::error::GateError,
};

/// Result of a conditional ledger increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerWrite {
    /// The delta was added; `total` is the stored count afterwards.
    Applied { total: u64 },
    /// Adding the delta would have passed the limit. Nothing was written;
    /// `total` is the stored count at the time of the check.
    Rejected { total: u64 },
}

#[async_trait]
pub trait PlanCatalog: Send + Sync {
    async fn plan_capabilities(&self, plan_id: &str) -> Result<Vec<CapabilityLimit>, GateError>;
}

#[async_trait]
pub trait UsageLedger: Send + Sync {
    async fn period_usage(
        &self,
        subscriber_id: &str,
        period: &BillingPeriod,
    ) -> Result<Vec<UsageCounter>, GateError>;

    /// Adds `delta` to the counter for this exact (subscriber, key, period)
    /// tuple, creating it when absent, but only if the resulting total stays
    /// within `limit`. Check and write must happen in one atomic step.
    async fn increment(
        &self,
        subscriber_id: &str,
        key: &str,
        period: &BillingPeriod,
        delta: u64,
        limit: Limit,
    ) -> Result<LedgerWrite, GateError>;
}

#[async_trait]
pub trait SubscriptionRecord: Send + Sync {
    async fn subscription(
        &self,
        subscriber_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, GateError>;

    /// The billing period usage is counted against. Calendar month unless the
    /// record knows better.
    fn current_period(
        &self,
        _snapshot: Option<&SubscriptionSnapshot>,
        now: DateTime<Utc>,
    ) -> BillingPeriod {
        BillingPeriod::calendar_month(now)
    }
}

/// The three collaborators a gate is built from.
#[derive(Clone)]
pub struct GateSources {
    pub catalog: Arc<dyn PlanCatalog>,
    pub ledger: Arc<dyn UsageLedger>,
    pub subscriptions: Arc<dyn SubscriptionRecord>,
}

impl GateSources {
    pub fn new(
        catalog: Arc<dyn PlanCatalog>,
        ledger: Arc<dyn UsageLedger>,
        subscriptions: Arc<dyn SubscriptionRecord>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            subscriptions,
        }
    }

    /// Uses one store for all three roles.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: PlanCatalog + UsageLedger + SubscriptionRecord + 'static,
    {
        Self {
            catalog: store.clone(),
            ledger: store.clone(),
            subscriptions: store,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn PlanCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn UsageLedger>) -> Self {
        self.ledger = ledger;
        self
    }
}

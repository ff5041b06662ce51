use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    gate::{
        store::{GateSources, LedgerWrite, UsageLedger},
        types::{BillingPeriod, CapabilityKind, Limit, SubscriptionSnapshot, SubscriptionStatus},
    },
    utils::error::GateError,
};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Outcome of a usage increment, with the usage the gate holds afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UsageOutcome {
    Applied { usage: u64 },
    /// Refused before reaching the ledger: zero amount, undeclared or flag
    /// capability, or quota already used up.
    Denied { usage: u64 },
    /// The ledger refused the write because the total would pass the limit.
    LedgerRejected { usage: u64 },
}

impl UsageOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UsageOutcome::Applied { .. })
    }

    pub fn usage(&self) -> u64 {
        match self {
            UsageOutcome::Applied { usage }
            | UsageOutcome::Denied { usage }
            | UsageOutcome::LedgerRejected { usage } => *usage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityReport {
    pub key: String,
    pub declared: Option<CapabilityKind>,
    pub has_capability: bool,
    pub can_consume: bool,
    pub limit: Limit,
    pub usage: u64,
    pub remaining: Limit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitlementSummary {
    pub subscriber_id: String,
    pub plan_id: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub is_active: bool,
    pub is_trialing: bool,
    pub trial_days_remaining: u64,
    pub cancel_at_period_end: bool,
    pub period: BillingPeriod,
    pub capabilities: BTreeMap<String, CapabilityReport>,
}

/// Entitlement answers for one subscriber, computed over data loaded once at
/// construction. Build a new gate to observe plan or status changes.
pub struct FeatureGate {
    subscriber_id: String,
    snapshot: Option<SubscriptionSnapshot>,
    limits: HashMap<String, CapabilityKind>,
    usage: HashMap<String, u64>,
    period: BillingPeriod,
    ledger: Arc<dyn UsageLedger>,
}

impl std::fmt::Debug for FeatureGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureGate")
            .field("subscriber_id", &self.subscriber_id)
            .field("snapshot", &self.snapshot)
            .field("limits", &self.limits)
            .field("usage", &self.usage)
            .field("period", &self.period)
            .finish()
    }
}

impl FeatureGate {
    /// Loads the subscription, plan capabilities and period usage for
    /// `subscriber_id`. A missing subscription yields a gate that grants
    /// nothing; any read failure fails the whole load.
    #[instrument(skip(sources), fields(subscriber = %subscriber_id))]
    pub async fn load(
        sources: &GateSources,
        subscriber_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, GateError> {
        let snapshot = sources.subscriptions.subscription(subscriber_id).await?;
        let period = sources
            .subscriptions
            .current_period(snapshot.as_ref(), now);

        let Some(snapshot) = snapshot else {
            debug!(%period, "No subscription on record, loading empty gate");
            return Ok(Self::empty(subscriber_id, period, sources.ledger.clone()));
        };

        let capabilities = sources.catalog.plan_capabilities(&snapshot.plan_id).await?;
        let counters = sources.ledger.period_usage(subscriber_id, &period).await?;

        let limits: HashMap<String, CapabilityKind> = capabilities
            .into_iter()
            .map(|cap| (cap.key, cap.kind))
            .collect();

        let mut usage: HashMap<String, u64> = HashMap::new();
        for counter in counters {
            let entry = usage.entry(counter.key).or_insert(0);
            *entry = entry.saturating_add(counter.count);
        }

        debug!(
            plan = %snapshot.plan_id,
            status = %snapshot.status,
            %period,
            capabilities = limits.len(),
            counters = usage.len(),
            "Feature gate loaded"
        );

        Ok(Self {
            subscriber_id: subscriber_id.to_string(),
            snapshot: Some(snapshot),
            limits,
            usage,
            period,
            ledger: sources.ledger.clone(),
        })
    }

    fn empty(subscriber_id: &str, period: BillingPeriod, ledger: Arc<dyn UsageLedger>) -> Self {
        Self {
            subscriber_id: subscriber_id.to_string(),
            snapshot: None,
            limits: HashMap::new(),
            usage: HashMap::new(),
            period,
            ledger,
        }
    }

    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }

    pub fn snapshot(&self) -> Option<&SubscriptionSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn plan_id(&self) -> Option<&str> {
        self.snapshot.as_ref().map(|s| s.plan_id.as_str())
    }

    pub fn status(&self) -> Option<SubscriptionStatus> {
        self.snapshot.as_ref().map(|s| s.status)
    }

    pub fn period(&self) -> BillingPeriod {
        self.period
    }

    pub fn declared(&self, key: &str) -> Option<CapabilityKind> {
        self.limits.get(key).copied()
    }

    /// True only for flag capabilities set to true. Metered capabilities never
    /// count as flags.
    pub fn has_capability(&self, key: &str) -> bool {
        matches!(self.limits.get(key), Some(CapabilityKind::Flag(true)))
    }

    pub fn can_consume(&self, key: &str) -> bool {
        match self.limits.get(key) {
            Some(CapabilityKind::Unlimited) => true,
            Some(CapabilityKind::Bounded(limit)) => self.usage(key) < *limit,
            _ => false,
        }
    }

    pub fn remaining(&self, key: &str) -> Limit {
        match self.limit(key) {
            Limit::Unlimited => Limit::Unlimited,
            Limit::Bounded(limit) => Limit::Bounded(limit.saturating_sub(self.usage(key))),
        }
    }

    pub fn usage(&self, key: &str) -> u64 {
        self.usage.get(key).copied().unwrap_or(0)
    }

    pub fn limit(&self, key: &str) -> Limit {
        match self.limits.get(key) {
            Some(CapabilityKind::Unlimited) => Limit::Unlimited,
            Some(CapabilityKind::Bounded(limit)) => Limit::Bounded(*limit),
            _ => Limit::Bounded(0),
        }
    }

    pub fn is_trialing(&self) -> bool {
        self.status() == Some(SubscriptionStatus::Trialing)
    }

    pub fn trial_days_remaining(&self) -> u64 {
        self.trial_days_remaining_at(Utc::now())
    }

    /// Whole days left in the trial, rounded up, never below zero.
    pub fn trial_days_remaining_at(&self, now: DateTime<Utc>) -> u64 {
        if !self.is_trialing() {
            return 0;
        }
        let Some(trial_end) = self.snapshot.as_ref().and_then(|s| s.trial_end) else {
            return 0;
        };

        let left_ms = (trial_end - now).num_milliseconds();
        if left_ms <= 0 {
            return 0;
        }
        (left_ms as u64).div_ceil(DAY_MS as u64)
    }

    pub fn is_active(&self) -> bool {
        self.status().is_some_and(|s| s.is_entitled())
    }

    pub fn will_cancel_at_period_end(&self) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|s| s.cancel_at_period_end)
    }

    /// Records `amount` units of use. Returns false when the capability cannot
    /// be consumed, the ledger refuses the write, or the write fails. The
    /// cached usage only moves when the ledger reports a total.
    pub async fn increment_usage(&mut self, key: &str, amount: u64) -> bool {
        matches!(
            self.try_increment_usage(key, amount).await,
            Ok(UsageOutcome::Applied { .. })
        )
    }

    pub async fn try_increment_usage(
        &mut self,
        key: &str,
        amount: u64,
    ) -> Result<UsageOutcome, GateError> {
        if amount == 0 || !self.can_consume(key) {
            return Ok(UsageOutcome::Denied {
                usage: self.usage(key),
            });
        }

        let write = self
            .ledger
            .increment(
                &self.subscriber_id,
                key,
                &self.period,
                amount,
                self.limit(key),
            )
            .await?;

        match write {
            LedgerWrite::Applied { total } => {
                self.usage.insert(key.to_string(), total);
                Ok(UsageOutcome::Applied { usage: total })
            }
            LedgerWrite::Rejected { total } => {
                self.usage.insert(key.to_string(), total);
                Ok(UsageOutcome::LedgerRejected { usage: total })
            }
        }
    }

    pub fn report(&self, key: &str) -> CapabilityReport {
        CapabilityReport {
            key: key.to_string(),
            declared: self.declared(key),
            has_capability: self.has_capability(key),
            can_consume: self.can_consume(key),
            limit: self.limit(key),
            usage: self.usage(key),
            remaining: self.remaining(key),
        }
    }

    pub fn summary_at(&self, now: DateTime<Utc>) -> EntitlementSummary {
        EntitlementSummary {
            subscriber_id: self.subscriber_id.clone(),
            plan_id: self.plan_id().map(str::to_string),
            status: self.status(),
            is_active: self.is_active(),
            is_trialing: self.is_trialing(),
            trial_days_remaining: self.trial_days_remaining_at(now),
            cancel_at_period_end: self.will_cancel_at_period_end(),
            period: self.period,
            capabilities: self
                .limits
                .keys()
                .map(|key| (key.clone(), self.report(key)))
                .collect(),
        }
    }

    pub fn summary(&self) -> EntitlementSummary {
        self.summary_at(Utc::now())
    }
}

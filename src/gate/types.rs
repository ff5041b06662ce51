use std::fmt;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;

/// Declared entitlement for one capability key under one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CapabilityKind {
    Flag(bool),
    Bounded(u64),
    Unlimited,
}

impl CapabilityKind {
    pub fn is_metered(&self) -> bool {
        !matches!(self, CapabilityKind::Flag(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityLimit {
    pub key: String,
    pub kind: CapabilityKind,
}

impl CapabilityLimit {
    pub fn flag(key: impl Into<String>, enabled: bool) -> Self {
        Self {
            key: key.into(),
            kind: CapabilityKind::Flag(enabled),
        }
    }

    pub fn bounded(key: impl Into<String>, limit: u64) -> Self {
        Self {
            key: key.into(),
            kind: CapabilityKind::Bounded(limit),
        }
    }

    pub fn unlimited(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: CapabilityKind::Unlimited,
        }
    }
}

/// A ceiling or a remaining allowance. `Unlimited` serialises as the string
/// `"unlimited"`, bounded values as plain numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Bounded(u64),
    Unlimited,
}

impl Limit {
    pub fn bounded(&self) -> Option<u64> {
        match self {
            Limit::Bounded(n) => Some(*n),
            Limit::Unlimited => None,
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Bounded(n) => write!(f, "{}", n),
            Limit::Unlimited => write!(f, "unlimited"),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Limit::Bounded(n) => serializer.serialize_u64(*n),
            Limit::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Limit::Bounded(n)),
            Raw::Text(s) if s == "unlimited" => Ok(Limit::Unlimited),
            Raw::Text(s) => Err(serde::de::Error::custom(format!(
                "expected a number or \"unlimited\", got {:?}",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub key: String,
    pub count: u64,
}

/// Lifecycle status as written by the billing side. The gate only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    pub fn is_entitled(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "unpaid" => Ok(SubscriptionStatus::Unpaid),
            "paused" => Ok(SubscriptionStatus::Paused),
            other => Err(format!("unknown subscription status: {}", other)),
        }
    }
}

/// Point-in-time view of a subscriber's plan and lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub subscriber_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub trial_end: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

/// Window over which metered usage accumulates. Both ends are inclusive
/// calendar dates and together form the usage counter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BillingPeriod {
    /// First through last day of the calendar month containing `now`.
    pub fn calendar_month(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let start = today.with_day(1).unwrap_or(today);
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(start);
        Self { start, end }
    }

    /// The month-long window ending on `period_end`, for subscribers billed on
    /// their own anniversary rather than the calendar month.
    pub fn ending_at(period_end: DateTime<Utc>) -> Self {
        let end = period_end.date_naive();
        let start = end
            .checked_sub_months(Months::new(1))
            .and_then(|prev| prev.succ_opt())
            .unwrap_or(end);
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn calendar_month_covers_whole_month() {
        let now = Utc.with_ymd_and_hms(2024, 2, 14, 12, 0, 0).unwrap();
        let period = BillingPeriod::calendar_month(now);
        assert_eq!(period.start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(period.end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn calendar_month_handles_december() {
        let now = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let period = BillingPeriod::calendar_month(now);
        assert_eq!(period.start, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(period.end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn anniversary_period_ends_on_period_end() {
        let end = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let period = BillingPeriod::ending_at(end);
        assert_eq!(period.start, NaiveDate::from_ymd_opt(2024, 2, 16).unwrap());
        assert_eq!(period.end, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert!(period.contains(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
        assert!(!period.contains(NaiveDate::from_ymd_opt(2024, 3, 16).unwrap()));
    }

    #[test]
    fn limit_serialises_as_number_or_unlimited() {
        assert_eq!(serde_json::to_string(&Limit::Bounded(7)).unwrap(), "7");
        assert_eq!(
            serde_json::to_string(&Limit::Unlimited).unwrap(),
            "\"unlimited\""
        );
        let parsed: Limit = serde_json::from_str("\"unlimited\"").unwrap();
        assert_eq!(parsed, Limit::Unlimited);
        assert!(serde_json::from_str::<Limit>("\"lots\"").is_err());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Paused,
        ] {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>(), Ok(status));
        }
        assert!("expired".parse::<SubscriptionStatus>().is_err());
    }
}

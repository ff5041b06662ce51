pub mod evaluator;
pub mod memory;
pub mod registry;
pub mod store;
pub mod types;

pub use evaluator::{CapabilityReport, EntitlementSummary, FeatureGate, UsageOutcome};
pub use store::{GateSources, LedgerWrite, PlanCatalog, SubscriptionRecord, UsageLedger};
pub use types::{
    BillingPeriod, CapabilityKind, CapabilityLimit, Limit, SubscriptionSnapshot,
    SubscriptionStatus, UsageCounter,
};

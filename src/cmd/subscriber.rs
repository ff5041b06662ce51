use anyhow::{Ok, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use tracing::info;

use crate::{
    cmd::CliContext,
    gate::{
        evaluator::{FeatureGate, UsageOutcome},
        types::{SubscriptionSnapshot, SubscriptionStatus},
    },
};

#[derive(Subcommand)]
pub enum SubscriberCommands {
    /// Create or update a subscriber's subscription record
    Set {
        /// Subscriber ID
        subscriber_id: String,

        /// Plan ID
        #[arg(short, long)]
        plan: String,

        /// trialing, active, past_due, canceled, unpaid or paused
        #[arg(short, long, default_value = "active")]
        status: SubscriptionStatus,

        /// Trial end (RFC 3339)
        #[arg(long)]
        trial_end: Option<DateTime<Utc>>,

        /// Current period end (RFC 3339)
        #[arg(long)]
        period_end: Option<DateTime<Utc>>,

        /// Cancel when the current period ends
        #[arg(long)]
        cancel_at_period_end: bool,
    },

    /// Show everything a subscriber is entitled to
    Inspect {
        /// Subscriber ID
        subscriber_id: String,
    },

    /// Check a single capability
    Check {
        /// Subscriber ID
        subscriber_id: String,

        /// Capability key
        key: String,
    },

    /// Record usage of a metered capability
    Consume {
        /// Subscriber ID
        subscriber_id: String,

        /// Capability key
        key: String,

        #[arg(short, long, default_value_t = 1)]
        amount: u64,
    },
}

impl SubscriberCommands {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            SubscriberCommands::Set {
                subscriber_id,
                plan,
                status,
                trial_end,
                period_end,
                cancel_at_period_end,
            } => {
                let snapshot = SubscriptionSnapshot {
                    subscriber_id: subscriber_id.clone(),
                    plan_id: plan.clone(),
                    status: *status,
                    trial_end: *trial_end,
                    current_period_end: *period_end,
                    cancel_at_period_end: *cancel_at_period_end,
                };
                ctx.repo.upsert_subscription(&snapshot).await?;
                info!(subscriber = %subscriber_id, plan = %plan, status = %status, "Subscription saved");
                Ok(())
            }

            SubscriberCommands::Inspect { subscriber_id } => {
                let gate = FeatureGate::load(&ctx.sources(), subscriber_id, Utc::now()).await?;
                let summary = gate.summary();
                println!("{}", serde_json::to_string_pretty(&summary)?);
                Ok(())
            }

            SubscriberCommands::Check { subscriber_id, key } => {
                let gate = FeatureGate::load(&ctx.sources(), subscriber_id, Utc::now()).await?;
                println!("{}", serde_json::to_string_pretty(&gate.report(key))?);
                Ok(())
            }

            SubscriberCommands::Consume {
                subscriber_id,
                key,
                amount,
            } => {
                let mut gate =
                    FeatureGate::load(&ctx.sources(), subscriber_id, Utc::now()).await?;

                match gate.try_increment_usage(key, *amount).await? {
                    UsageOutcome::Applied { usage } => {
                        info!(
                            subscriber = %subscriber_id,
                            key = %key,
                            usage,
                            remaining = %gate.remaining(key),
                            "Usage recorded"
                        );
                        Ok(())
                    }
                    UsageOutcome::Denied { usage } | UsageOutcome::LedgerRejected { usage } => {
                        anyhow::bail!(
                            "{} cannot consume {} x{} (used {}, limit {})",
                            subscriber_id,
                            key,
                            amount,
                            usage,
                            gate.limit(key)
                        )
                    }
                }
            }
        }
    }
}

use anyhow::{Ok, Result};
use clap::{ArgAction, Subcommand};
use tracing::info;

use crate::{
    cmd::CliContext,
    gate::{
        store::PlanCatalog,
        types::{CapabilityKind, CapabilityLimit},
    },
};

#[derive(Subcommand)]
pub enum PlanCommands {
    /// List active plans
    List {
        /// Max plans to show
        #[arg(short, long, default_value_t = 50)]
        limit: i64,
    },

    /// Show a plan's capabilities
    Show {
        /// Plan ID
        plan_id: String,
    },

    /// Create or rename a plan
    Create {
        /// Plan ID
        plan_id: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Declare a flag capability
    SetFlag {
        /// Plan ID
        plan_id: String,

        /// Capability key
        key: String,

        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        enabled: bool,
    },

    /// Declare a metered capability with a per-period ceiling
    SetLimit {
        /// Plan ID
        plan_id: String,

        /// Capability key
        key: String,

        /// Units allowed per billing period
        limit: u64,
    },

    /// Declare a metered capability with no ceiling
    SetUnlimited {
        /// Plan ID
        plan_id: String,

        /// Capability key
        key: String,
    },

    /// Remove a capability from a plan
    Remove {
        /// Plan ID
        plan_id: String,

        /// Capability key
        key: String,
    },
}

impl PlanCommands {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            PlanCommands::List { limit } => {
                for plan in ctx.repo.list_plans(*limit).await? {
                    println!("{:<20} {}", plan.plan_id, plan.name);
                }
                Ok(())
            }

            PlanCommands::Show { plan_id } => {
                let plan = ctx
                    .repo
                    .get_plan(plan_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Plan {} not found", plan_id))?;
                let capabilities = ctx.repo.plan_capabilities(plan_id).await?;

                println!("{} ({})", plan.name, plan.plan_id);
                for cap in &capabilities {
                    println!("  {:<24} {}", cap.key, describe(&cap.kind));
                }

                for issue in ctx.registry.issues(&capabilities) {
                    println!("  warning: {}", issue);
                }
                Ok(())
            }

            PlanCommands::Create {
                plan_id,
                name,
                description,
            } => {
                let plan = ctx
                    .repo
                    .upsert_plan(plan_id, name, description.clone())
                    .await?;
                info!(plan = %plan.plan_id, "Plan saved");
                Ok(())
            }

            PlanCommands::SetFlag {
                plan_id,
                key,
                enabled,
            } => set_capability(ctx, plan_id, CapabilityLimit::flag(key, *enabled)).await,

            PlanCommands::SetLimit {
                plan_id,
                key,
                limit,
            } => set_capability(ctx, plan_id, CapabilityLimit::bounded(key, *limit)).await,

            PlanCommands::SetUnlimited { plan_id, key } => {
                set_capability(ctx, plan_id, CapabilityLimit::unlimited(key)).await
            }

            PlanCommands::Remove { plan_id, key } => {
                if ctx.repo.remove_plan_feature(plan_id, key).await? {
                    info!(plan = %plan_id, key = %key, "Capability removed");
                    ctx.announce_plan_change(plan_id).await?;
                } else {
                    info!(plan = %plan_id, key = %key, "Capability was not declared");
                }
                Ok(())
            }
        }
    }
}

async fn set_capability(ctx: &CliContext, plan_id: &str, capability: CapabilityLimit) -> Result<()> {
    let issues = ctx.registry.issues(std::slice::from_ref(&capability));
    for issue in &issues {
        println!("warning: {}", issue);
    }
    if ctx.registry.is_strict() && !issues.is_empty() {
        anyhow::bail!(
            "Refusing to save {}: servers with strict capability keys would reject plan {}",
            capability.key,
            plan_id
        );
    }

    ctx.repo.upsert_plan_feature(plan_id, &capability).await?;
    info!(
        plan = %plan_id,
        key = %capability.key,
        kind = %describe(&capability.kind),
        "Capability saved"
    );

    ctx.announce_plan_change(plan_id).await
}

pub fn describe(kind: &CapabilityKind) -> String {
    match kind {
        CapabilityKind::Flag(true) => "enabled".to_string(),
        CapabilityKind::Flag(false) => "disabled".to_string(),
        CapabilityKind::Bounded(limit) => format!("{} per period", limit),
        CapabilityKind::Unlimited => "unlimited".to_string(),
    }
}

pub mod plan;
pub mod subscriber;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use redis::Client as RedisClient;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::{
    adapters::usage_ledger,
    cmd::{plan::PlanCommands, subscriber::SubscriberCommands},
    db::repository::Repository,
    gate::{
        registry::CapabilityRegistry,
        store::{GateSources, UsageLedger},
    },
    pubsub::{publisher::PlanPublisher, types::PlanEvent},
    utils::config::CliConfig,
};

#[derive(Parser)]
#[command(name = "featuregate")]
#[command(about = "Inspect and manage plan entitlements", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Postgres connection url
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Redis url, used to announce plan changes to running servers
    #[arg(long, global = true, env = "REDIS_URL")]
    pub redis_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply database migrations
    Migrate,

    /// Plan catalog commands
    #[command(subcommand)]
    Plan(PlanCommands),

    /// Subscriber and usage commands
    #[command(subcommand)]
    Subscriber(SubscriberCommands),
}

pub struct CliContext {
    pub repo: Arc<Repository>,
    pub ledger: Arc<dyn UsageLedger>,
    pub registry: CapabilityRegistry,
    pub publisher: Option<PlanPublisher>,
}

impl CliContext {
    /// Wires the same period policy, ledger and key registry the server uses
    /// for this environment.
    pub async fn connect(
        cfg: &CliConfig,
        pool: Arc<PgPool>,
        redis_client: Option<&RedisClient>,
    ) -> Result<Self> {
        let repo = Arc::new(Repository::new(pool).with_period_policy(cfg.period_policy));
        let ledger = usage_ledger(cfg.ledger_backend, redis_client, repo.clone()).await?;
        debug!(
            ledger = ?cfg.ledger_backend,
            period_policy = ?cfg.period_policy,
            "CLI store wired"
        );

        Ok(Self {
            repo,
            ledger,
            registry: cfg.registry()?,
            publisher: None,
        })
    }

    pub fn with_publisher(mut self, publisher: PlanPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// The CLI reads plans straight from Postgres, without the plan cache.
    pub fn sources(&self) -> GateSources {
        GateSources::from_store(self.repo.clone()).with_ledger(self.ledger.clone())
    }

    pub async fn announce_plan_change(&self, plan_id: &str) -> Result<()> {
        match &self.publisher {
            Some(publisher) => publisher.publish(&PlanEvent::invalidate(plan_id)).await?,
            None => warn!(
                plan = %plan_id,
                "REDIS_URL not set, running servers keep the old plan until their cache expires"
            ),
        }
        Ok(())
    }
}

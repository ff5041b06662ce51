use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use featuregate::{
    cmd::{Cli, CliContext, Commands},
    db::{create_pool, run_migrations},
    pubsub::publisher::PlanPublisher,
    utils::{config::CliConfig, logs_fmt::UptimeSeconds},
};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_timer(UptimeSeconds)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut cfg = CliConfig::load()?;
    if cli.database_url.is_some() {
        cfg.database_url = cli.database_url.clone();
    }
    if cli.redis_url.is_some() {
        cfg.redis_url = cli.redis_url.clone();
    }
    cfg.validate()?;

    let database_url = cfg
        .database_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL or --database-url must be set"))?;

    let pool = Arc::new(create_pool(&database_url, &cfg.pool_settings()).await?);

    if let Commands::Migrate = cli.command {
        run_migrations(&pool).await?;
        return Ok(());
    }

    let redis_client = match &cfg.redis_url {
        Some(url) => Some(redis::Client::open(url.as_str())?),
        None => None,
    };

    let mut ctx = CliContext::connect(&cfg, pool, redis_client.as_ref()).await?;
    if let Some(client) = &redis_client {
        info!("Plan changes will be announced over redis");
        ctx = ctx.with_publisher(PlanPublisher::new(client).await?);
    }

    match cli.command {
        Commands::Migrate => {}
        Commands::Plan(cmd) => cmd.execute(&ctx).await?,
        Commands::Subscriber(cmd) => cmd.execute(&ctx).await?,
    }

    Ok(())
}

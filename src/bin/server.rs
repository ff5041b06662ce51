use std::{sync::Arc, time::Duration};

use anyhow::Result;
use featuregate::{
    adapters::{cache::PlanCache, usage_ledger},
    backend::{router::build_router, state::AppState},
    db::{create_pool, repository::Repository, run_migrations},
    gate::store::GateSources,
    pubsub::subscriber::PlanSubscriber,
    utils::config::GateConfig,
};
use tokio::signal;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_level(true);

    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,featuregate=debug,tower_http=warn".into()),
    );

    if json_logs {
        registry.with(fmt_layer.json()).init();
    } else {
        registry.with(fmt_layer).init();
    }

    let cfg = GateConfig::load()?;
    info!(
        port = cfg.port,
        ledger = ?cfg.ledger_backend,
        period_policy = ?cfg.period_policy,
        strict_keys = cfg.strict_capability_keys,
        "Featuregate starting"
    );

    let pool = Arc::new(create_pool(&cfg.database_url, &cfg.pool_settings()).await?);
    run_migrations(&pool).await?;

    let repo = Arc::new(Repository::new(pool.clone()).with_period_policy(cfg.period_policy));

    let plan_cache = Arc::new(PlanCache::new(
        repo.clone(),
        cfg.registry()?,
        Duration::from_millis(cfg.plan_cache_ttl_ms),
        cfg.plan_cache_max_entries,
    ));

    let redis_client = match &cfg.redis_url {
        Some(url) => Some(redis::Client::open(url.as_str())?),
        None => None,
    };

    let ledger = usage_ledger(cfg.ledger_backend, redis_client.as_ref(), repo.clone()).await?;

    let sources = GateSources::from_store(repo.clone())
        .with_catalog(plan_cache.clone())
        .with_ledger(ledger);

    if let Some(client) = redis_client {
        let subscriber = PlanSubscriber::new(client, plan_cache.clone());
        tokio::spawn(async move {
            if let Err(e) = subscriber.run().await {
                tracing::error!(error = %e, "Plan event listener crashed");
            }
        });
    }

    let state = Arc::new(AppState::new(sources, cfg.api_key.clone()).with_pool(pool));

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_millis(cfg.request_timeout_ms)));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    info!("Shutting down gracefully...");
    Ok(())
}

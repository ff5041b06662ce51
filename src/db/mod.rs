pub mod models;
pub mod repository;

use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::utils::{error::GateError, logs_fmt::mask_password};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 20,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolSettings {
    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
    }
}

pub async fn create_pool(database_url: &str, settings: &PoolSettings) -> Result<PgPool> {
    info!(
        url = %mask_password(database_url),
        max_connections = settings.max_connections,
        "Connecting to the plan store"
    );

    let pool = settings.options().connect(database_url).await?;
    health_check(&pool).await?;

    info!("Plan store connection verified");
    Ok(pool)
}

/// Pool that connects on first use; lets callers be built without a live
/// database.
pub fn lazy_pool(database_url: &str, settings: &PoolSettings) -> Result<PgPool, GateError> {
    Ok(settings.options().connect_lazy(database_url)?)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Applying plan store migrations");
    sqlx::migrate!("src/db/migrations").run(pool).await?;
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> Result<(), GateError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

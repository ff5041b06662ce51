pub mod cache;
pub mod redis_ledger;

use std::sync::Arc;

use redis::Client as RedisClient;

use crate::{
    adapters::redis_ledger::RedisUsageLedger,
    db::repository::Repository,
    gate::store::UsageLedger,
    utils::{config::LedgerBackend, error::GateError},
};

/// The ledger usage is read from and written to. The server and the CLI both
/// go through here so they always count against the same store.
pub async fn usage_ledger(
    backend: LedgerBackend,
    redis_client: Option<&RedisClient>,
    repo: Arc<Repository>,
) -> Result<Arc<dyn UsageLedger>, GateError> {
    match (backend, redis_client) {
        (LedgerBackend::Postgres, _) => Ok(repo),
        (LedgerBackend::Redis, Some(client)) => Ok(Arc::new(RedisUsageLedger::new(client).await?)),
        (LedgerBackend::Redis, None) => Err(GateError::Config(
            "redis_url must be set when ledger_backend is redis".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{PoolSettings, lazy_pool};

    fn repo() -> Arc<Repository> {
        let pool = lazy_pool("postgres://gate@localhost/featuregate", &PoolSettings::default())
            .unwrap();
        Arc::new(Repository::new(Arc::new(pool)))
    }

    #[tokio::test]
    async fn redis_backend_without_client_is_refused() {
        let result = usage_ledger(LedgerBackend::Redis, None, repo()).await;
        assert!(matches!(result, Err(GateError::Config(_))));
    }

    #[tokio::test]
    async fn postgres_backend_uses_the_repository() {
        let result = usage_ledger(LedgerBackend::Postgres, None, repo()).await;
        assert!(result.is_ok());
    }
}

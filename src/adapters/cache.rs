use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use crate::{
    gate::{registry::CapabilityRegistry, store::PlanCatalog, types::CapabilityLimit},
    utils::error::GateError,
};

/// Caches plan capabilities in front of another catalog. Plans are checked
/// against the registry once, when they are first loaded.
pub struct PlanCache {
    inner: Arc<dyn PlanCatalog>,
    registry: CapabilityRegistry,
    cache: Cache<String, Arc<Vec<CapabilityLimit>>>,
}

impl PlanCache {
    pub fn new(
        inner: Arc<dyn PlanCatalog>,
        registry: CapabilityRegistry,
        ttl: Duration,
        max_entries: u64,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self {
            inner,
            registry,
            cache,
        }
    }

    pub async fn invalidate(&self, plan_id: &str) {
        self.cache.invalidate(plan_id).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[async_trait]
impl PlanCatalog for PlanCache {
    async fn plan_capabilities(&self, plan_id: &str) -> Result<Vec<CapabilityLimit>, GateError> {
        if let Some(hit) = self.cache.get(plan_id).await {
            return Ok(hit.as_ref().clone());
        }

        let capabilities = self.inner.plan_capabilities(plan_id).await?;
        self.registry.check(plan_id, &capabilities)?;

        debug!(plan = %plan_id, capabilities = capabilities.len(), "Plan cached");
        self.cache
            .insert(plan_id.to_string(), Arc::new(capabilities.clone()))
            .await;

        Ok(capabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::memory::MemoryStore;

    fn cache_over(store: Arc<MemoryStore>, registry: CapabilityRegistry) -> PlanCache {
        PlanCache::new(store, registry, Duration::from_secs(60), 100)
    }

    #[tokio::test]
    async fn serves_cached_plan_until_invalidated() {
        let store = Arc::new(MemoryStore::new());
        store.set_plan("growth", vec![CapabilityLimit::bounded("rfq_limit_monthly", 10)]);
        let cache = cache_over(store.clone(), CapabilityRegistry::default());

        let first = cache.plan_capabilities("growth").await.unwrap();
        store.set_plan("growth", vec![CapabilityLimit::bounded("rfq_limit_monthly", 50)]);
        let second = cache.plan_capabilities("growth").await.unwrap();
        assert_eq!(first, second);

        cache.invalidate("growth").await;
        let third = cache.plan_capabilities("growth").await.unwrap();
        assert_eq!(third, vec![CapabilityLimit::bounded("rfq_limit_monthly", 50)]);
    }

    #[tokio::test]
    async fn strict_registry_refuses_and_does_not_cache() {
        let store = Arc::new(MemoryStore::new());
        store.set_plan("growth", vec![CapabilityLimit::flag("mystery_feature", true)]);
        let cache = cache_over(store.clone(), CapabilityRegistry::default().strict(true));

        assert!(cache.plan_capabilities("growth").await.is_err());

        store.set_plan("growth", vec![CapabilityLimit::flag("api_access", true)]);
        let caps = cache.plan_capabilities("growth").await.unwrap();
        assert_eq!(caps, vec![CapabilityLimit::flag("api_access", true)]);
    }

    #[tokio::test]
    async fn read_errors_pass_through() {
        let store = Arc::new(MemoryStore::new());
        store.fail_reads(true);
        let cache = cache_over(store, CapabilityRegistry::default());
        assert!(cache.plan_capabilities("growth").await.is_err());
    }
}

use std::sync::Arc;

use sqlx::PgPool;

use crate::gate::store::GateSources;

pub struct AppState {
    pub sources: GateSources,
    pub api_key: String,
    /// Checked by `/healthz` when present.
    pub pool: Option<Arc<PgPool>>,
}

impl AppState {
    pub fn new(sources: GateSources, api_key: impl Into<String>) -> Self {
        Self {
            sources,
            api_key: api_key.into(),
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: Arc<PgPool>) -> Self {
        self.pool = Some(pool);
        self
    }
}

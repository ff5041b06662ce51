use std::sync::Arc;

use futures::StreamExt;
use redis::{Client as RedisClient, aio::PubSub};
use tracing::{info, warn};

use crate::{
    adapters::cache::PlanCache,
    pubsub::types::{PlanAction, PlanEvent},
    utils::{constants::PLAN_EVENTS_CHANNEL, error::GateError},
};

/// Drops cached plans when another process announces a plan change.
pub struct PlanSubscriber {
    redis_client: RedisClient,
    cache: Arc<PlanCache>,
}

impl PlanSubscriber {
    pub fn new(redis_client: RedisClient, cache: Arc<PlanCache>) -> Self {
        Self {
            redis_client,
            cache,
        }
    }

    pub async fn run(&self) -> Result<(), GateError> {
        let mut pubsub_conn: PubSub = self.redis_client.get_async_pubsub().await?;
        pubsub_conn.subscribe(PLAN_EVENTS_CHANNEL).await?;

        info!(channel = PLAN_EVENTS_CHANNEL, "Subscribed to plan event channel");

        let mut stream = pubsub_conn.on_message();

        while let Some(msg) = stream.next().await {
            let payload = msg.get_payload::<String>()?;
            let event: PlanEvent = match serde_json::from_str(&payload) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed plan event");
                    continue;
                }
            };

            apply(&self.cache, &event).await;
        }

        warn!("Pub/Sub stream ended unexpectedly");
        Ok(())
    }
}

pub async fn apply(cache: &PlanCache, event: &PlanEvent) {
    match event.action {
        PlanAction::Invalidate => {
            info!(plan = %event.plan_id, "Received plan invalidation event");
            cache.invalidate(&event.plan_id).await;
        }
        PlanAction::InvalidateAll => {
            info!("Received invalidate-all plan event");
            cache.invalidate_all();
        }
    }
}

use redis::{Client as RedisClient, aio::MultiplexedConnection};
use tracing::info;

use crate::{
    pubsub::types::PlanEvent,
    utils::{constants::PLAN_EVENTS_CHANNEL, error::GateError},
};

pub struct PlanPublisher {
    redis: MultiplexedConnection,
}

impl PlanPublisher {
    pub async fn new(redis_client: &RedisClient) -> Result<Self, GateError> {
        let redis = redis_client.get_multiplexed_async_connection().await?;
        Ok(Self { redis })
    }

    pub async fn publish(&self, event: &PlanEvent) -> Result<(), GateError> {
        let message = serde_json::to_string(event)?;
        let mut conn = self.redis.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(PLAN_EVENTS_CHANNEL)
            .arg(message)
            .query_async(&mut conn)
            .await?;

        info!(
            event = "plan.published",
            plan = %event.plan_id,
            action = ?event.action,
            receivers,
        );
        Ok(())
    }
}

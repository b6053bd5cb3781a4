//! Redis pub/sub transport.
//!
//! Redis pub/sub is not durable: a message published while no subscriber is
//! connected is lost, which matches the at-most-once contract of the bus.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use tokio::sync::mpsc;

use crate::{
    bus::{MessageBus, Subscription, record_published},
    envelope::{Envelope, Topic},
    error::Result,
};

/// Message bus backed by Redis pub/sub.
///
/// Publishing shares one multiplexed connection; every subscription opens its
/// own pub/sub connection and forwards payloads from a background task.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    publisher: MultiplexedConnection,
}

impl RedisBus {
    /// Connects to the Redis server at `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let publisher = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, topic: &Topic, envelope: &Envelope) -> Result<()> {
        let frame = envelope.encode()?;
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn.publish(topic.name(), frame).await?;

        record_published(topic);
        tracing::trace!(topic = %topic, kind = %envelope.kind, receivers, "published");
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> Result<Subscription> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic.name()).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let channel = topic.name();
        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(channel = %channel, error = %e, "non-text payload");
                        continue;
                    }
                };
                if tx.send(payload).is_err() {
                    break;
                }
            }
            tracing::debug!(channel = %channel, "redis subscription closed");
        });

        Ok(Subscription::new(topic.clone(), rx))
    }
}

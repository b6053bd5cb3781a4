use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    envelope::{Envelope, Topic},
    error::Result,
};

/// Pub/sub transport for saga messages.
///
/// Delivery is at-most-once: a message published to a topic with no live
/// subscriber is dropped, and the gateway's timeout covers any loss.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Delivers `envelope` to every current subscriber of `topic`.
    async fn publish(&self, topic: &Topic, envelope: &Envelope) -> Result<()>;

    /// Starts receiving messages published to `topic`.
    async fn subscribe(&self, topic: &Topic) -> Result<Subscription>;
}

/// Stream of decoded messages from one topic.
///
/// Frames that fail to decode are logged and skipped.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    receiver: mpsc::UnboundedReceiver<String>,
}

impl Subscription {
    pub fn new(topic: Topic, receiver: mpsc::UnboundedReceiver<String>) -> Self {
        Self { topic, receiver }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Waits for the next well-formed message. Returns `None` once the
    /// transport has closed.
    pub async fn next(&mut self) -> Option<Envelope> {
        loop {
            let frame = self.receiver.recv().await?;
            match Envelope::parse(&frame) {
                Ok(envelope) => return Some(envelope),
                Err(e) => {
                    tracing::warn!(topic = %self.topic, error = %e, "dropping malformed frame");
                }
            }
        }
    }
}

pub(crate) fn record_published(topic: &Topic) {
    metrics::counter!("bus_messages_published_total", "topic" => topic.label()).increment(1);
}

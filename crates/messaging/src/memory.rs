use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    bus::{MessageBus, Subscription, record_published},
    envelope::{Envelope, Topic},
    error::Result,
};

type Subscribers = HashMap<String, Vec<mpsc::UnboundedSender<String>>>;

/// In-process bus for single-process deployments and tests.
///
/// Messages go through the same frame encoding as the Redis transport.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match subscribers.get_mut(&topic.name()) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &Topic, envelope: &Envelope) -> Result<()> {
        let frame = envelope.encode()?;
        {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(senders) = subscribers.get_mut(&topic.name()) {
                senders.retain(|tx| tx.send(frame.clone()).is_ok());
            }
        }

        record_published(topic);
        tracing::trace!(topic = %topic, kind = %envelope.kind, "published");
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.name())
            .or_default()
            .push(tx);
        Ok(Subscription::new(topic.clone(), rx))
    }
}

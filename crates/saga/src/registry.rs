//! In-flight checkout table of one gateway instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use common::OrderId;
use messaging::Outcome;
use tokio::sync::oneshot;

/// A checkout waiting for its outcome.
#[derive(Debug)]
pub struct SagaContext {
    pub token: String,
    pub order_id: OrderId,
    pub created_at: DateTime<Utc>,
    sender: oneshot::Sender<Outcome>,
}

/// Maps correlation tokens to waiting checkouts.
///
/// Each context is resolved or discarded exactly once; whichever happens
/// first removes it, so a late outcome for a timed-out checkout finds
/// nothing and is dropped. An order has at most one waiting checkout.
#[derive(Debug, Clone, Default)]
pub struct CorrelationRegistry {
    pending: Arc<Mutex<HashMap<String, SagaContext>>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SagaContext>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a checkout for `order_id` under a fresh token.
    ///
    /// Returns `None` while another checkout of the same order is waiting.
    pub fn register(&self, order_id: OrderId) -> Option<(String, oneshot::Receiver<Outcome>)> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let (sender, receiver) = oneshot::channel();

        let pending = {
            let mut map = self.lock();
            if map.values().any(|context| context.order_id == order_id) {
                return None;
            }
            map.insert(
                token.clone(),
                SagaContext {
                    token: token.clone(),
                    order_id,
                    created_at: Utc::now(),
                    sender,
                },
            );
            map.len()
        };
        metrics::gauge!("saga_pending").set(pending as f64);

        Some((token, receiver))
    }

    /// Delivers `outcome` to the checkout waiting on `token`.
    ///
    /// Returns false if the token is unknown or already gone.
    pub fn resolve(&self, token: &str, outcome: Outcome) -> bool {
        let Some(context) = self.remove(token) else {
            return false;
        };

        let age_ms = (Utc::now() - context.created_at).num_milliseconds();
        tracing::debug!(token, order_id = %context.order_id, %outcome, age_ms, "saga resolved");
        // The waiter may have timed out between removal and send.
        let _ = context.sender.send(outcome);
        true
    }

    /// Drops the context for `token` without resolving it.
    pub fn discard(&self, token: &str) -> bool {
        self.remove(token).is_some()
    }

    fn remove(&self, token: &str) -> Option<SagaContext> {
        let (context, pending) = {
            let mut map = self.lock();
            (map.remove(token), map.len())
        };
        metrics::gauge!("saga_pending").set(pending as f64);
        context
    }

    /// Number of checkouts currently waiting.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

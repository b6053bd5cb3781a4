//! Stock step of the checkout saga.

use std::sync::Arc;

use common::ItemId;
use messaging::{Envelope, MessageBus, MessageKind, OrderSnapshot, Outcome, Topic};
use state_store::StockStore;
use tokio::task::JoinHandle;

use crate::error::{Result, SagaError};
use crate::state::SagaState;

/// Consumes `STOCK`: reserves one unit of every item in the order, and on
/// failure restores what it reserved and asks the payment step to refund.
pub struct StockWorker<S> {
    store: S,
    bus: Arc<dyn MessageBus>,
}

impl<S> StockWorker<S>
where
    S: StockStore + 'static,
{
    pub fn new(store: S, bus: Arc<dyn MessageBus>) -> Self {
        Self { store, bus }
    }

    /// Subscribes to `STOCK` and spawns the consuming task.
    pub async fn spawn(self) -> Result<JoinHandle<()>> {
        let mut subscription = self.bus.subscribe(&Topic::Stock).await?;
        let worker = Arc::new(self);
        tracing::info!("stock worker listening");

        Ok(tokio::spawn(async move {
            while let Some(envelope) = subscription.next().await {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move { worker.handle(envelope).await });
            }
            tracing::info!("stock subscription closed");
        }))
    }

    /// Handles one message from the `STOCK` topic.
    #[tracing::instrument(skip(self, envelope), fields(token = %envelope.token))]
    pub async fn handle(&self, envelope: Envelope) {
        if envelope.kind != MessageKind::Stock {
            tracing::warn!(kind = %envelope.kind, "ignoring unexpected message on STOCK");
            return;
        }

        let snapshot = match envelope.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable stock request");
                self.send(&envelope.reply_topic(), &envelope.reply(Outcome::Internal))
                    .await;
                return;
            }
        };

        match self.reserve(&snapshot).await {
            Ok(()) => {
                tracing::info!(order_id = %snapshot.order_id, state = %SagaState::StockReserved, "stock reserved");
                self.send(&envelope.reply_topic(), &envelope.reply(Outcome::Success))
                    .await;
            }
            Err(e) => {
                tracing::info!(order_id = %snapshot.order_id, error = %e, state = %SagaState::StockFailed, "stock reservation failed");
                self.send(&Topic::Payment, &envelope.with_kind(MessageKind::PayRevert))
                    .await;
                self.send(&envelope.reply_topic(), &envelope.reply(e.outcome()))
                    .await;
            }
        }
    }

    /// Subtracts one unit of every item in ascending item id order.
    ///
    /// Stops at the first item that cannot be reserved and adds back one
    /// unit to every item reserved before it. A failing add-back is logged
    /// and the remaining items are still restored.
    pub async fn reserve(&self, snapshot: &OrderSnapshot) -> Result<()> {
        let mut done: Vec<&ItemId> = Vec::with_capacity(snapshot.items.len());

        for item_id in snapshot.items.ids() {
            match self.store.subtract_stock(item_id, 1).await {
                Ok(_) => done.push(item_id),
                Err(e) => {
                    let err = if e.is_not_found() || e.is_rule_violation() {
                        SagaError::ItemUnavailable(item_id.clone())
                    } else {
                        SagaError::Store(e)
                    };
                    self.restore(&done).await;
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    async fn restore(&self, done: &[&ItemId]) {
        metrics::counter!("saga_compensations_total").increment(1);
        for item_id in done {
            if let Err(e) = self.store.add_stock(item_id, 1).await {
                metrics::counter!("saga_compensation_failures_total").increment(1);
                tracing::error!(%item_id, error = %e, "unable to revert stock");
            }
        }
    }

    async fn send(&self, topic: &Topic, envelope: &Envelope) {
        if let Err(e) = self.bus.publish(topic, envelope).await {
            tracing::error!(%topic, kind = %envelope.kind, error = %e, "failed to publish");
        }
    }
}

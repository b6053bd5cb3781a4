//! Payment step of the checkout saga.

use std::sync::Arc;

use messaging::{Envelope, MessageBus, MessageKind, OrderSnapshot, Outcome, Topic};
use state_store::{Payment, PaymentStatus, PaymentStore};
use tokio::task::JoinHandle;

use crate::error::{Result, SagaError};
use crate::services::UserCredit;
use crate::state::SagaState;

/// Consumes `PAYMENT`: debits credit for `PAY` and refunds it for
/// `PAY_REVERT`.
///
/// Each message is handled on its own task, so sagas for different orders
/// never wait on each other.
pub struct PaymentWorker<S> {
    store: S,
    credit: Arc<dyn UserCredit>,
    bus: Arc<dyn MessageBus>,
}

impl<S> PaymentWorker<S>
where
    S: PaymentStore + 'static,
{
    pub fn new(store: S, credit: Arc<dyn UserCredit>, bus: Arc<dyn MessageBus>) -> Self {
        Self { store, credit, bus }
    }

    /// Subscribes to `PAYMENT` and spawns the consuming task.
    pub async fn spawn(self) -> Result<JoinHandle<()>> {
        let mut subscription = self.bus.subscribe(&Topic::Payment).await?;
        let worker = Arc::new(self);
        tracing::info!("payment worker listening");

        Ok(tokio::spawn(async move {
            while let Some(envelope) = subscription.next().await {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move { worker.handle(envelope).await });
            }
            tracing::info!("payment subscription closed");
        }))
    }

    /// Handles one message from the `PAYMENT` topic.
    pub async fn handle(&self, envelope: Envelope) {
        match envelope.kind {
            MessageKind::Pay => self.on_pay(&envelope).await,
            MessageKind::PayRevert => self.on_revert(&envelope).await,
            other => tracing::warn!(kind = %other, "ignoring unexpected message on PAYMENT"),
        }
    }

    #[tracing::instrument(skip(self, envelope), fields(token = %envelope.token))]
    async fn on_pay(&self, envelope: &Envelope) {
        let result = match envelope.snapshot() {
            Ok(snapshot) => self.pay(&snapshot).await.map(|_| snapshot),
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(snapshot) => {
                tracing::info!(order_id = %snapshot.order_id, state = %SagaState::Paid, "payment recorded");
                self.send(&Topic::Stock, &envelope.with_kind(MessageKind::Stock))
                    .await;
            }
            Err(e) => {
                let outcome = e.outcome();
                if outcome == Outcome::Internal {
                    tracing::warn!(error = %e, state = %SagaState::PayFailed, "payment failed");
                } else {
                    tracing::info!(error = %e, state = %SagaState::PayFailed, "payment rejected");
                }
                self.send(&envelope.reply_topic(), &envelope.reply(outcome))
                    .await;
            }
        }
    }

    #[tracing::instrument(skip(self, envelope), fields(token = %envelope.token))]
    async fn on_revert(&self, envelope: &Envelope) {
        let result = match envelope.snapshot() {
            Ok(snapshot) => self.cancel(&snapshot).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(payment) => tracing::info!(
                order_id = %payment.order_id,
                refunded = payment.amount,
                state = %SagaState::PaymentCancelled,
                "payment cancelled"
            ),
            Err(e) => {
                metrics::counter!("saga_compensation_failures_total").increment(1);
                tracing::error!(error = %e, "unable to cancel payment");
            }
        }
    }

    /// Claims the order's payment, then debits the order cost.
    ///
    /// The claim is atomic, so of several requests for one order only one
    /// reaches the debit and the rest fail with `AlreadyPaid`. A failed debit
    /// releases the claim.
    pub async fn pay(&self, snapshot: &OrderSnapshot) -> Result<Payment> {
        let order_id = &snapshot.order_id;
        let previous = match self.store.claim_payment(order_id, snapshot.cost).await {
            Ok(previous) => previous,
            Err(e) if e.is_rule_violation() => {
                return Err(SagaError::AlreadyPaid(order_id.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.credit.subtract(&snapshot.user_id, snapshot.cost).await {
            if let Err(release) = self.store.release_payment(order_id, previous).await {
                tracing::error!(
                    %order_id,
                    error = %release,
                    "debit failed and payment claim could not be released"
                );
            }
            return Err(e.into());
        }

        Ok(Payment {
            order_id: order_id.clone(),
            amount: snapshot.cost,
            status: PaymentStatus::Paid,
        })
    }

    /// Refunds a paid payment to the order's user and marks it cancelled.
    pub async fn cancel(&self, snapshot: &OrderSnapshot) -> Result<Payment> {
        let payment = self
            .store
            .find_payment(&snapshot.order_id)
            .await?
            .ok_or_else(|| SagaError::NoPayment(snapshot.order_id.clone()))?;
        if !payment.is_paid() {
            return Err(SagaError::AlreadyCancelled(snapshot.order_id.clone()));
        }

        self.credit.add(&snapshot.user_id, payment.amount).await?;
        Ok(self.store.cancel_payment(&snapshot.order_id).await?)
    }

    async fn send(&self, topic: &Topic, envelope: &Envelope) {
        if let Err(e) = self.bus.publish(topic, envelope).await {
            tracing::error!(%topic, kind = %envelope.kind, error = %e, "failed to publish");
        }
    }
}

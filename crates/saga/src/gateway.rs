//! Client-facing start of the checkout saga.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::OrderId;
use messaging::{Envelope, MessageBus, MessageKind, OrderSnapshot, Outcome, Subscription, Topic};
use state_store::OrderStore;
use tokio::task::JoinHandle;

use crate::error::{Result, SagaError};
use crate::registry::CorrelationRegistry;
use crate::state::SagaState;

/// Starts checkout sagas and waits for their outcomes.
///
/// Every gateway instance listens on its own `ORDER.<instance_id>` topic and
/// only ever sees outcomes for sagas it started.
pub struct OrderGateway<S> {
    store: S,
    bus: Arc<dyn MessageBus>,
    registry: CorrelationRegistry,
    instance_id: String,
    timeout: Duration,
}

impl<S: OrderStore> OrderGateway<S> {
    pub fn new(
        store: S,
        bus: Arc<dyn MessageBus>,
        instance_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            registry: CorrelationRegistry::new(),
            instance_id: instance_id.into(),
            timeout,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn registry(&self) -> &CorrelationRegistry {
        &self.registry
    }

    pub fn outcome_topic(&self) -> Topic {
        Topic::order(self.instance_id.clone())
    }

    /// Subscribes to this instance's outcome topic and spawns the task that
    /// resolves waiting checkouts. The subscription is live once this returns.
    pub async fn start(&self) -> Result<JoinHandle<()>> {
        let subscription = self.bus.subscribe(&self.outcome_topic()).await?;
        let registry = self.registry.clone();
        tracing::info!(instance_id = %self.instance_id, "order gateway listening for outcomes");
        Ok(tokio::spawn(listen(subscription, registry)))
    }

    /// Runs the checkout saga for `order_id` and waits for its outcome.
    ///
    /// On success the order is marked paid. A checkout that sees no outcome
    /// before the deadline fails with [`SagaError::Timeout`]; the workers are
    /// not told and any later outcome is dropped.
    #[tracing::instrument(skip(self), fields(instance_id = %self.instance_id))]
    pub async fn checkout(&self, order_id: &OrderId) -> Result<()> {
        let order = match self.store.find_order(order_id).await {
            Ok(order) => order,
            Err(e) if e.is_not_found() => return Err(SagaError::OrderNotFound(order_id.clone())),
            Err(e) => return Err(e.into()),
        };
        if order.paid {
            return Err(SagaError::AlreadyPaid(order_id.clone()));
        }

        let started = Instant::now();

        let snapshot = OrderSnapshot {
            order_id: order.id,
            user_id: order.user_id,
            items: order.items,
            cost: order.cost,
        };
        let Some((token, receiver)) = self.registry.register(order_id.clone()) else {
            tracing::info!("checkout already in progress");
            return Err(SagaError::CheckoutInProgress(order_id.clone()));
        };
        let message =
            match Envelope::step(self.instance_id.clone(), token.clone(), MessageKind::Pay, &snapshot) {
                Ok(message) => message,
                Err(e) => {
                    self.registry.discard(&token);
                    return Err(e.into());
                }
            };

        if let Err(e) = self.bus.publish(&Topic::Payment, &message).await {
            self.registry.discard(&token);
            tracing::error!(%token, error = %e, "failed to publish payment request");
            return Err(e.into());
        }
        metrics::counter!("saga_checkouts_total").increment(1);
        tracing::info!(%token, state = %SagaState::Started, cost = snapshot.cost, "saga step started");

        let outcome = match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                self.registry.discard(&token);
                return Err(SagaError::ListenerClosed);
            }
            Err(_) => {
                self.registry.discard(&token);
                metrics::counter!("saga_timeouts_total").increment(1);
                tracing::warn!(%token, timeout_ms = self.timeout.as_millis() as u64, "checkout timed out");
                return Err(SagaError::Timeout {
                    order_id: order_id.clone(),
                    after: self.timeout,
                });
            }
        };

        metrics::counter!("saga_outcomes_total", "outcome" => outcome.as_str()).increment(1);
        metrics::histogram!("saga_checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Outcome::Success => {
                if let Err(e) = self.store.mark_paid(order_id).await {
                    tracing::error!(%token, error = %e, "saga completed but order could not be marked paid");
                    return Err(e.into());
                }
                tracing::info!(%token, state = %SagaState::Completed, "checkout completed");
                Ok(())
            }
            Outcome::BadRequest => {
                tracing::info!(%token, state = %SagaState::Failed, "checkout rejected");
                Err(SagaError::Rejected(order_id.clone()))
            }
            Outcome::Internal => {
                tracing::warn!(%token, state = %SagaState::Failed, "checkout failed");
                Err(SagaError::StepFailed(order_id.clone()))
            }
        }
    }
}

async fn listen(mut subscription: Subscription, registry: CorrelationRegistry) {
    while let Some(envelope) = subscription.next().await {
        let Some(outcome) = envelope.kind.outcome() else {
            tracing::warn!(kind = %envelope.kind, "ignoring non-outcome message on outcome topic");
            continue;
        };
        if !registry.resolve(&envelope.token, outcome) {
            tracing::debug!(token = %envelope.token, %outcome, "dropping outcome for unknown or expired saga");
        }
    }
    tracing::info!(topic = %subscription.topic(), "outcome subscription closed");
}

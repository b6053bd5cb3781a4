//! Saga error types.

use std::time::Duration;

use common::{ItemId, OrderId};
use messaging::{BusError, EnvelopeError, Outcome};
use state_store::StoreError;
use thiserror::Error;

use crate::services::{CatalogError, CreditError};

/// Client-facing classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    BadRequest,
    Internal,
}

/// Errors that can occur while running or serving a checkout saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The order to check out does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order already has a paid payment.
    #[error("Order already paid: {0}")]
    AlreadyPaid(OrderId),

    /// Another checkout of the same order is still waiting for its outcome.
    #[error("Checkout already in progress for order {0}")]
    CheckoutInProgress(OrderId),

    /// Compensation found no payment to cancel.
    #[error("No payment recorded for order {0}")]
    NoPayment(OrderId),

    /// Compensation found the payment already cancelled.
    #[error("Payment already cancelled for order {0}")]
    AlreadyCancelled(OrderId),

    /// A stock item is missing or out of stock.
    #[error("Item unavailable: {0}")]
    ItemUnavailable(ItemId),

    /// The saga ended with a business-rule rejection.
    #[error("Checkout rejected for order {0}")]
    Rejected(OrderId),

    /// The saga ended with an infrastructure failure in a worker.
    #[error("Checkout failed for order {0}")]
    StepFailed(OrderId),

    /// No outcome arrived before the deadline.
    #[error("Checkout of order {order_id} timed out after {after:?}")]
    Timeout { order_id: OrderId, after: Duration },

    /// The outcome listener went away while a checkout was waiting.
    #[error("Outcome listener closed")]
    ListenerClosed,

    /// A step message could not be decoded.
    #[error("Invalid saga message: {0}")]
    InvalidMessage(#[from] EnvelopeError),

    /// User credit capability error.
    #[error("Credit error: {0}")]
    Credit(#[from] CreditError),

    /// Item catalog capability error.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// State store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Message bus error.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

impl SagaError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SagaError::OrderNotFound(_) => ErrorClass::NotFound,
            SagaError::AlreadyPaid(_)
            | SagaError::CheckoutInProgress(_)
            | SagaError::NoPayment(_)
            | SagaError::AlreadyCancelled(_)
            | SagaError::ItemUnavailable(_)
            | SagaError::Rejected(_) => ErrorClass::BadRequest,
            SagaError::Credit(e) if e.is_rejection() => ErrorClass::BadRequest,
            SagaError::Catalog(CatalogError::UnknownItem(_)) => ErrorClass::NotFound,
            SagaError::Store(e) if e.is_not_found() => ErrorClass::NotFound,
            SagaError::Store(e) if e.is_rule_violation() => ErrorClass::BadRequest,
            _ => ErrorClass::Internal,
        }
    }

    /// Outcome a worker reports for this failure.
    pub fn outcome(&self) -> Outcome {
        match self.class() {
            ErrorClass::Internal => Outcome::Internal,
            ErrorClass::NotFound | ErrorClass::BadRequest => Outcome::BadRequest,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

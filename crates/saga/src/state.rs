//! Logical saga state machine.
//!
//! Checkout is choreographed, so no component stores this state. Workers
//! report the state they move a saga into through logs and metrics.

use serde::{Deserialize, Serialize};

/// The logical state of a checkout saga.
///
/// State transitions:
/// ```text
/// Started ──┬──► Paid ──┬──► StockReserved ──► Completed
///           │           └──► StockFailed ──► PaymentCancelled ──► Failed
///           └──► PayFailed ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// The gateway published the payment request.
    #[default]
    Started,

    /// Credit was debited and the payment recorded.
    Paid,

    /// The debit was rejected or failed.
    PayFailed,

    /// One unit of every item was reserved.
    StockReserved,

    /// An item could not be reserved; reserved items were restored.
    StockFailed,

    /// The payment was refunded and cancelled.
    PaymentCancelled,

    /// Checkout succeeded (terminal state).
    Completed,

    /// Checkout failed (terminal state).
    Failed,
}

impl SagaState {
    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Started => "Started",
            SagaState::Paid => "Paid",
            SagaState::PayFailed => "PayFailed",
            SagaState::StockReserved => "StockReserved",
            SagaState::StockFailed => "StockFailed",
            SagaState::PaymentCancelled => "PaymentCancelled",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_started() {
        assert_eq!(SagaState::default(), SagaState::Started);
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaState::StockReserved.to_string(), "StockReserved");
        assert_eq!(SagaState::PaymentCancelled.to_string(), "PaymentCancelled");
    }

    #[test]
    fn test_serialization() {
        let state = SagaState::Paid;
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: SagaState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}

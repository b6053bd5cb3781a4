use thiserror::Error;

/// Errors that can occur when interacting with the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Subtracting would take an item's stock below zero.
    #[error("Insufficient stock for item {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: String,
        available: i64,
        requested: i64,
    },

    /// Subtracting would take a user's credit below zero.
    #[error("Insufficient credit for user {user_id}: available {available}, requested {requested}")]
    InsufficientCredit {
        user_id: String,
        available: i64,
        requested: i64,
    },

    /// An update would take a value outside the range it is stored in.
    #[error("Value out of range for {entity} {id}")]
    OutOfRange { entity: &'static str, id: String },

    /// A payment status change that the payment lifecycle does not allow.
    #[error("Invalid payment transition for order {order_id}: {reason}")]
    InvalidTransition { order_id: String, reason: String },

    /// A stored value could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn out_of_range(entity: &'static str, id: impl ToString) -> Self {
        Self::OutOfRange {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true if the record was absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the error is a business-rule rejection rather than an
    /// infrastructure failure.
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            Self::InsufficientStock { .. }
                | Self::InsufficientCredit { .. }
                | Self::OutOfRange { .. }
                | Self::InvalidTransition { .. }
        )
    }
}

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

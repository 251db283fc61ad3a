use common::BalanceKey;
use thiserror::Error;

use crate::Version;

/// Reasons a ledger event is rejected before it reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Quantities are strictly positive; direction comes from the event kind.
    #[error("quantity must be greater than 0, got {0}")]
    NonPositiveQuantity(i64),

    /// A transfer must move stock between two distinct sites.
    #[error("transfer source and destination must differ")]
    SelfTransfer,

    /// The timestamp could not be interpreted as an instant.
    #[error("invalid timestamp {value:?}: expected RFC 3339")]
    InvalidTimestamp { value: String },

    /// A required kind-specific field was empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A credit would push a balance past the largest representable quantity.
    #[error("quantity {requested} would overflow balance {balance}")]
    BalanceOverflow { balance: i64, requested: i64 },

    /// A page bound the store cannot represent.
    #[error("{field} {value} is out of range")]
    PageOutOfRange { field: &'static str, value: usize },
}

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The event failed validation and was not stored.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A concurrency conflict occurred when appending.
    /// The expected per-key version did not match the stored one.
    #[error("Concurrency conflict on {key}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        key: BalanceKey,
        expected: Version,
        actual: Version,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;

//! Domain error types.

use chrono::{DateTime, Utc};
use common::{BalanceKey, EquipmentTypeId, SiteId};
use event_store::{EventStoreError, ValidationError};
use projections::ProjectionError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
///
/// Every rejection leaves the ledger unchanged. Only `ContentionTimeout` is
/// safe to retry as-is; the others need corrected input.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The write would drive a balance negative or over-allocate.
    #[error(
        "insufficient balance at site {site} for equipment type {equipment_type}: have {available}, requested {requested}"
    )]
    InsufficientBalance {
        site: SiteId,
        equipment_type: EquipmentTypeId,
        available: i64,
        requested: i64,
    },

    /// A query window whose start lies after its end.
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// A key lock or version check could not be won in time.
    #[error("contention on {key}: try again")]
    ContentionTimeout { key: BalanceKey },

    /// A referenced site or equipment type is not in the catalog.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(EventStoreError),

    /// An error occurred while projecting balances.
    #[error("Projection error: {0}")]
    Projection(ProjectionError),
}

impl DomainError {
    pub fn site_not_found(site: SiteId) -> Self {
        DomainError::NotFound {
            kind: "site",
            id: site.to_string(),
        }
    }

    pub fn equipment_type_not_found(equipment_type: EquipmentTypeId) -> Self {
        DomainError::NotFound {
            kind: "equipment type",
            id: equipment_type.to_string(),
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation",
            DomainError::InsufficientBalance { .. } => "insufficient_balance",
            DomainError::InvalidRange { .. } => "invalid_range",
            DomainError::ContentionTimeout { .. } => "contention_timeout",
            DomainError::NotFound { .. } => "not_found",
            DomainError::EventStore(_) => "event_store",
            DomainError::Projection(_) => "projection",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::ContentionTimeout { .. })
    }
}

impl From<EventStoreError> for DomainError {
    fn from(e: EventStoreError) -> Self {
        match e {
            EventStoreError::Validation(v) => DomainError::Validation(v),
            EventStoreError::ConcurrencyConflict { key, .. } => {
                DomainError::ContentionTimeout { key }
            }
            other => DomainError::EventStore(other),
        }
    }
}

impl From<ProjectionError> for DomainError {
    fn from(e: ProjectionError) -> Self {
        match e {
            ProjectionError::InvalidRange { start, end } => DomainError::InvalidRange { start, end },
            ProjectionError::EventStore(e) => DomainError::from(e),
            other => DomainError::Projection(other),
        }
    }
}

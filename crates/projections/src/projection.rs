//! Core projection trait and position tracking.

use async_trait::async_trait;
use event_store::{EventEnvelope, Sequence};

use crate::Result;

/// Tracks how far a projection has read into the ledger.
///
/// Events are delivered in occurrence order, so a back-dated event can
/// carry a lower `occurred_at` but a higher sequence than what came before.
/// `high_water` is the highest commit sequence seen, not the last one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    /// Number of events processed by this projection.
    pub events_processed: u64,

    /// Highest commit sequence processed.
    pub high_water: Sequence,
}

impl ProjectionPosition {
    /// Creates a new position at zero.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Advances the position past one event.
    pub fn advance(&self, sequence: Sequence) -> Self {
        Self {
            events_processed: self.events_processed + 1,
            high_water: self.high_water.max(sequence),
        }
    }

    /// Whether an event committed at `sequence` was already processed.
    pub fn has_seen(&self, sequence: Sequence) -> bool {
        sequence <= self.high_water
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "position({} @ seq {})",
            self.events_processed, self.high_water
        )
    }
}

/// A projection that folds ledger events into a read model.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Handles a single committed event.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    /// Returns the current position of this projection.
    async fn position(&self) -> ProjectionPosition;

    /// Resets the projection to its initial state.
    async fn reset(&self) -> Result<()>;
}

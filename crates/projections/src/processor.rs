//! Projection processor for feeding ledger events to projections.

use event_store::EventStore;
use futures_util::StreamExt;

use crate::Result;
use crate::projection::Projection;

/// Streams events from an event store into registered projections.
///
/// The processor supports:
/// - Catch-up: replays the log in projection order, skipping events a
///   projection has already seen
/// - Rebuild: resets all projections and replays from scratch
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    /// Creates a new processor with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams the whole log and delivers every event committed after each
    /// projection's high-water mark.
    ///
    /// Marks are read once before the pass, since events arrive in occurrence
    /// order rather than commit order.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<()> {
        let mut marks = Vec::with_capacity(self.projections.len());
        for projection in &self.projections {
            marks.push(projection.position().await);
        }

        let mut stream = self.store.stream_all_events().await?;
        let mut events_read: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            events_read += 1;

            for (projection, mark) in self.projections.iter().zip(&marks) {
                if !mark.has_seen(event.sequence) {
                    projection.handle(&event).await?;
                    metrics::counter!("projections_events_processed").increment(1);
                }
            }
        }

        tracing::info!(
            events_read,
            projections = self.projections.len(),
            "catch-up complete"
        );

        Ok(())
    }

    /// Resets all projections and replays all events from the store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<()> {
        for projection in &self.projections {
            tracing::debug!(projection = projection.name(), "resetting projection");
            projection.reset().await?;
        }
        self.run_catch_up().await
    }
}

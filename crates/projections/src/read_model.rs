//! Read model trait for query-side views.

use async_trait::async_trait;

/// A read model the write path and queries consult instead of the log.
///
/// Updated by projections; the ledger stays the source of truth and any
/// read model can be rebuilt by replay.
#[async_trait]
pub trait ReadModel: Send + Sync {
    /// Returns the name of this read model.
    fn name(&self) -> &'static str;

    /// Returns the number of entries in this read model.
    ///
    /// Waits for in-flight writes rather than reporting a partial count.
    async fn count(&self) -> usize;
}

use std::pin::Pin;

use async_trait::async_trait;
use common::BalanceKey;
use futures_core::Stream;
use futures_util::TryStreamExt;

use crate::{EventEnvelope, EventQuery, LedgerEvent, Result, Version};

/// Options for appending an event to the store.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected per-key versions for optimistic concurrency control.
    /// Empty means no version check is performed.
    pub expected_versions: Vec<(BalanceKey, Version)>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting each key to be at the given version.
    pub fn expect_versions(versions: impl IntoIterator<Item = (BalanceKey, Version)>) -> Self {
        Self {
            expected_versions: versions.into_iter().collect(),
        }
    }
}

/// A lazy stream of committed events in projection order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Core trait for ledger event store implementations.
///
/// The store is append-only: committed events are never updated or deleted.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Validates and appends one event.
    ///
    /// The event is stored as a single record even when it touches two sites,
    /// so either all of its effects are committed or none are. If
    /// `options.expected_versions` is non-empty the append fails with
    /// `ConcurrencyConflict` unless every listed key is at that version.
    ///
    /// Returns the committed envelope with its assigned sequence.
    async fn append(&self, event: LedgerEvent, options: AppendOptions) -> Result<EventEnvelope>;

    /// Streams events matching a query, ordered by `occurred_at` then sequence.
    ///
    /// Re-issuing the same query yields the same events absent new writes.
    async fn query_events(&self, query: EventQuery) -> Result<EventStream>;

    /// Streams every event in the store in projection order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Gets the number of committed events touching a key.
    async fn key_version(&self, key: BalanceKey) -> Result<Version>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Collects a query's results into memory.
    async fn collect_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        self.query_events(query).await?.try_collect().await
    }

    /// Loads the full history of one balance key.
    async fn load_key(&self, key: BalanceKey) -> Result<Vec<EventEnvelope>> {
        self.collect_events(EventQuery::for_key(key)).await
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Applies offset and limit to an already ordered result set.
pub(crate) fn paginate(events: Vec<EventEnvelope>, query: &EventQuery) -> Vec<EventEnvelope> {
    let offset = query.offset.unwrap_or(0);
    let events = events.into_iter().skip(offset);
    match query.limit {
        Some(limit) => events.take(limit).collect(),
        None => events.collect(),
    }
}

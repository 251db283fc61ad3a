use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::BalanceKey;
use futures_util::stream;
use tokio::sync::RwLock;

use crate::{
    EventEnvelope, EventQuery, EventStoreError, LedgerEvent, Result, Sequence, Version,
    store::{AppendOptions, EventStore, EventStream, paginate},
};

#[derive(Default)]
struct Log {
    /// Events in commit order.
    events: Vec<EventEnvelope>,
    versions: HashMap<BalanceKey, Version>,
    last_sequence: Sequence,
}

/// In-memory event store implementation.
///
/// Stores all events in memory and provides the same interface as the
/// PostgreSQL implementation. Used by tests and by the server when no
/// database is configured.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }

    async fn ordered_matching(&self, query: &EventQuery) -> Vec<EventEnvelope> {
        let log = self.log.read().await;
        let mut events: Vec<_> = log
            .events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.order_key());
        events
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: LedgerEvent, options: AppendOptions) -> Result<EventEnvelope> {
        event.validate()?;

        let mut log = self.log.write().await;

        for (key, expected) in &options.expected_versions {
            let actual = log.versions.get(key).copied().unwrap_or_default();
            if actual != *expected {
                return Err(EventStoreError::ConcurrencyConflict {
                    key: *key,
                    expected: *expected,
                    actual,
                });
            }
        }

        let sequence = log.last_sequence.next();
        for key in event.balance_keys() {
            let version = log.versions.entry(key).or_default();
            *version = version.next();
        }
        let envelope = EventEnvelope::commit(event, sequence);
        log.last_sequence = sequence;
        log.events.push(envelope.clone());

        Ok(envelope)
    }

    async fn query_events(&self, query: EventQuery) -> Result<EventStream> {
        query.validate()?;
        let events = paginate(self.ordered_matching(&query).await, &query);
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        self.query_events(EventQuery::new()).await
    }

    async fn key_version(&self, key: BalanceKey) -> Result<Version> {
        let log = self.log.read().await;
        Ok(log.versions.get(&key).copied().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventKind, EventStoreExt, ValidationError};
    use chrono::{DateTime, TimeZone, Utc};
    use common::{EquipmentTypeId, SiteId};
    use futures_util::StreamExt;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn append_assigns_increasing_sequences() {
        let store = InMemoryEventStore::new();
        let site = SiteId::new();
        let rifle = EquipmentTypeId::new();

        let first = store
            .append(
                LedgerEvent::acquisition(site, rifle, 10, at(1), "qm"),
                AppendOptions::new(),
            )
            .await
            .unwrap();
        let second = store
            .append(
                LedgerEvent::acquisition(site, rifle, 5, at(1), "qm"),
                AppendOptions::new(),
            )
            .await
            .unwrap();

        assert!(first.sequence < second.sequence);
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn append_rejects_invalid_event_and_leaves_store_unchanged() {
        let store = InMemoryEventStore::new();
        let site = SiteId::new();

        let result = store
            .append(
                LedgerEvent::transfer(site, site, EquipmentTypeId::new(), 1, at(1), "qm"),
                AppendOptions::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::Validation(ValidationError::SelfTransfer))
        ));
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn transfer_bumps_both_key_versions() {
        let store = InMemoryEventStore::new();
        let a = SiteId::new();
        let b = SiteId::new();
        let rifle = EquipmentTypeId::new();

        store
            .append(
                LedgerEvent::transfer(a, b, rifle, 2, at(1), "qm"),
                AppendOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            store.key_version(BalanceKey::new(a, rifle)).await.unwrap(),
            Version::new(1)
        );
        assert_eq!(
            store.key_version(BalanceKey::new(b, rifle)).await.unwrap(),
            Version::new(1)
        );
        assert_eq!(
            store
                .key_version(BalanceKey::new(SiteId::new(), rifle))
                .await
                .unwrap(),
            Version::initial()
        );
    }

    #[tokio::test]
    async fn concurrency_conflict_on_stale_version() {
        let store = InMemoryEventStore::new();
        let site = SiteId::new();
        let rifle = EquipmentTypeId::new();
        let key = BalanceKey::new(site, rifle);

        store
            .append(
                LedgerEvent::acquisition(site, rifle, 1, at(1), "qm"),
                AppendOptions::expect_versions([(key, Version::initial())]),
            )
            .await
            .unwrap();

        let result = store
            .append(
                LedgerEvent::acquisition(site, rifle, 1, at(2), "qm"),
                AppendOptions::expect_versions([(key, Version::initial())]),
            )
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn query_orders_by_occurrence_not_commit() {
        let store = InMemoryEventStore::new();
        let site = SiteId::new();
        let rifle = EquipmentTypeId::new();

        for hour in [5, 1, 3] {
            store
                .append(
                    LedgerEvent::acquisition(site, rifle, hour as i64, at(hour), "qm"),
                    AppendOptions::new(),
                )
                .await
                .unwrap();
        }

        let events = store.collect_events(EventQuery::new()).await.unwrap();
        let quantities: Vec<_> = events.iter().map(|e| e.event.quantity).collect();
        assert_eq!(quantities, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn query_filters_and_paginates() {
        let store = InMemoryEventStore::new();
        let site = SiteId::new();
        let rifle = EquipmentTypeId::new();
        let ammo = EquipmentTypeId::new();

        for hour in 1..=4 {
            store
                .append(
                    LedgerEvent::acquisition(site, rifle, 10, at(hour), "qm"),
                    AppendOptions::new(),
                )
                .await
                .unwrap();
        }
        store
            .append(
                LedgerEvent::acquisition(site, ammo, 500, at(2), "qm"),
                AppendOptions::new(),
            )
            .await
            .unwrap();
        store
            .append(
                LedgerEvent::consumption(site, rifle, 1, at(3), "pvt. ray", "qm"),
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let query = EventQuery::new()
            .equipment_type(rifle)
            .kind(EventKind::Acquisition)
            .from(at(2))
            .offset(1)
            .limit(1);
        let events = store.collect_events(query).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].occurred_at(), at(3));
    }

    #[tokio::test]
    async fn repeated_query_is_restartable() {
        let store = InMemoryEventStore::new();
        let site = SiteId::new();
        let rifle = EquipmentTypeId::new();
        store
            .append(
                LedgerEvent::acquisition(site, rifle, 3, at(1), "qm"),
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let first: Vec<_> = store
            .query_events(EventQuery::for_key(BalanceKey::new(site, rifle)))
            .await
            .unwrap()
            .collect()
            .await;
        let second: Vec<_> = store
            .query_events(EventQuery::for_key(BalanceKey::new(site, rifle)))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(first.len(), 1);
        assert_eq!(
            first[0].as_ref().unwrap().event_id,
            second[0].as_ref().unwrap().event_id
        );
    }

    #[tokio::test]
    async fn oversized_limit_is_rejected() {
        let store = InMemoryEventStore::new();

        let result = store
            .query_events(EventQuery::new().limit(usize::MAX))
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::Validation(ValidationError::PageOutOfRange {
                field: "limit",
                ..
            }))
        ));
    }
}

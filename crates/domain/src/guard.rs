//! Consistency guard: the only way events reach the ledger.
//!
//! Each write locks the balance keys it touches, checks the effects
//! against the cached balances (or replays history for back-dated events),
//! appends with the expected per-key versions, and then updates the cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::{BalanceKey, EquipmentTypeId, SiteId};
use event_store::{
    AppendOptions, Effect, EventEnvelope, EventStore, EventStoreError, EventStoreExt, LedgerEvent,
    ValidationError, Version,
};
use projections::{
    BalanceView, CachedBalance, KeyState, Projection, Rejection, project_state, replay_checked,
};
use serde::Serialize;

use crate::catalog::Catalog;
use crate::error::DomainError;
use crate::locks::KeyLocks;

/// Default bound on waiting for key locks.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Post-commit balance of one affected key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SiteBalance {
    pub site: SiteId,
    pub equipment_type: EquipmentTypeId,
    pub balance: i64,
    pub allocated: i64,
    pub available: i64,
}

impl SiteBalance {
    fn new(key: BalanceKey, state: KeyState) -> Self {
        Self {
            site: key.site,
            equipment_type: key.equipment_type,
            balance: state.balance,
            allocated: state.allocated,
            available: state.available(),
        }
    }
}

/// A committed event with the balances it left behind, one per site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReceipt {
    pub event: EventEnvelope,
    pub balances: Vec<SiteBalance>,
}

impl CommitReceipt {
    pub fn balance_at(&self, site: SiteId) -> Option<&SiteBalance> {
        self.balances.iter().find(|b| b.site == site)
    }
}

/// Gates every write so no balance goes negative or over-allocated.
pub struct ConsistencyGuard<S: EventStore> {
    store: S,
    view: BalanceView,
    catalog: Arc<dyn Catalog>,
    locks: KeyLocks,
    lock_timeout: Duration,
}

impl<S: EventStore> ConsistencyGuard<S> {
    pub fn new(store: S, view: BalanceView, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            store,
            view,
            catalog,
            locks: KeyLocks::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn view(&self) -> &BalanceView {
        &self.view
    }

    /// Checks and commits one event, returning the post-commit balances.
    ///
    /// A rejected event leaves the ledger and the cache unchanged.
    #[tracing::instrument(skip(self, event), fields(kind = %event.kind(), quantity = event.quantity))]
    pub async fn propose_and_commit(&self, event: LedgerEvent) -> Result<CommitReceipt, DomainError> {
        let started = Instant::now();
        let kind = event.kind();

        match self.commit(event).await {
            Ok(receipt) => {
                metrics::counter!("ledger_events_committed_total", "kind" => kind.as_str())
                    .increment(1);
                metrics::histogram!("ledger_commit_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(
                    event_id = %receipt.event.event_id,
                    sequence = %receipt.event.sequence,
                    "event committed"
                );
                Ok(receipt)
            }
            Err(err) => {
                metrics::counter!("ledger_writes_rejected_total", "reason" => err.kind())
                    .increment(1);
                tracing::warn!(error = %err, "event rejected");
                Err(err)
            }
        }
    }

    async fn commit(&self, event: LedgerEvent) -> Result<CommitReceipt, DomainError> {
        event.validate()?;
        self.check_references(&event).await?;

        let keys = event.balance_keys();
        let _guards = self
            .locks
            .acquire(&keys, self.lock_timeout)
            .await
            .map_err(|key| DomainError::ContentionTimeout { key })?;

        // Another writer on the same store may have moved a key since the
        // cache last saw it
        let mut cached = Vec::with_capacity(keys.len());
        for key in &keys {
            let mut entry = self.view.get(*key).await;
            if self.store.key_version(*key).await? != entry.version {
                self.resync(*key).await?;
                entry = self.view.get(*key).await;
            }
            cached.push(entry);
        }
        let expected = AppendOptions::expect_versions(
            keys.iter().zip(&cached).map(|(key, c)| (*key, c.version)),
        );

        let at_tail = cached.iter().all(|c| c.is_tail(event.occurred_at));
        let envelope = if at_tail {
            self.check_at_tail(&event, &cached)?;
            let envelope = self.append(event, expected, &keys).await?;
            self.view.handle(&envelope).await?;
            envelope
        } else {
            let replayed = self.check_back_dated(&event).await?;
            tracing::debug!("back-dated event checked against history");
            let envelope = self.append(event, expected, &keys).await?;
            self.view.apply_replayed(&envelope, &replayed).await;
            envelope
        };

        let mut balances = Vec::with_capacity(keys.len());
        for key in keys {
            balances.push(SiteBalance::new(key, self.view.get(key).await.state));
        }

        Ok(CommitReceipt {
            event: envelope,
            balances,
        })
    }

    async fn check_references(&self, event: &LedgerEvent) -> Result<(), DomainError> {
        if self.catalog.equipment_type(event.equipment_type).await.is_none() {
            return Err(DomainError::equipment_type_not_found(event.equipment_type));
        }
        for site in event.sites() {
            if self.catalog.site(site).await.is_none() {
                return Err(DomainError::site_not_found(site));
            }
        }
        Ok(())
    }

    /// Checks each effect against the key's current tail state.
    fn check_at_tail(&self, event: &LedgerEvent, cached: &[CachedBalance]) -> Result<(), DomainError> {
        for ((site, effect), cached) in event.effects().into_iter().zip(cached) {
            cached
                .state
                .check(effect)
                .map_err(|rejection| rejected(site, event.equipment_type, rejection))?;
        }
        Ok(())
    }

    /// Replays each key's history with the event inserted at its place.
    ///
    /// The event will get the highest sequence, so it sorts after every
    /// recorded event with the same `occurred_at`.
    async fn check_back_dated(
        &self,
        event: &LedgerEvent,
    ) -> Result<Vec<(BalanceKey, KeyState)>, DomainError> {
        let mut replayed = Vec::new();

        for (site, effect) in event.effects() {
            let key = BalanceKey::new(site, event.equipment_type);
            let history = self.store.load_key(key).await?;

            let position = history
                .iter()
                .take_while(|e| e.occurred_at() <= event.occurred_at)
                .count();
            let mut effects: Vec<Effect> = history
                .iter()
                .filter_map(|e| e.event.effect_at(site))
                .collect();
            effects.insert(position, effect);

            let state = replay_checked(&effects, position)
                .map_err(|rejection| rejected(site, event.equipment_type, rejection))?;
            replayed.push((key, state));
        }

        Ok(replayed)
    }

    async fn append(
        &self,
        event: LedgerEvent,
        expected: AppendOptions,
        keys: &[BalanceKey],
    ) -> Result<EventEnvelope, DomainError> {
        match self.store.append(event, expected).await {
            Ok(envelope) => Ok(envelope),
            Err(EventStoreError::ConcurrencyConflict {
                key,
                expected,
                actual,
            }) => {
                tracing::warn!(%key, %expected, %actual, "stale balance cache, resyncing");
                for key in keys {
                    self.resync(*key).await?;
                }
                Err(DomainError::ContentionTimeout { key })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reloads one key's cached balance from the store.
    pub async fn resync(&self, key: BalanceKey) -> Result<(), DomainError> {
        let history = self.store.load_key(key).await?;
        let cached = CachedBalance {
            state: project_state(&history, key, DateTime::<Utc>::MAX_UTC),
            version: Version::new(history.len() as i64),
            last_event: history.last().map(EventEnvelope::order_key),
        };
        self.view.set(key, cached).await;
        Ok(())
    }
}

fn rejected(site: SiteId, equipment_type: EquipmentTypeId, rejection: Rejection) -> DomainError {
    match rejection {
        Rejection::Shortfall(shortfall) => DomainError::InsufficientBalance {
            site,
            equipment_type,
            available: shortfall.available,
            requested: shortfall.requested,
        },
        Rejection::Overflow { balance, requested } => {
            ValidationError::BalanceOverflow { balance, requested }.into()
        }
    }
}

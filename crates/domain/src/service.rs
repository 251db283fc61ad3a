//! Ledger service providing the operations callers use.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{EquipmentTypeId, SiteId};
use event_store::{EventKind, EventStore};
use projections::{BalanceView, ProjectionProcessor};

use crate::catalog::{Catalog, EquipmentType, Site};
use crate::commands::{RecordAcquisition, RecordAllocation, RecordConsumption, RecordTransfer};
use crate::error::DomainError;
use crate::gateway::{
    BalanceReport, Dashboard, DashboardFilters, EventListing, ListFilters, QueryGateway,
};
use crate::guard::{CommitReceipt, ConsistencyGuard, DEFAULT_LOCK_TIMEOUT};

/// Service for recording movements and reading balances.
///
/// Writes go through the [`ConsistencyGuard`], reads through the
/// [`QueryGateway`]. Both share one [`BalanceView`] cache.
pub struct LedgerService<S: EventStore> {
    guard: ConsistencyGuard<S>,
    gateway: QueryGateway<S>,
}

impl<S: EventStore + Clone> LedgerService<S> {
    /// Opens the ledger with the default lock timeout, rebuilding the balance
    /// cache from the full log.
    pub async fn open(store: S, catalog: Arc<dyn Catalog>) -> Result<Self, DomainError> {
        Self::open_with_timeout(store, catalog, DEFAULT_LOCK_TIMEOUT).await
    }

    #[tracing::instrument(skip(store, catalog))]
    pub async fn open_with_timeout(
        store: S,
        catalog: Arc<dyn Catalog>,
        lock_timeout: Duration,
    ) -> Result<Self, DomainError> {
        let view = BalanceView::new();

        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Box::new(view.clone()));
        processor.rebuild_all().await?;

        Ok(Self {
            guard: ConsistencyGuard::new(store.clone(), view.clone(), Arc::clone(&catalog))
                .with_lock_timeout(lock_timeout),
            gateway: QueryGateway::new(store, view, catalog),
        })
    }
}

impl<S: EventStore> LedgerService<S> {
    /// Returns a reference to the underlying guard.
    pub fn guard(&self) -> &ConsistencyGuard<S> {
        &self.guard
    }

    /// Records stock purchased into a site.
    #[tracing::instrument(skip(self))]
    pub async fn record_acquisition(
        &self,
        cmd: RecordAcquisition,
    ) -> Result<CommitReceipt, DomainError> {
        self.guard.propose_and_commit(cmd.into()).await
    }

    /// Records stock moved between two sites as one event.
    #[tracing::instrument(skip(self))]
    pub async fn record_transfer(&self, cmd: RecordTransfer) -> Result<CommitReceipt, DomainError> {
        self.guard.propose_and_commit(cmd.into()).await
    }

    /// Records stock checked out to a person.
    #[tracing::instrument(skip(self))]
    pub async fn record_allocation(
        &self,
        cmd: RecordAllocation,
    ) -> Result<CommitReceipt, DomainError> {
        self.guard.propose_and_commit(cmd.into()).await
    }

    /// Records stock expended at a site.
    #[tracing::instrument(skip(self))]
    pub async fn record_consumption(
        &self,
        cmd: RecordConsumption,
    ) -> Result<CommitReceipt, DomainError> {
        self.guard.propose_and_commit(cmd.into()).await
    }

    pub async fn get_dashboard(&self, filters: DashboardFilters) -> Result<Dashboard, DomainError> {
        self.gateway.dashboard(filters).await
    }

    pub async fn list_events(
        &self,
        kind: EventKind,
        filters: ListFilters,
    ) -> Result<Vec<EventListing>, DomainError> {
        self.gateway.list(kind, filters).await
    }

    pub async fn balance(
        &self,
        site: SiteId,
        equipment_type: EquipmentTypeId,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<BalanceReport, DomainError> {
        self.gateway.balance(site, equipment_type, as_of).await
    }

    pub async fn sites(&self) -> Vec<Site> {
        self.gateway.sites().await
    }

    pub async fn equipment_types(&self) -> Vec<EquipmentType> {
        self.gateway.equipment_types().await
    }
}

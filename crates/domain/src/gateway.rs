//! Query gateway: read-side operations composed from the projector and store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use common::{ActorId, BalanceKey, EquipmentTypeId, SiteId};
use event_store::{EventEnvelope, EventId, EventKind, EventQuery, EventStore, EventStoreExt, Movement};
use projections::{
    BalanceView, Breakdown, KeyState, WindowFilter, project_state, project_window,
};
use serde::Serialize;

use crate::catalog::{Catalog, EquipmentType, Site};
use crate::error::DomainError;

/// Dashboard filters. Omitted bounds default to the current year so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardFilters {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub site: Option<SiteId>,
    pub equipment_type: Option<EquipmentTypeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub opening: i64,
    pub closing: i64,
    pub net_movement: i64,
    pub assigned: i64,
    pub expended: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardBreakdown {
    pub purchases: i64,
    pub transfer_in: i64,
    pub transfer_out: i64,
}

impl From<Breakdown> for DashboardBreakdown {
    fn from(b: Breakdown) -> Self {
        Self {
            purchases: b.purchases,
            transfer_in: b.transfer_in,
            transfer_out: b.transfer_out,
        }
    }
}

/// Dashboard aggregate for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub metrics: DashboardMetrics,
    pub breakdown: DashboardBreakdown,
}

/// Filters for event listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilters {
    pub site: Option<SiteId>,
    pub equipment_type: Option<EquipmentTypeId>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// A site reference with its display name, if the catalog knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteRef {
    pub id: SiteId,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EquipmentTypeRef {
    pub id: EquipmentTypeId,
    pub name: Option<String>,
    pub unit: Option<String>,
}

/// One event shaped for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventListing {
    pub event_id: EventId,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: ActorId,
    pub equipment_type: EquipmentTypeRef,
    pub quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<SiteRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_site: Option<SiteRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_site: Option<SiteRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expended_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Balance of one key, either now or as of an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceReport {
    pub site: SiteId,
    pub equipment_type: EquipmentTypeId,
    pub balance: i64,
    pub allocated: i64,
    pub available: i64,
    pub as_of: Option<DateTime<Utc>>,
}

/// Read-side entry point. Performs no writes.
pub struct QueryGateway<S: EventStore> {
    store: S,
    view: BalanceView,
    catalog: Arc<dyn Catalog>,
}

impl<S: EventStore> QueryGateway<S> {
    pub fn new(store: S, view: BalanceView, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            store,
            view,
            catalog,
        }
    }

    /// Opening, closing and movement totals for a window.
    #[tracing::instrument(skip(self))]
    pub async fn dashboard(&self, filters: DashboardFilters) -> Result<Dashboard, DomainError> {
        self.check_filters(filters.site, filters.equipment_type)
            .await?;

        let now = Utc::now();
        let start = filters.start.unwrap_or_else(|| start_of_year(now));
        let end = filters.end.unwrap_or(now);
        if start > end {
            return Err(DomainError::InvalidRange { start, end });
        }

        let mut query = EventQuery::new().until(end);
        if let Some(site) = filters.site {
            query = query.site(site);
        }
        if let Some(equipment_type) = filters.equipment_type {
            query = query.equipment_type(equipment_type);
        }
        let events = self.store.collect_events(query).await?;

        let window_filter = WindowFilter {
            site: filters.site,
            equipment_type: filters.equipment_type,
        };
        let window = project_window(&events, &window_filter, start, end)?;
        tracing::debug!(events = events.len(), "dashboard projected");

        Ok(Dashboard {
            start,
            end,
            metrics: DashboardMetrics {
                opening: window.opening,
                closing: window.closing,
                net_movement: window.net_movement,
                assigned: window.assigned,
                expended: window.expended,
            },
            breakdown: window.breakdown.into(),
        })
    }

    /// Events of one kind, oldest first, with names resolved.
    #[tracing::instrument(skip(self))]
    pub async fn list(
        &self,
        kind: EventKind,
        filters: ListFilters,
    ) -> Result<Vec<EventListing>, DomainError> {
        if let (Some(start), Some(end)) = (filters.start, filters.end)
            && start > end
        {
            return Err(DomainError::InvalidRange { start, end });
        }

        let mut query = EventQuery::for_kind(kind);
        if let Some(site) = filters.site {
            query = query.site(site);
        }
        if let Some(equipment_type) = filters.equipment_type {
            query = query.equipment_type(equipment_type);
        }
        if let Some(start) = filters.start {
            query = query.from(start);
        }
        if let Some(end) = filters.end {
            query = query.until(end);
        }
        if let Some(limit) = filters.limit {
            query = query.limit(limit);
        }

        let events = self.store.collect_events(query).await?;
        let names = Names::load(self.catalog.as_ref()).await;
        Ok(events.into_iter().map(|e| names.listing(e)).collect())
    }

    /// Balance of one key. Without `as_of`, the current cached balance.
    #[tracing::instrument(skip(self))]
    pub async fn balance(
        &self,
        site: SiteId,
        equipment_type: EquipmentTypeId,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<BalanceReport, DomainError> {
        self.check_filters(Some(site), Some(equipment_type)).await?;
        let key = BalanceKey::new(site, equipment_type);

        let state: KeyState = match as_of {
            None => self.view.get(key).await.state,
            Some(instant) => {
                let history = self.store.load_key(key).await?;
                project_state(&history, key, instant)
            }
        };

        Ok(BalanceReport {
            site,
            equipment_type,
            balance: state.balance,
            allocated: state.allocated,
            available: state.available(),
            as_of,
        })
    }

    pub async fn sites(&self) -> Vec<Site> {
        self.catalog.sites().await
    }

    pub async fn equipment_types(&self) -> Vec<EquipmentType> {
        self.catalog.equipment_types().await
    }

    async fn check_filters(
        &self,
        site: Option<SiteId>,
        equipment_type: Option<EquipmentTypeId>,
    ) -> Result<(), DomainError> {
        if let Some(site) = site
            && self.catalog.site(site).await.is_none()
        {
            return Err(DomainError::site_not_found(site));
        }
        if let Some(equipment_type) = equipment_type
            && self.catalog.equipment_type(equipment_type).await.is_none()
        {
            return Err(DomainError::equipment_type_not_found(equipment_type));
        }
        Ok(())
    }
}

/// 1 January 00:00 UTC of the year containing `now`.
fn start_of_year(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Catalog snapshot for resolving a batch of listings.
struct Names {
    sites: HashMap<SiteId, String>,
    equipment_types: HashMap<EquipmentTypeId, EquipmentType>,
}

impl Names {
    async fn load(catalog: &dyn Catalog) -> Self {
        Self {
            sites: catalog
                .sites()
                .await
                .into_iter()
                .map(|s| (s.id, s.name))
                .collect(),
            equipment_types: catalog
                .equipment_types()
                .await
                .into_iter()
                .map(|t| (t.id, t))
                .collect(),
        }
    }

    fn site(&self, id: SiteId) -> SiteRef {
        SiteRef {
            id,
            name: self.sites.get(&id).cloned(),
        }
    }

    fn listing(&self, envelope: EventEnvelope) -> EventListing {
        let event = envelope.event;
        let equipment_type = self.equipment_types.get(&event.equipment_type);

        let mut listing = EventListing {
            event_id: envelope.event_id,
            kind: event.kind(),
            occurred_at: event.occurred_at,
            recorded_at: envelope.recorded_at,
            recorded_by: event.recorded_by,
            equipment_type: EquipmentTypeRef {
                id: event.equipment_type,
                name: equipment_type.map(|t| t.name.clone()),
                unit: equipment_type.map(|t| t.unit.clone()),
            },
            quantity: event.quantity,
            site: None,
            from_site: None,
            to_site: None,
            assigned_to: None,
            expended_by: None,
            note: None,
        };

        match event.movement {
            Movement::Acquisition { site, note } => {
                listing.site = Some(self.site(site));
                listing.note = note;
            }
            Movement::Transfer {
                from_site,
                to_site,
                note,
            } => {
                listing.from_site = Some(self.site(from_site));
                listing.to_site = Some(self.site(to_site));
                listing.note = note;
            }
            Movement::Allocation { site, assigned_to } => {
                listing.site = Some(self.site(site));
                listing.assigned_to = Some(assigned_to);
            }
            Movement::Consumption {
                site,
                expended_by,
                note,
            } => {
                listing.site = Some(self.site(site));
                listing.expended_by = Some(expended_by);
                listing.note = note;
            }
        }

        listing
    }
}

//! Recording and listing endpoints for the four kinds of movement.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use common::{EquipmentTypeId, SiteId};
use domain::{
    CommitReceipt, EventListing, ListFilters, RecordAcquisition, RecordAllocation,
    RecordConsumption, RecordTransfer,
};
use event_store::{EventKind, EventStore, parse_instant};
use serde::Deserialize;

use super::{Actor, AppState, parse_id, parse_optional_id, parse_optional_instant};
use crate::error::ApiError;

type Recorded = (StatusCode, Json<CommitReceipt>);

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct AcquisitionRequest {
    pub site_id: String,
    pub equipment_type_id: String,
    pub quantity: i64,
    pub occurred_at: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_site_id: String,
    pub to_site_id: String,
    pub equipment_type_id: String,
    pub quantity: i64,
    pub occurred_at: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AllocationRequest {
    pub site_id: String,
    pub equipment_type_id: String,
    pub quantity: i64,
    pub occurred_at: String,
    pub assigned_to: String,
}

#[derive(Debug, Deserialize)]
pub struct ConsumptionRequest {
    pub site_id: String,
    pub equipment_type_id: String,
    pub quantity: i64,
    pub occurred_at: String,
    pub expended_by: String,
    pub note: Option<String>,
}

/// Query string shared by the listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub site_id: Option<String>,
    pub equipment_type_id: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<usize>,
}

impl ListParams {
    fn into_filters(self) -> Result<ListFilters, ApiError> {
        Ok(ListFilters {
            site: parse_optional_id("site_id", self.site_id.as_deref())?,
            equipment_type: parse_optional_id(
                "equipment_type_id",
                self.equipment_type_id.as_deref(),
            )?,
            start: parse_optional_instant(self.start.as_deref())?,
            end: parse_optional_instant(self.end.as_deref())?,
            limit: self.limit,
        })
    }
}

// -- Recording handlers --

/// POST /acquisitions: record stock purchased into a site.
#[tracing::instrument(skip(state, payload))]
pub async fn record_acquisition<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    payload: Result<Json<AcquisitionRequest>, JsonRejection>,
) -> Result<Recorded, ApiError> {
    let Json(req) = payload?;
    let cmd = RecordAcquisition {
        site: parse_id::<SiteId>("site_id", &req.site_id)?,
        equipment_type: parse_id::<EquipmentTypeId>("equipment_type_id", &req.equipment_type_id)?,
        quantity: req.quantity,
        occurred_at: parse_instant(&req.occurred_at)?,
        note: req.note,
        recorded_by: actor,
    };

    let receipt = state.ledger.record_acquisition(cmd).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// POST /transfers: record stock moved between two sites.
#[tracing::instrument(skip(state, payload))]
pub async fn record_transfer<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Recorded, ApiError> {
    let Json(req) = payload?;
    let cmd = RecordTransfer {
        from_site: parse_id::<SiteId>("from_site_id", &req.from_site_id)?,
        to_site: parse_id::<SiteId>("to_site_id", &req.to_site_id)?,
        equipment_type: parse_id::<EquipmentTypeId>("equipment_type_id", &req.equipment_type_id)?,
        quantity: req.quantity,
        occurred_at: parse_instant(&req.occurred_at)?,
        note: req.note,
        recorded_by: actor,
    };

    let receipt = state.ledger.record_transfer(cmd).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// POST /allocations: record stock checked out to a person.
#[tracing::instrument(skip(state, payload))]
pub async fn record_allocation<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    payload: Result<Json<AllocationRequest>, JsonRejection>,
) -> Result<Recorded, ApiError> {
    let Json(req) = payload?;
    let cmd = RecordAllocation {
        site: parse_id::<SiteId>("site_id", &req.site_id)?,
        equipment_type: parse_id::<EquipmentTypeId>("equipment_type_id", &req.equipment_type_id)?,
        quantity: req.quantity,
        occurred_at: parse_instant(&req.occurred_at)?,
        assigned_to: req.assigned_to,
        recorded_by: actor,
    };

    let receipt = state.ledger.record_allocation(cmd).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// POST /consumptions: record stock expended at a site.
#[tracing::instrument(skip(state, payload))]
pub async fn record_consumption<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    payload: Result<Json<ConsumptionRequest>, JsonRejection>,
) -> Result<Recorded, ApiError> {
    let Json(req) = payload?;
    let cmd = RecordConsumption {
        site: parse_id::<SiteId>("site_id", &req.site_id)?,
        equipment_type: parse_id::<EquipmentTypeId>("equipment_type_id", &req.equipment_type_id)?,
        quantity: req.quantity,
        occurred_at: parse_instant(&req.occurred_at)?,
        expended_by: req.expended_by,
        note: req.note,
        recorded_by: actor,
    };

    let receipt = state.ledger.record_consumption(cmd).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

// -- Listing handlers --

async fn list<S: EventStore + Clone + 'static>(
    state: &AppState<S>,
    kind: EventKind,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<EventListing>>, ApiError> {
    let Query(params) = params?;
    let listings = state.ledger.list_events(kind, params.into_filters()?).await?;
    Ok(Json(listings))
}

/// GET /acquisitions
pub async fn list_acquisitions<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<EventListing>>, ApiError> {
    list(&state, EventKind::Acquisition, params).await
}

/// GET /transfers
pub async fn list_transfers<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<EventListing>>, ApiError> {
    list(&state, EventKind::Transfer, params).await
}

/// GET /allocations
pub async fn list_allocations<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<EventListing>>, ApiError> {
    list(&state, EventKind::Allocation, params).await
}

/// GET /consumptions
pub async fn list_consumptions<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<EventListing>>, ApiError> {
    list(&state, EventKind::Consumption, params).await
}

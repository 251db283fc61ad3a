//! Dashboard and balance read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use common::{EquipmentTypeId, SiteId};
use domain::{BalanceReport, Dashboard, DashboardFilters};
use event_store::EventStore;
use serde::Deserialize;

use super::{AppState, parse_id, parse_optional_id, parse_optional_instant};
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct DashboardParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub site_id: Option<String>,
    pub equipment_type_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceParams {
    pub site_id: String,
    pub equipment_type_id: String,
    pub as_of: Option<String>,
}

/// GET /dashboard: opening, closing and movement totals for a window.
///
/// Without `start` the window opens on 1 January of the current year;
/// without `end` it closes now.
#[tracing::instrument(skip(state))]
pub async fn dashboard<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<DashboardParams>, QueryRejection>,
) -> Result<Json<Dashboard>, ApiError> {
    let Query(params) = params?;
    let filters = DashboardFilters {
        start: parse_optional_instant(params.start.as_deref())?,
        end: parse_optional_instant(params.end.as_deref())?,
        site: parse_optional_id("site_id", params.site_id.as_deref())?,
        equipment_type: parse_optional_id(
            "equipment_type_id",
            params.equipment_type_id.as_deref(),
        )?,
    };

    Ok(Json(state.ledger.get_dashboard(filters).await?))
}

/// GET /balances: balance of one key, now or as of an instant.
#[tracing::instrument(skip(state))]
pub async fn balance<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<BalanceParams>, QueryRejection>,
) -> Result<Json<BalanceReport>, ApiError> {
    let Query(params) = params?;
    let site: SiteId = parse_id("site_id", &params.site_id)?;
    let equipment_type: EquipmentTypeId = parse_id("equipment_type_id", &params.equipment_type_id)?;
    let as_of = parse_optional_instant(params.as_of.as_deref())?;

    Ok(Json(state.ledger.balance(site, equipment_type, as_of).await?))
}

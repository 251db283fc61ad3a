//! Catalog lookups that feed the filter dropdowns.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use domain::{EquipmentType, Site};
use event_store::EventStore;

use super::AppState;

/// GET /sites: all sites, sorted by name.
pub async fn sites<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<Vec<Site>> {
    Json(state.ledger.sites().await)
}

/// GET /equipment-types: all equipment types, sorted by name.
pub async fn equipment_types<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<Vec<EquipmentType>> {
    Json(state.ledger.equipment_types().await)
}

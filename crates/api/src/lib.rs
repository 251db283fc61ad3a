//! HTTP API server with observability for the inventory ledger.
//!
//! Provides REST endpoints for recording movements, listing them, and
//! reading dashboards and balances, with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use domain::{Catalog, DomainError, LedgerService};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{catalog, health, movements, reports};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(health::check::<S>))
        .route("/sites", get(catalog::sites::<S>))
        .route("/equipment-types", get(catalog::equipment_types::<S>))
        .route(
            "/acquisitions",
            post(movements::record_acquisition::<S>).get(movements::list_acquisitions::<S>),
        )
        .route(
            "/transfers",
            post(movements::record_transfer::<S>).get(movements::list_transfers::<S>),
        )
        .route(
            "/allocations",
            post(movements::record_allocation::<S>).get(movements::list_allocations::<S>),
        )
        .route(
            "/consumptions",
            post(movements::record_consumption::<S>).get(movements::list_consumptions::<S>),
        )
        .route("/dashboard", get(reports::dashboard::<S>))
        .route("/balances", get(reports::balance::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Opens the ledger over `store`, rebuilding the balance cache from the log.
pub async fn create_state<S: EventStore + Clone + 'static>(
    store: S,
    catalog: Arc<dyn Catalog>,
    lock_timeout: Duration,
) -> Result<Arc<AppState<S>>, DomainError> {
    let ledger = LedgerService::open_with_timeout(store, catalog, lock_timeout).await?;
    Ok(Arc::new(AppState { ledger }))
}

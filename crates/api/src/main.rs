//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use domain::{Catalog, InMemoryCatalog};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let (text, json) = match config.log_format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

async fn load_catalog(config: &Config) -> Arc<dyn Catalog> {
    let catalog = match &config.catalog_path {
        Some(path) => InMemoryCatalog::load(path)
            .await
            .expect("failed to load catalog"),
        None => {
            tracing::warn!("CATALOG_PATH not set, starting with an empty catalog");
            InMemoryCatalog::new()
        }
    };

    tracing::info!(
        sites = catalog.sites().await.len(),
        equipment_types = catalog.equipment_types().await.len(),
        "catalog loaded"
    );
    Arc::new(catalog)
}

async fn serve<S: EventStore + Clone + 'static>(
    store: S,
    catalog: Arc<dyn Catalog>,
    config: &Config,
    metrics_handle: PrometheusHandle,
) {
    // Rebuild balances from the full log before accepting writes
    let state = api::create_state(store, catalog, config.lock_timeout)
        .await
        .expect("failed to open ledger");
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Load the catalog
    let catalog = load_catalog(&config).await;

    // 4. Pick the event store and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresEventStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL event store");
            serve(store, catalog, &config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, ledger is kept in memory only");
            serve(InMemoryEventStore::new(), catalog, &config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}

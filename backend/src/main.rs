//! Warehouse Engine - Backend Server
//!
//! Inventory tracking with a configurable attribute taxonomy, composed SKUs
//! and an append-only stock ledger.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warehouse_engine::{
    audit::TracingAuditSink, create_app, services::auth::BcryptVerifier,
    store::PgWarehouseStore, AppState, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warehouse_engine=debug,whe_server=debug,tower_http=debug,sqlx=warn,audit=info".into());
    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting Warehouse Engine Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let store = PgWarehouseStore::new(db_pool, config.inventory.max_conflict_retries);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    // Create application state
    let state = AppState::new(
        Arc::new(store),
        Arc::new(TracingAuditSink),
        Arc::new(BcryptVerifier),
        config,
    );
    tracing::info!(
        builtin_seeds = state.config.taxonomy.builtin_seeds,
        "Taxonomy seed catalog loaded"
    );

    // Build application
    let app = create_app(state);

    // Start server
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Warehouse Engine - backend library
//!
//! Attribute taxonomy, SKU composition, the append-only stock ledger and the
//! item lifecycle behind an axum HTTP API.

use std::sync::Arc;

use axum::{routing::get, Router};
use shared::taxonomy::{SeedCatalog, ValueRanking};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod audit;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;

use audit::AuditSink;
use services::auth::CredentialVerifier;
use store::WarehouseStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WarehouseStore>,
    pub audit: Arc<dyn AuditSink>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub seeds: Arc<SeedCatalog>,
    pub ranking: Arc<ValueRanking>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build state with the seed catalog and value ranking derived from `config`
    pub fn new(
        store: Arc<dyn WarehouseStore>,
        audit: Arc<dyn AuditSink>,
        verifier: Arc<dyn CredentialVerifier>,
        config: Config,
    ) -> Self {
        let seeds = if config.taxonomy.builtin_seeds {
            SeedCatalog::builtin()
        } else {
            SeedCatalog::empty()
        };
        Self {
            store,
            audit,
            verifier,
            seeds: Arc::new(seeds),
            ranking: Arc::new(config.value_ranking()),
            config: Arc::new(config),
        }
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Warehouse Engine API v1.0"
}

/// Liveness probe
async fn health_check() -> &'static str {
    "OK"
}

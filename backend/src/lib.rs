use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub mod catalog_operations;
pub mod config;

use catalog_operations::background_workers::BackgroundWorkers;
use catalog_operations::catalog_handlers::{
    get_restore, health, last_resync, list_backups, list_pitr_chunks, trigger_resync,
};
use catalog_operations::resync::Resyncer;

// --- Application State ---
#[derive(Clone)]
pub struct AppState {
    pub resyncer: Arc<Resyncer>,
    pub workers: BackgroundWorkers,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/resync", get(last_resync).post(trigger_resync))
        .route("/api/v1/backups", get(list_backups))
        .route("/api/v1/pitr", get(list_pitr_chunks))
        .route("/api/v1/restores/{name}", get(get_restore))
        .layer(cors)
        .with_state(state)
}

// main.rs

use anyhow::{Context, Result};
use std::{path::Path, sync::Arc};
use tokio::fs;
use tracing::info;

use backup_resync::catalog_operations::background_workers::{spawn_periodic, spawn_workers};
use backup_resync::catalog_operations::catalog::SqliteCatalog;
use backup_resync::catalog_operations::resync::{ResyncOptions, Resyncer, TOOL_VERSION};
use backup_resync::catalog_operations::store::LocalStore;
use backup_resync::config::ResyncConfig;
use backup_resync::{build_router, AppState};

// --- Main Entry Point ---
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = ResyncConfig::from_env()?;
    tracing_subscriber::fmt().with_max_level(cfg.log_level).init();

    info!(version = TOOL_VERSION, "Starting backup catalog resync service...");

    // Database Setup
    let db_file = cfg
        .database_url
        .strip_prefix("sqlite://")
        .map(|rest| rest.split('?').next().unwrap_or(rest))
        .filter(|path| !path.is_empty() && !path.starts_with(':'));
    if let Some(db_file) = db_file {
        let db_dir = Path::new(db_file).parent().unwrap_or_else(|| Path::new("."));
        if !db_dir.as_os_str().is_empty() {
            fs::create_dir_all(db_dir)
                .await
                .with_context(|| format!("Failed to create database directory: {}", db_dir.display()))?;
        }
    }
    let catalog = Arc::new(SqliteCatalog::connect(&cfg.database_url, cfg.db_max_conn).await?);

    // Storage Setup
    fs::create_dir_all(&cfg.storage_root)
        .await
        .context("Failed to create storage root directory")?;
    let storage = Arc::new(LocalStore::new(cfg.storage_root.clone()));

    let resyncer = Arc::new(Resyncer::new(
        storage,
        catalog,
        ResyncOptions {
            read_concurrency: cfg.read_concurrency,
            tool_version: TOOL_VERSION.to_string(),
        },
    ));

    // --- Background worker ---
    let workers = spawn_workers(Arc::clone(&resyncer));
    if cfg.resync_on_start {
        workers.request_resync();
    }
    if let Some(every) = cfg.resync_interval {
        info!(?every, "periodic resync enabled");
        spawn_periodic(workers.clone(), every);
    }

    let state = Arc::new(AppState { resyncer, workers });
    let app = build_router(state);

    let addr = cfg.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind TCP listener")?;

    info!("Listening on http://{}", addr);

    axum::serve(listener, app).await.context("Axum server failed")?;
    Ok(())
}

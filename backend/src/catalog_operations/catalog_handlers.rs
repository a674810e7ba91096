// catalog_handlers.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::background_workers::RunStatus;
use super::catalog::{CatalogStore, Collection};
use super::handler_utils::AppError;
use super::types::RestoreMeta;
use crate::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Queue a resync pass; the outcome shows up under `GET /api/v1/resync`.
pub async fn trigger_resync(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let queued = state.workers.request_resync();
    info!(queued, "resync requested");
    (StatusCode::ACCEPTED, Json(json!({ "queued": queued })))
}

pub async fn last_resync(State(state): State<Arc<AppState>>) -> Json<Option<RunStatus>> {
    Json(state.workers.last_run().await)
}

pub async fn list_backups(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Value>>, AppError> {
    list_collection(&state, Collection::Backups).await
}

pub async fn list_pitr_chunks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Value>>, AppError> {
    list_collection(&state, Collection::PitrChunks).await
}

async fn list_collection(state: &AppState, coll: Collection) -> Result<Json<Vec<Value>>, AppError> {
    let docs = state.resyncer.catalog().find_all(coll).await?;
    Ok(Json(docs.into_iter().map(|d| d.body).collect()))
}

pub async fn get_restore(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RestoreMeta>, AppError> {
    match state.resyncer.describe_restore(&name).await? {
        Some(meta) => Ok(Json(meta)),
        None => Err(AppError::NotFound(format!("restore {name}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_operations::background_workers::spawn_workers;
    use crate::catalog_operations::catalog::SqliteCatalog;
    use crate::catalog_operations::resync::{ResyncOptions, Resyncer};
    use crate::catalog_operations::store::{save_bytes, LocalStore};
    use crate::catalog_operations::types::Status;
    use tempfile::TempDir;

    async fn state() -> (TempDir, Arc<AppState>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path()));
        for (name, content) in [
            ("b1.pbm.json", r#"{"name":"b1","type":"external"}"#),
            ("pbmPitr/rs0/20240102/20240102030405.20240102031405.oplog.gz", "x"),
            (".pbm.restore/r1.json", r#"{"name":"r1","backup":"b1","type":"physical"}"#),
            (".pbm.restore/r1/cluster.starting", "7"),
        ] {
            save_bytes(store.as_ref(), name, content).await.unwrap();
        }
        let catalog = Arc::new(SqliteCatalog::in_memory().await.unwrap());
        let resyncer = Arc::new(Resyncer::new(store, catalog, ResyncOptions::default()));
        resyncer.resync_storage().await.unwrap();
        let workers = spawn_workers(resyncer.clone());
        (dir, Arc::new(AppState { resyncer, workers }))
    }

    #[tokio::test]
    async fn lists_catalog_contents() {
        let (_dir, state) = state().await;

        let Json(backups) = list_backups(State(state.clone())).await.unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0]["name"], json!("b1"));

        let Json(chunks) = list_pitr_chunks(State(state)).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0]["compression"], json!("gzip"));
    }

    #[tokio::test]
    async fn restore_lookup() {
        let (_dir, state) = state().await;

        let Json(meta) = get_restore(State(state.clone()), Path("r1".to_string())).await.unwrap();
        assert_eq!(meta.state.status, Some(Status::Starting));
        assert_eq!(meta.state.last_transition_ts, 7);

        let err = get_restore(State(state), Path("nope".to_string())).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn trigger_is_accepted() {
        let (_dir, state) = state().await;
        let (code, Json(body)) = trigger_resync(State(state)).await;
        assert_eq!(code, StatusCode::ACCEPTED);
        assert_eq!(body["queued"], json!(true));
    }
}

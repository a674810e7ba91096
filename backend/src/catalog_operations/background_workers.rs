use chrono::{DateTime, Utc};
use rand::{rng, Rng};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::resync::{ResyncReport, Resyncer};

/// Failed passes are re-queued until this many attempts were made.
pub const MAX_RESYNC_ATTEMPTS: u32 = 5;

// ───────────── Worker types ─────────────
#[derive(Clone, Debug)]
pub enum WorkItem {
    Resync { attempts: u32 },
}

#[derive(Clone, Debug, Serialize)]
pub struct RunStatus {
    pub finished_at: DateTime<Utc>,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ResyncReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct BackgroundWorkers {
    pub tx: mpsc::Sender<WorkItem>,
    last_run: Arc<RwLock<Option<RunStatus>>>,
}

impl BackgroundWorkers {
    /// Queues a resync pass. Returns `false` when the queue is already full
    /// of pending passes, in which case the request is covered by them.
    pub fn request_resync(&self) -> bool {
        match self.tx.try_send(WorkItem::Resync { attempts: 0 }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("resync already pending");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("resync worker is gone");
                false
            }
        }
    }

    pub async fn last_run(&self) -> Option<RunStatus> {
        self.last_run.read().await.clone()
    }
}

/// Spawn the resync worker. A single task drains the queue, so passes never
/// overlap.
pub fn spawn_workers(resyncer: Arc<Resyncer>) -> BackgroundWorkers {
    let (tx, mut rx) = mpsc::channel::<WorkItem>(4);
    let last_run = Arc::new(RwLock::new(None));

    let tx_clone = tx.clone();
    tokio::spawn({
        let last_run = Arc::clone(&last_run);
        async move {
            while let Some(item) = rx.recv().await {
                match item {
                    WorkItem::Resync { attempts } => {
                        let res = resyncer.resync_storage().await;
                        let mut status = RunStatus {
                            finished_at: Utc::now(),
                            attempt: attempts + 1,
                            report: None,
                            error: None,
                        };
                        match res {
                            Ok(report) => status.report = Some(report),
                            Err(e) => {
                                status.error = Some(format!("{e:#}"));
                                if attempts + 1 < MAX_RESYNC_ATTEMPTS {
                                    warn!(attempts, error = ?e, "resync failed; scheduling retry");
                                    let next = WorkItem::Resync { attempts: attempts + 1 };
                                    tokio::spawn(schedule_retry(tx_clone.clone(), next));
                                } else {
                                    error!(attempts, error = ?e, "resync retries exhausted");
                                }
                            }
                        }
                        *last_run.write().await = Some(status);
                    }
                }
            }
        }
    });

    BackgroundWorkers { tx, last_run }
}

/// Queue a pass every `every`, starting after the first period.
pub fn spawn_periodic(workers: BackgroundWorkers, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if workers.tx.is_closed() {
                break;
            }
            workers.request_resync();
        }
        info!("periodic resync stopped");
    })
}

/// Exponential backoff, capped at ~6.4s, plus 0-100ms jitter.
fn backoff_delay(attempts: u32) -> Duration {
    let base_delay = Duration::from_millis(100 * (1 << attempts.min(6)));
    let jitter = Duration::from_millis(rng().random_range(0..100));
    base_delay + jitter
}

async fn schedule_retry(tx: mpsc::Sender<WorkItem>, item: WorkItem) {
    let WorkItem::Resync { attempts } = &item;
    let delay = backoff_delay(*attempts);

    debug!(?item, ?delay, "scheduling retry with backoff");

    sleep(delay).await;

    if let Err(e) = tx.send(item).await {
        error!(error = ?e, "failed to enqueue retry work item");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_operations::catalog::{CatalogStore, Collection, SqliteCatalog};
    use crate::catalog_operations::resync::ResyncOptions;
    use crate::catalog_operations::store::{save_bytes, LocalStore};
    use tempfile::TempDir;

    async fn wait_for_run(workers: &BackgroundWorkers) -> RunStatus {
        for _ in 0..200 {
            if let Some(status) = workers.last_run().await {
                return status;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("resync pass never finished");
    }

    #[test]
    fn backoff_grows_then_caps() {
        for attempts in 0..10 {
            let d = backoff_delay(attempts);
            let base = 100 * (1u64 << attempts.min(6));
            assert!(d >= Duration::from_millis(base), "{attempts}: {d:?}");
            assert!(d < Duration::from_millis(base + 100), "{attempts}: {d:?}");
        }
    }

    #[tokio::test]
    async fn queued_pass_runs_and_is_recorded() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path()));
        save_bytes(
            store.as_ref(),
            "b1.pbm.json",
            r#"{"name":"b1","type":"physical","replsets":[]}"#,
        )
        .await
        .unwrap();
        let catalog = Arc::new(SqliteCatalog::in_memory().await.unwrap());
        let resyncer = Arc::new(Resyncer::new(store, catalog.clone(), ResyncOptions::default()));

        let workers = spawn_workers(resyncer);
        assert!(workers.last_run().await.is_none());
        assert!(workers.request_resync());

        let status = wait_for_run(&workers).await;
        assert_eq!(status.attempt, 1);
        assert!(status.error.is_none());
        assert_eq!(status.report.unwrap().backups_admitted, 1);
        assert_eq!(catalog.find_all(Collection::Backups).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_pass_records_error() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path()));
        save_bytes(store.as_ref(), ".pbm.restore/r1.json", "{broken").await.unwrap();
        let catalog = Arc::new(SqliteCatalog::in_memory().await.unwrap());
        let resyncer = Arc::new(Resyncer::new(store, catalog, ResyncOptions::default()));

        let workers = spawn_workers(resyncer);
        workers.request_resync();

        let status = wait_for_run(&workers).await;
        assert!(status.report.is_none());
        assert!(status.error.unwrap().contains("r1.json"));
    }
}

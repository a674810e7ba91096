//! Rebuilds the operational catalog from what the backup storage holds.
//!
//! Storage is the source of truth: agents on every node write metadata and
//! marker files there without coordinating with each other, and a resync
//! pass folds all of it back into the catalog collections.

use anyhow::{anyhow, Context, Result};
use futures_util::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::catalog::{CatalogStore, Collection, Document};
use super::physical_restore::{get_phys_restore_meta, PHYS_RESTORES_DIR};
use super::pitr::{chunk_from_fname, PITR_FS_PREFIX};
use super::store::{join_name, read_all, save_bytes, Storage, StorageError};
use super::types::{BackupMeta, BackupType, RestoreMeta};

/// Marker proving the storage was initialised by this tool.
pub const STOR_INIT_FILE: &str = ".pbm.init";
/// Suffix of backup metadata files.
pub const METADATA_FILE_SUFFIX: &str = ".pbm.json";

pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct ResyncOptions {
    /// Storage reads kept in flight while scanning backups and PITR chunks.
    pub read_concurrency: usize,
    /// Written into the init marker.
    pub tool_version: String,
}

impl Default for ResyncOptions {
    fn default() -> Self {
        Self { read_concurrency: 8, tool_version: TOOL_VERSION.to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    pub restores_refreshed: usize,
    pub restores_stale: usize,
    pub backups_admitted: usize,
    pub backups_skipped: usize,
    pub pitr_chunks: usize,
    pub pitr_skipped: usize,
}

pub struct Resyncer {
    storage: Arc<dyn Storage>,
    catalog: Arc<dyn CatalogStore>,
    opts: ResyncOptions,
}

impl Resyncer {
    pub fn new(storage: Arc<dyn Storage>, catalog: Arc<dyn CatalogStore>, opts: ResyncOptions) -> Self {
        Self { storage, catalog, opts }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Updates backup, restore and PITR metadata according to the storage.
    pub async fn resync_storage(&self) -> Result<ResyncReport> {
        let mut report = ResyncReport::default();

        self.init_storage().await.context("init storage")?;
        self.refresh_restores(&mut report).await?;

        let bcps = self
            .storage
            .list("", METADATA_FILE_SUFFIX)
            .await
            .context("get a backups list from the storage")?;
        debug!(count = bcps.len(), "got backups list");

        self.stage_collection(Collection::Backups, Collection::BackupsOld)
            .await
            .context("copy current backups meta to the old collection")?;
        self.stage_collection(Collection::PitrChunks, Collection::PitrChunksOld)
            .await
            .context("copy current pitr meta to the old collection")?;

        if bcps.is_empty() {
            // Nothing to restore from; PITR chunks without a base backup are useless.
            self.catalog.replace_all(Collection::Backups, Vec::new()).await.context("clear backups meta")?;
            self.catalog.replace_all(Collection::PitrChunks, Vec::new()).await.context("clear pitr meta")?;
            info!(?report, "resync finished: no backups in storage");
            return Ok(report);
        }

        let backups = self.load_backups(bcps.into_iter().map(|b| b.name).collect(), &mut report).await?;
        self.catalog
            .replace_all(Collection::Backups, backups)
            .await
            .context("insert retrieved backups meta")?;

        let chunks = self.load_pitr_chunks(&mut report).await?;
        self.catalog
            .replace_all(Collection::PitrChunks, chunks)
            .await
            .context("insert retrieved pitr meta")?;

        info!(?report, "resync finished");
        Ok(report)
    }

    async fn init_storage(&self) -> Result<()> {
        match self.storage.file_stat(STOR_INIT_FILE).await {
            Ok(_) | Err(StorageError::Empty) => Ok(()),
            Err(StorageError::NotExist) => {
                info!(version = %self.opts.tool_version, "initialising storage");
                save_bytes(self.storage.as_ref(), STOR_INIT_FILE, self.opts.tool_version.clone())
                    .await
                    .context("write init marker")
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn refresh_restores(&self, report: &mut ResyncReport) -> Result<()> {
        let rstrs = self
            .storage
            .list(PHYS_RESTORES_DIR, ".json")
            .await
            .context("get physical restores list from the storage")?;
        debug!(count = rstrs.len(), "got physical restores list");

        // Snapshots sit directly in the restores dir; deeper paths are markers.
        for rs in rstrs.into_iter().filter(|f| !f.name.contains('/')) {
            let path = join_name(&[PHYS_RESTORES_DIR, &rs.name]);
            let raw = read_all(self.storage.as_ref(), &path)
                .await
                .with_context(|| format!("get file {}", rs.name))?;
            let mut rmeta: RestoreMeta = serde_json::from_slice(&raw)
                .with_context(|| format!("decode meta {}", rs.name))?;

            let restore = rs.name.strip_suffix(".json").unwrap_or(&rs.name);
            if rmeta.name.is_empty() {
                rmeta.name = restore.to_string();
            }
            rmeta.meta_stem = restore.to_string();

            match get_phys_restore_meta(restore, self.storage.as_ref()).await {
                Ok(live) => {
                    rmeta.overlay_live(live);
                    report.restores_refreshed += 1;
                }
                Err(e) => {
                    error!(restore = %rs.name, error = %format!("{e:#}"), "parse physical restore status");
                    report.restores_stale += 1;
                }
            }

            let doc = Document::new(rmeta.name.clone(), &rmeta)?;
            self.catalog
                .upsert(Collection::Restores, doc)
                .await
                .with_context(|| format!("upsert restore {}/{}", rmeta.name, rmeta.backup))?;
        }

        Ok(())
    }

    /// Copies `coll` into `as_coll`, dropping whatever `as_coll` held.
    async fn stage_collection(&self, coll: Collection, as_coll: Collection) -> Result<()> {
        self.catalog
            .drop_collection(as_coll)
            .await
            .context("failed to remove old archive")?;
        let current = self.catalog.find_all(coll).await.context("get current data")?;
        self.catalog.insert_many(as_coll, current).await.context("insert")
    }

    async fn load_backups(
        &self,
        names: Vec<String>,
        report: &mut ResyncReport,
    ) -> Result<Vec<Document>> {
        let metas: Vec<(String, Result<BackupMeta>)> = stream::iter(names)
            .map(|name| {
                let storage = Arc::clone(&self.storage);
                async move {
                    let raw = read_all(storage.as_ref(), &name)
                        .await
                        .with_context(|| format!("read meta for {name}"))?;
                    let decoded = serde_json::from_slice::<BackupMeta>(&raw)
                        .with_context(|| format!("unmarshal backup meta [{name}]"));
                    Ok::<_, anyhow::Error>((name, decoded))
                }
            })
            .buffered(self.opts.read_concurrency.max(1))
            .try_collect()
            .await?;

        let mut docs = Vec::with_capacity(metas.len());
        for (fname, meta) in metas {
            let meta = match meta {
                Ok(m) => m,
                Err(e) => {
                    warn!(file = %fname, error = %format!("{e:#}"), "skip snapshot: bad metadata");
                    report.backups_skipped += 1;
                    continue;
                }
            };
            if let Err(e) = check_backup_files(&meta, self.storage.as_ref()).await {
                warn!(backup = %meta.name, error = %format!("{e:#}"), "skip snapshot");
                report.backups_skipped += 1;
                continue;
            }
            debug!(backup = %meta.name, "admit snapshot");
            docs.push(Document::new(meta.name.clone(), &meta)?);
            report.backups_admitted += 1;
        }
        Ok(docs)
    }

    async fn load_pitr_chunks(&self, report: &mut ResyncReport) -> Result<Vec<Document>> {
        let pitrf = self
            .storage
            .list(PITR_FS_PREFIX, "")
            .await
            .context("get list of pitr chunks")?;
        debug!(count = pitrf.len(), "got pitr files");

        let stats: Vec<(String, Option<u64>)> = stream::iter(pitrf)
            .map(|f| {
                let storage = Arc::clone(&self.storage);
                async move {
                    let full = join_name(&[PITR_FS_PREFIX, &f.name]);
                    match storage.file_stat(&full).await {
                        Ok(info) => Ok((f.name, Some(info.size))),
                        Err(e) if e.is_absent() => {
                            warn!(file = %full, error = %e, "skip pitr chunk");
                            Ok((f.name, None))
                        }
                        Err(e) => Err(anyhow!(e).context(format!("stat pitr chunk {full}"))),
                    }
                }
            })
            .buffered(self.opts.read_concurrency.max(1))
            .try_collect()
            .await?;

        let mut docs = Vec::new();
        for (fname, size) in stats {
            let Some(size) = size else {
                report.pitr_skipped += 1;
                continue;
            };
            match chunk_from_fname(&fname, size) {
                Some(chunk) => docs.push(Document::new(chunk.fname.clone(), &chunk)?),
                None => report.pitr_skipped += 1,
            }
        }
        report.pitr_chunks = docs.len();
        Ok(docs)
    }

    /// Stored restore record overlaid with the live status from its markers.
    pub async fn describe_restore(&self, name: &str) -> Result<Option<RestoreMeta>> {
        let Some(doc) = self.catalog.find_one(Collection::Restores, name).await? else {
            return Ok(None);
        };
        let mut rmeta: RestoreMeta = serde_json::from_value(doc.body)
            .with_context(|| format!("decode restore {name}"))?;

        let stem = match rmeta.meta_stem.as_str() {
            "" => name.to_string(),
            stem => stem.to_string(),
        };
        match get_phys_restore_meta(&stem, self.storage.as_ref()).await {
            Ok(live) => rmeta.overlay_live(live),
            Err(e) => warn!(restore = %name, error = %format!("{e:#}"), "live status unavailable"),
        }
        Ok(Some(rmeta))
    }
}

/// Logical backups must reference non-empty dump and oplog files.
/// Other backup types are admitted as-is.
pub async fn check_backup_files(bcp: &BackupMeta, stg: &dyn Storage) -> Result<()> {
    if bcp.kind != BackupType::Logical {
        return Ok(());
    }

    for rs in &bcp.replsets {
        for fname in [&rs.dump_name, &rs.oplog_name] {
            let f = stg.file_stat(fname).await.with_context(|| format!("file {fname}"))?;
            if f.size == 0 {
                return Err(anyhow!("{fname} is empty"));
            }
        }
    }

    Ok(())
}

// physical_restore.rs
use anyhow::{Context, Result};
use std::collections::BTreeMap;

use super::condition_log::{parse_marker, MarkerAddress, Scope};
use super::store::{join_name, read_all, Storage};
use super::types::{EntityStatus, RestoreMeta, RestoreNode, RestoreReplset};

/// Directory holding restore snapshots (`<name>.json`) and, per restore,
/// a subdirectory of marker files.
pub const PHYS_RESTORES_DIR: &str = ".pbm.restore";

#[derive(Default)]
struct ReplsetAcc {
    state: EntityStatus,
    nodes: BTreeMap<String, EntityStatus>,
}

/// Rebuilds the live status tree of one restore from its marker files.
///
/// Any marker that fails to read or decode fails the whole restore; names
/// that do not follow the marker layout are ignored. Replica sets and nodes
/// come out sorted by name.
pub async fn get_phys_restore_meta(restore: &str, stg: &dyn Storage) -> Result<RestoreMeta> {
    let dir = join_name(&[PHYS_RESTORES_DIR, restore]);
    let files = stg
        .list(&dir, "")
        .await
        .with_context(|| format!("get files of restore {restore}"))?;

    let mut cluster = EntityStatus::default();
    let mut replsets: BTreeMap<String, ReplsetAcc> = BTreeMap::new();

    for f in &files {
        let Some(addr) = MarkerAddress::parse(&f.name) else {
            tracing::debug!(%restore, file = %f.name, "skip unrecognised restore file");
            continue;
        };

        let path = join_name(&[&dir, &f.name]);
        let content = read_all(stg, &path)
            .await
            .with_context(|| format!("get file {}", f.name))?;
        let event = parse_marker(&f.name, addr.status, &content)?;

        match addr.scope {
            Scope::Cluster => cluster.apply(event),
            Scope::Replset(rs) => replsets.entry(rs).or_default().state.apply(event),
            Scope::Node { replset, node } => replsets
                .entry(replset)
                .or_default()
                .nodes
                .entry(node)
                .or_default()
                .apply(event),
        }
    }

    let replsets = replsets
        .into_iter()
        .map(|(name, acc)| RestoreReplset {
            name,
            state: acc.state,
            nodes: acc
                .nodes
                .into_iter()
                .map(|(name, state)| RestoreNode { name, state })
                .collect(),
        })
        .collect();

    Ok(RestoreMeta {
        name: restore.to_string(),
        state: cluster,
        replsets,
        ..Default::default()
    })
}

// types.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ──────────────────────────────────────────────────────
// Status codes
// ──────────────────────────────────────────────────────

/// Status carried by a marker file suffix. Agents may introduce new values,
/// so anything unrecognised is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Starting,
    Running,
    Done,
    Error,
    /// Liveness tick; never stored as a condition.
    Heartbeat,
    Other(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Starting => "starting",
            Status::Running => "running",
            Status::Done => "done",
            Status::Error => "error",
            Status::Heartbeat => "hb",
            Status::Other(s) => s,
        }
    }
}

impl From<&str> for Status {
    fn from(s: &str) -> Self {
        match s {
            "starting" => Status::Starting,
            "running" => Status::Running,
            "done" => Status::Done,
            "error" => Status::Error,
            "hb" => Status::Heartbeat,
            other => Status::Other(other.to_string()),
        }
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        Status::from(s.as_str())
    }
}

impl From<Status> for String {
    fn from(s: Status) -> Self {
        match s {
            Status::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────────────
// Conditions + heartbeat
// ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub timestamp: i64,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Condition history of one entity, kept sorted by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    /// Insert keeping timestamp order. Equal timestamps stay in arrival order.
    pub fn insert(&mut self, cond: Condition) {
        let pos = self.0.partition_point(|c| c.timestamp <= cond.timestamp);
        self.0.insert(pos, cond);
    }

    pub fn last(&self) -> Option<&Condition> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub last_seen: i64,
}

/// Status block shared by the cluster, replica set and node levels.
///
/// `status`, `last_transition_ts` and `error` mirror the last element of
/// `conditions`; they are only ever written by the aggregator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStatus {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub last_transition_ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub hb: Heartbeat,
    #[serde(default)]
    pub conditions: Conditions,
}

// ──────────────────────────────────────────────────────
// Restores
// ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreType {
    #[default]
    Logical,
    Physical,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreNode {
    pub name: String,
    #[serde(flatten)]
    pub state: EntityStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReplset {
    pub name: String,
    #[serde(flatten)]
    pub state: EntityStatus,
    #[serde(default)]
    pub nodes: Vec<RestoreNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub backup: String,
    #[serde(default, rename = "type")]
    pub kind: RestoreType,
    #[serde(flatten)]
    pub state: EntityStatus,
    #[serde(default)]
    pub replsets: Vec<RestoreReplset>,
    /// Stem of the `<stem>.json` snapshot the record was read from. Marker
    /// files live under `<stem>/`, which need not match `name`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub meta_stem: String,
    /// Agent-written fields this engine does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RestoreMeta {
    /// Replace the live-status parts of a stored snapshot. Identity fields
    /// (`name`, `backup`, `type`) and unknown fields are left untouched.
    pub fn overlay_live(&mut self, live: RestoreMeta) {
        self.state = live.state;
        self.replsets = live.replsets;
    }
}

// ──────────────────────────────────────────────────────
// Backups
// ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    #[default]
    Logical,
    Physical,
    Incremental,
    External,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupReplset {
    pub name: String,
    #[serde(default, rename = "backup_name")]
    pub dump_name: String,
    #[serde(default)]
    pub oplog_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupMeta {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: BackupType,
    #[serde(default)]
    pub replsets: Vec<BackupReplset>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ──────────────────────────────────────────────────────
// PITR chunks
// ──────────────────────────────────────────────────────

/// Cluster-time position: seconds plus an ordinal within that second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OplogTs {
    pub t: u32,
    pub i: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Pgzip,
    Snappy,
    Lz4,
    S2,
    Zstd,
}

impl Compression {
    /// Maps a file-name extension to the compression it denotes.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "gz" => Some(Compression::Gzip),
            "pgzip" => Some(Compression::Pgzip),
            "snappy" => Some(Compression::Snappy),
            "lz4" => Some(Compression::Lz4),
            "s2" => Some(Compression::S2),
            "zst" => Some(Compression::Zstd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitrChunk {
    pub rs: String,
    pub fname: String,
    pub compression: Compression,
    pub start_ts: OplogTs,
    pub end_ts: OplogTs,
    #[serde(default)]
    pub size: u64,
}

// catalog/mod.rs
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Logical collections of the operational catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Backups,
    BackupsOld,
    Restores,
    PitrChunks,
    PitrChunksOld,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Backups => "backups",
            Collection::BackupsOld => "backups-old",
            Collection::Restores => "restores",
            Collection::PitrChunks => "pitr-chunks",
            Collection::PitrChunksOld => "pitr-chunks-old",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub body: Value,
}

impl Document {
    pub fn new(key: impl Into<String>, body: &impl Serialize) -> Result<Self> {
        Ok(Self { key: key.into(), body: serde_json::to_value(body)? })
    }
}

// ──────────────────────────────────────────────────────
// CatalogStore trait
// ──────────────────────────────────────────────────────
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or replace the document stored under `doc.key`.
    async fn upsert(&self, coll: Collection, doc: Document) -> Result<()>;

    /// Every document of the collection, ordered by key.
    async fn find_all(&self, coll: Collection) -> Result<Vec<Document>>;

    async fn find_one(&self, coll: Collection, key: &str) -> Result<Option<Document>>;

    async fn insert_many(&self, coll: Collection, docs: Vec<Document>) -> Result<()>;

    async fn delete_all(&self, coll: Collection) -> Result<()>;

    async fn drop_collection(&self, coll: Collection) -> Result<()>;

    /// Swap the whole content of a collection in one step: readers see
    /// either the previous documents or `docs`, never a mix.
    async fn replace_all(&self, coll: Collection, docs: Vec<Document>) -> Result<()>;
}

pub use sqlite::SqliteCatalog;

mod sqlite;

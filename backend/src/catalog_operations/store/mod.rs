// store/mod.rs
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use std::{io, pin::Pin};

pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Name relative to the listed prefix (or the full name for `file_stat`).
    pub name: String,
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("file doesn't exist")]
    NotExist,
    #[error("file is empty")]
    Empty,
    #[error("invalid object name {0:?}")]
    InvalidName(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Missing or zero-length: the object carries nothing usable.
    pub fn is_absent(&self) -> bool {
        matches!(self, StorageError::NotExist | StorageError::Empty)
    }
}

// ──────────────────────────────────────────────────────
// Storage trait
// ──────────────────────────────────────────────────────
#[async_trait]
pub trait Storage: Send + Sync {
    async fn save(&self, name: &str, data: ByteStream, size_hint: Option<u64>) -> Result<(), StorageError>;

    /// Objects under `prefix` whose names end with the literal `suffix`.
    async fn list(&self, prefix: &str, suffix: &str) -> Result<Vec<FileInfo>, StorageError>;

    async fn file_stat(&self, name: &str) -> Result<FileInfo, StorageError>;

    async fn source_reader(&self, name: &str) -> Result<ByteStream, StorageError>;

    async fn delete(&self, name: &str) -> Result<(), StorageError>;

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError>;
}

pub async fn read_all(storage: &dyn Storage, name: &str) -> Result<Bytes, StorageError> {
    let mut stream = storage.source_reader(name).await?;
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

pub async fn save_bytes(storage: &dyn Storage, name: &str, data: impl Into<Bytes>) -> Result<(), StorageError> {
    let data: Bytes = data.into();
    let size = data.len() as u64;
    let body: ByteStream = Box::pin(futures_util::stream::once(async move { Ok(data) }));
    storage.save(name, body, Some(size)).await
}

/// Joins object name segments with `/`, skipping empty ones.
pub fn join_name(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

pub use local::LocalStore;

mod local;

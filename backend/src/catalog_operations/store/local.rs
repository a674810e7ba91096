// store/local.rs
use super::{ByteStream, FileInfo, Storage, StorageError};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::ReaderStream;

/// In-flight writes live here until they are renamed into place.
const TMP_DIR: &str = ".tmp";

/// Filesystem-backed storage rooted at a directory.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        let path = self.prefix_path(name)?;
        if path == self.root {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(path)
    }

    fn prefix_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        if name.starts_with('/') || name.contains('\\') {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        let mut path = self.root.clone();
        for seg in name.split('/') {
            match seg {
                "" | "." => continue,
                ".." => return Err(StorageError::InvalidName(name.to_string())),
                s => path.push(s),
            }
        }
        Ok(path)
    }

    fn tmp_path(&self) -> PathBuf {
        self.root
            .join(TMP_DIR)
            .join(format!("{}.tmp", uuid::Uuid::new_v4()))
    }

    async fn commit(&self, tmp: &Path, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(tmp, path).await?;
        Ok(())
    }
}

fn not_found_as_absent(e: std::io::Error) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotExist
    } else {
        StorageError::Io(e)
    }
}

/// Removes a temp file unless the write was committed.
struct TempGuard {
    path: PathBuf,
    committed: bool,
}

impl TempGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, committed: false }
    }

    fn mark_committed(mut self) {
        self.committed = true;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[async_trait]
impl Storage for LocalStore {
    async fn save(
        &self,
        name: &str,
        mut data: ByteStream,
        size_hint: Option<u64>,
    ) -> Result<(), StorageError> {
        let path = self.object_path(name)?;
        let tmp = self.tmp_path();
        fs::create_dir_all(self.root.join(TMP_DIR)).await?;

        let guard = TempGuard::new(tmp.clone());
        let file = fs::File::create(&tmp).await?;
        let capacity = size_hint
            .map(|s| s.clamp(8 * 1024, 8 * 1024 * 1024) as usize)
            .unwrap_or(256 * 1024);
        let mut writer = BufWriter::with_capacity(capacity, file);

        let mut written = 0u64;
        while let Some(chunk) = data.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        writer.get_mut().sync_data().await?;

        self.commit(&tmp, &path).await?;
        guard.mark_committed();

        tracing::debug!(%name, bytes = written, "object saved");
        Ok(())
    }

    async fn list(&self, prefix: &str, suffix: &str) -> Result<Vec<FileInfo>, StorageError> {
        let base = self.prefix_path(prefix)?;
        let tmp_dir = self.root.join(TMP_DIR);
        let mut results = Vec::new();

        match fs::metadata(&base).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return Ok(results),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(results),
            Err(e) => return Err(e.into()),
        }

        let mut dirs = vec![base.clone()];
        while let Some(dir) = dirs.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let ftype = entry.file_type().await?;
                if ftype.is_dir() {
                    if path != tmp_dir {
                        dirs.push(path);
                    }
                    continue;
                }
                let Ok(rel) = path.strip_prefix(&base) else { continue };
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if name.ends_with(suffix) {
                    let size = entry.metadata().await?.len();
                    results.push(FileInfo { name, size });
                }
            }
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn file_stat(&self, name: &str) -> Result<FileInfo, StorageError> {
        let path = self.object_path(name)?;
        let meta = fs::metadata(&path).await.map_err(not_found_as_absent)?;
        if meta.is_dir() {
            return Err(StorageError::NotExist);
        }
        if meta.len() == 0 {
            return Err(StorageError::Empty);
        }
        Ok(FileInfo { name: name.to_string(), size: meta.len() })
    }

    async fn source_reader(&self, name: &str) -> Result<ByteStream, StorageError> {
        let path = self.object_path(name)?;
        let file = fs::File::open(&path).await.map_err(not_found_as_absent)?;
        Ok(Box::pin(ReaderStream::with_capacity(file, 64 * 1024)))
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let path = self.object_path(name)?;
        fs::remove_file(&path).await.map_err(not_found_as_absent)
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        let from = self.object_path(src)?;
        let to = self.object_path(dst)?;
        let tmp = self.tmp_path();
        fs::create_dir_all(self.root.join(TMP_DIR)).await?;

        let guard = TempGuard::new(tmp.clone());
        fs::copy(&from, &tmp).await.map_err(not_found_as_absent)?;
        self.commit(&tmp, &to).await?;
        guard.mark_committed();
        Ok(())
    }
}

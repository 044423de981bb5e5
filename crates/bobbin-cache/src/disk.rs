use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::error::CacheResult;
use crate::traits::{lookup_from, Cache, Lookup};

/// On-disk cache storing one file per key.
///
/// Files are named by the BLAKE3 hash of the key and sharded into
/// subdirectories by the first two hex digits:
///
/// ```text
/// <root>/3f/3fa4...e1.cache
/// ```
///
/// Writes land in a uniquely named temp file that is then renamed into
/// place, so a reader sees either the whole value or no file. A file
/// removed from outside reads as a miss.
pub struct DiskCache {
    root: PathBuf,
    temp_counter: AtomicU64,
}

impl DiskCache {
    /// Create a cache rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            temp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    pub fn key_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(blake3::hash(key.as_bytes()).as_bytes());
        self.root
            .join(&digest[..2])
            .join(format!("{digest}.cache"))
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        path.with_extension(format!("tmp.{}.{n}", std::process::id()))
    }
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache").field("root", &self.root).finish()
    }
}

#[async_trait]
impl Cache for DiskCache {
    async fn lookup(&self, key: &str) -> CacheResult<Lookup> {
        let path = self.key_path(key);
        lookup_from(tokio::fs::read(&path).await.map(Bytes::from))
    }

    async fn write(&self, key: &str, value: Bytes) -> CacheResult<()> {
        let path = self.key_path(key);
        if let Some(shard) = path.parent() {
            tokio::fs::create_dir_all(shard).await?;
        }

        let temp_path = self.temp_path(&path);
        if let Err(err) = tokio::fs::write(&temp_path, &value).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(err.into());
        }
        if let Err(err) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(err.into());
        }
        trace!(key, path = %path.display(), bytes = value.len(), "wrote cache file");
        Ok(())
    }

    fn name(&self) -> &str {
        "disk"
    }
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::BufReader;

use super::error::StorageError;
use super::key::StorageKey;
use super::traits::{BoxReader, ObjectStore};

/// Filesystem-backed object store.
///
/// Objects are stored at `{root}/{storage key}`. Writes go through
/// `{root}/.tmp` and are renamed into place, so a reader never observes a
/// partially written object. Key segments cannot start with a dot, so the
/// scratch directory never collides with an owner directory.
pub struct FilesystemObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl FilesystemObjectStore {
    /// Create a new filesystem object store rooted at `root`.
    pub async fn new(
        root: PathBuf,
        public_base_url: impl Into<String>,
    ) -> Result<Self, StorageError> {
        fs::create_dir_all(&root).await?;
        fs::create_dir_all(root.join(".tmp")).await?;
        Ok(Self {
            root,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn object_path(&self, key: &StorageKey) -> PathBuf {
        self.root.join(key.to_string())
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.root
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }

    /// Write `data` to `path` via a scratch file and an atomic rename.
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove now-empty directories between `path` and the store root.
    async fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.root.as_path() || !dir.starts_with(&self.root) {
                break;
            }
            // Fails on non-empty directories, which ends the walk.
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(
        &self,
        data: &[u8],
        key: &StorageKey,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.object_path(key);
        self.write_atomic(&path, data).await?;
        tracing::debug!(key = %key, size = data.len(), "Stored object");
        Ok(self.url(key))
    }

    async fn move_object(
        &self,
        src: &StorageKey,
        dst: &StorageKey,
    ) -> Result<String, StorageError> {
        let src_path = self.object_path(src);
        let dst_path = self.object_path(dst);

        if fs::try_exists(&dst_path).await? {
            // A previous attempt already copied the object; finish the job.
            if src_path != dst_path && self.delete(src).await? {
                tracing::debug!(src = %src, dst = %dst, "Removed leftover source of earlier move");
            }
            return Ok(self.url(dst));
        }

        if !fs::try_exists(&src_path).await? {
            return Err(StorageError::NotFound(src.to_string()));
        }

        if let Some(parent) = dst_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(rename_err) = fs::rename(&src_path, &dst_path).await {
            // Rename fails across devices; fall back to copy + delete.
            tracing::debug!(error = %rename_err, "Rename failed, copying instead");
            let data = fs::read(&src_path).await?;
            self.write_atomic(&dst_path, &data).await?;
            fs::remove_file(&src_path).await?;
        }
        self.prune_empty_parents(&src_path).await;

        tracing::debug!(src = %src, dst = %dst, "Moved object");
        Ok(self.url(dst))
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError> {
        let path = self.object_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.prune_empty_parents(&path).await;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.object_path(key)).await?)
    }

    async fn get_stream(&self, key: &StorageKey) -> Result<BoxReader, StorageError> {
        match fs::File::open(self.object_path(key)).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, key: &StorageKey) -> Result<u64, StorageError> {
        match fs::metadata(self.object_path(key)).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, key: &StorageKey) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

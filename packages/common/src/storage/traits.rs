use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::error::StorageError;
use super::key::StorageKey;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Key/value binary store addressed by [`StorageKey`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under `key` and return the object's access URL.
    ///
    /// The object is durable once this returns. An existing object at `key`
    /// is overwritten.
    async fn put(
        &self,
        data: &[u8],
        key: &StorageKey,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Move an object to a new key (copy, then delete the source).
    ///
    /// Safe to retry: if `dst` already exists the move is considered done and
    /// any leftover `src` is removed. Fails with `NotFound` only when neither
    /// key exists.
    async fn move_object(&self, src: &StorageKey, dst: &StorageKey)
    -> Result<String, StorageError>;

    /// Delete an object.
    ///
    /// Returns `true` if the object was deleted, `false` if it did not exist.
    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError>;

    /// Check whether an object exists.
    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError>;

    /// Retrieve an object as a streaming async reader.
    async fn get_stream(&self, key: &StorageKey) -> Result<BoxReader, StorageError>;

    /// Get the size of an object in bytes.
    async fn size(&self, key: &StorageKey) -> Result<u64, StorageError>;

    /// Stable access URL for `key`.
    fn url(&self, key: &StorageKey) -> String;
}

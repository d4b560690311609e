/// Errors that can occur during object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(String),
    /// An I/O error occurred on a local backend.
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A remote backend rejected the request or was unreachable.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// The storage key (or one of its segments) is malformed.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Backend(_))
    }
}

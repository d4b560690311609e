use common::storage::StorageError;
use sea_orm::DbErr;
use thiserror::Error;

/// Failures of asset lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The upload violates the upload policy. Nothing was written.
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The caller does not own the asset.
    #[error("Asset {0} belongs to another user")]
    Unauthorized(String),

    /// An identifier that cannot become part of a storage key.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Object store error: {0}")]
    StoreIo(#[from] StorageError),

    #[error("Registry write failed: {0}")]
    RegistryWrite(String),

    #[error("Registry read failed: {0}")]
    RegistryRead(String),
}

impl LifecycleError {
    pub(crate) fn read(err: DbErr) -> Self {
        Self::RegistryRead(err.to_string())
    }

    pub(crate) fn write(err: DbErr) -> Self {
        Self::RegistryWrite(err.to_string())
    }
}

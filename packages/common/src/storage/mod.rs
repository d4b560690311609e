mod error;
mod key;
mod traits;

pub mod filesystem;
#[cfg(feature = "object-storage")]
pub mod s3;

use sha2::{Digest, Sha256};

pub use error::StorageError;
pub use key::{EntityType, Namespace, StorageKey, validate_segment};
pub use traits::{BoxReader, ObjectStore};

/// SHA-256 of `data` as a 64-character lowercase hex string.
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

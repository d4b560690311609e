use common::AssetState;
use common::reference::NormalizedRef;
use common::storage::{EntityType, StorageError, StorageKey};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::lifecycle::EntityRef;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "asset")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Uploader.
    pub owner_id: String,

    /// Stored filename, unique per upload. Last segment of `storage_key`.
    pub filename: String,

    /// Filename as supplied by the client.
    pub original_name: String,

    pub mime_type: String,

    pub size_bytes: i64,

    /// SHA-256 of the content, hex encoded.
    pub content_hash: String,

    /// `{owner}/temp/{filename}` or `{owner}/{namespace}/{entity_id}/{filename}`.
    #[sea_orm(unique)]
    pub storage_key: String,

    pub entity_type: Option<EntityType>,

    pub entity_id: Option<String>,

    pub state: AssetState,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parsed storage key of this asset.
    pub fn key(&self) -> Result<StorageKey, StorageError> {
        StorageKey::parse(&self.storage_key)
    }

    /// The content entity this asset is bound to, if any.
    pub fn entity(&self) -> Option<EntityRef> {
        match (self.entity_type, &self.entity_id) {
            (Some(entity_type), Some(entity_id)) => Some(EntityRef {
                entity_type,
                entity_id: entity_id.clone(),
            }),
            _ => None,
        }
    }

    /// Identity used to match this asset against body references.
    pub fn identity(&self) -> NormalizedRef {
        NormalizedRef {
            owner_id: self.owner_id.clone(),
            filename: self.filename.clone(),
        }
    }
}

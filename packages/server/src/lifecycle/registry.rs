use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AssetState;
use common::storage::{EntityType, Namespace, StorageKey};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, DatabaseConnection, QueryOrder};
use uuid::Uuid;

use super::{EntityRef, LifecycleError};
use crate::entity::asset;

/// Fields of a freshly uploaded asset.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub owner_id: String,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub content_hash: String,
    pub storage_key: String,
    pub entity: Option<EntityRef>,
    pub state: AssetState,
}

/// Partial update of an asset record. `updated_at` is always refreshed, so an
/// empty patch marks the asset as recently used.
#[derive(Debug, Clone, Default)]
pub struct AssetPatch {
    pub state: Option<AssetState>,
    pub storage_key: Option<String>,
    pub entity: Option<EntityRef>,
}

impl AssetPatch {
    pub fn touch() -> Self {
        Self::default()
    }

    /// Bind to `entity` and record the key the object now lives at.
    pub fn confirm(entity: &EntityRef, storage_key: &StorageKey) -> Self {
        Self {
            state: Some(AssetState::Confirmed),
            storage_key: Some(storage_key.to_string()),
            entity: Some(entity.clone()),
        }
    }

    pub fn relocate(storage_key: &StorageKey) -> Self {
        Self {
            storage_key: Some(storage_key.to_string()),
            ..Self::default()
        }
    }
}

/// Durable record of every asset and the key it lives at.
#[async_trait]
pub trait AssetRegistry: Send + Sync {
    async fn create(&self, asset: NewAsset) -> Result<asset::Model, LifecycleError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<asset::Model>, LifecycleError>;

    /// Assets of `owner_id` whose key lies in `namespace`, oldest first.
    async fn find_by_owner_and_namespace(
        &self,
        owner_id: &str,
        namespace: Namespace,
    ) -> Result<Vec<asset::Model>, LifecycleError> {
        let mut assets = self
            .find_by_key_prefix(&StorageKey::prefix(owner_id, namespace))
            .await?;
        assets.retain(|a| a.owner_id == owner_id && in_namespace(a, namespace));
        assets.sort_by_key(|a| a.created_at);
        Ok(assets)
    }

    async fn find_by_entity(&self, entity: &EntityRef)
    -> Result<Vec<asset::Model>, LifecycleError>;

    async fn find_by_storage_key(&self, key: &str)
    -> Result<Option<asset::Model>, LifecycleError>;

    /// The asset of `owner_id` stored under `filename`, in whatever namespace
    /// it currently lives.
    async fn find_by_identity(
        &self,
        owner_id: &str,
        filename: &str,
    ) -> Result<Option<asset::Model>, LifecycleError>;

    /// Assets whose storage key starts with `prefix`.
    async fn find_by_key_prefix(&self, prefix: &str) -> Result<Vec<asset::Model>, LifecycleError>;

    /// Staged assets not updated since `cutoff`.
    async fn find_staged_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<asset::Model>, LifecycleError>;

    /// Confirmed assets whose object is still at a staged key because the
    /// move during promotion failed.
    async fn find_unsettled_confirmed(&self) -> Result<Vec<asset::Model>, LifecycleError>;

    async fn update(&self, id: Uuid, patch: AssetPatch) -> Result<asset::Model, LifecycleError>;

    /// Returns whether a record was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, LifecycleError>;
}

/// [`AssetRegistry`] backed by the `asset` table.
#[derive(Clone)]
pub struct SeaOrmAssetRegistry {
    db: DatabaseConnection,
}

impl SeaOrmAssetRegistry {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn in_namespace(model: &asset::Model, namespace: Namespace) -> bool {
    model
        .key()
        .map(|key| key.namespace() == namespace)
        .unwrap_or(false)
}

/// A confirmed asset whose key does not sit under its own entity.
fn is_unsettled(model: &asset::Model) -> bool {
    match (model.key(), model.entity()) {
        (Ok(key), Some(entity)) => !key.belongs_to(entity.entity_type, &entity.entity_id),
        _ => false,
    }
}

#[async_trait]
impl AssetRegistry for SeaOrmAssetRegistry {
    async fn create(&self, asset: NewAsset) -> Result<asset::Model, LifecycleError> {
        let now = Utc::now();
        let (entity_type, entity_id): (Option<EntityType>, Option<String>) = match asset.entity {
            Some(entity) => (Some(entity.entity_type), Some(entity.entity_id)),
            None => (None, None),
        };

        let model = asset::ActiveModel {
            id: Set(Uuid::now_v7()),
            owner_id: Set(asset.owner_id),
            filename: Set(asset.filename),
            original_name: Set(asset.original_name),
            mime_type: Set(asset.mime_type),
            size_bytes: Set(asset.size_bytes),
            content_hash: Set(asset.content_hash),
            storage_key: Set(asset.storage_key),
            entity_type: Set(entity_type),
            entity_id: Set(entity_id),
            state: Set(asset.state),
            created_at: Set(now),
            updated_at: Set(now),
        };

        model.insert(&self.db).await.map_err(LifecycleError::write)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<asset::Model>, LifecycleError> {
        asset::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(LifecycleError::read)
    }

    async fn find_by_entity(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<asset::Model>, LifecycleError> {
        asset::Entity::find()
            .filter(asset::Column::EntityType.eq(entity.entity_type))
            .filter(asset::Column::EntityId.eq(entity.entity_id.as_str()))
            .order_by_asc(asset::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(LifecycleError::read)
    }

    async fn find_by_storage_key(
        &self,
        key: &str,
    ) -> Result<Option<asset::Model>, LifecycleError> {
        asset::Entity::find()
            .filter(asset::Column::StorageKey.eq(key))
            .one(&self.db)
            .await
            .map_err(LifecycleError::read)
    }

    async fn find_by_identity(
        &self,
        owner_id: &str,
        filename: &str,
    ) -> Result<Option<asset::Model>, LifecycleError> {
        asset::Entity::find()
            .filter(asset::Column::OwnerId.eq(owner_id))
            .filter(asset::Column::Filename.eq(filename))
            .one(&self.db)
            .await
            .map_err(LifecycleError::read)
    }

    async fn find_by_key_prefix(&self, prefix: &str) -> Result<Vec<asset::Model>, LifecycleError> {
        let rows = asset::Entity::find()
            .filter(asset::Column::StorageKey.starts_with(prefix))
            .order_by_asc(asset::Column::StorageKey)
            .all(&self.db)
            .await
            .map_err(LifecycleError::read)?;

        // LIKE treats `_` as a wildcard.
        Ok(rows
            .into_iter()
            .filter(|a| a.storage_key.starts_with(prefix))
            .collect())
    }

    async fn find_staged_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<asset::Model>, LifecycleError> {
        asset::Entity::find()
            .filter(asset::Column::State.eq(AssetState::Staged))
            .filter(asset::Column::UpdatedAt.lt(cutoff))
            .order_by_asc(asset::Column::UpdatedAt)
            .all(&self.db)
            .await
            .map_err(LifecycleError::read)
    }

    async fn find_unsettled_confirmed(&self) -> Result<Vec<asset::Model>, LifecycleError> {
        let rows = asset::Entity::find()
            .filter(asset::Column::State.eq(AssetState::Confirmed))
            .filter(asset::Column::StorageKey.contains("/temp/"))
            .order_by_asc(asset::Column::UpdatedAt)
            .all(&self.db)
            .await
            .map_err(LifecycleError::read)?;

        Ok(rows.into_iter().filter(is_unsettled).collect())
    }

    async fn update(&self, id: Uuid, patch: AssetPatch) -> Result<asset::Model, LifecycleError> {
        let existing = asset::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(LifecycleError::read)?
            .ok_or_else(|| LifecycleError::NotFound(format!("Asset {id}")))?;

        let mut active: asset::ActiveModel = existing.into();
        if let Some(state) = patch.state {
            active.state = Set(state);
        }
        if let Some(storage_key) = patch.storage_key {
            active.storage_key = Set(storage_key);
        }
        if let Some(entity) = patch.entity {
            active.entity_type = Set(Some(entity.entity_type));
            active.entity_id = Set(Some(entity.entity_id));
        }
        active.updated_at = Set(Utc::now());

        active.update(&self.db).await.map_err(LifecycleError::write)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, LifecycleError> {
        let result = asset::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(LifecycleError::write)?;
        Ok(result.rows_affected > 0)
    }
}

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::AssetState;
use common::batch::{BatchFailure, BatchOutcome, best_effort};
use common::reference::{AssetReference, NormalizedRef, ReferenceExtractor, rewrite};
use common::retry::{RetryPolicy, with_retry};
use common::storage::{
    BoxReader, EntityType, Namespace, ObjectStore, StorageError, StorageKey, checksum,
};
use futures::{StreamExt, stream};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::registry::{AssetPatch, AssetRegistry, NewAsset};
use super::{EntityRef, LifecycleError, UploadPolicy};
use crate::config::LifecycleConfig;
use crate::entity::asset;
use crate::utils::filename::stored_filename;

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub original_name: String,
    /// Content type declared by the client, if any.
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// An asset record together with its access URL.
#[derive(Debug, Clone)]
pub struct AssetDescriptor {
    pub asset: asset::Model,
    pub url: String,
}

/// Result of storing one file of an upload batch.
#[derive(Debug)]
pub struct UploadOutcome {
    pub original_name: String,
    pub result: Result<AssetDescriptor, LifecycleError>,
}

#[derive(Debug)]
pub struct ReconcileReport {
    /// The body with references to moved assets pointing at their new URLs.
    pub body: String,
    pub promoted: Vec<AssetDescriptor>,
    /// Staged uploads of the owner that the body no longer references.
    pub pruned: Vec<Uuid>,
    /// Assets of the entity that the body no longer references.
    pub released: Vec<Uuid>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug)]
pub struct ConfirmReport {
    pub kept: Vec<AssetDescriptor>,
    pub deleted: Vec<Uuid>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug)]
pub struct ReplaceReport {
    pub asset: AssetDescriptor,
    pub superseded: Vec<Uuid>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    /// Staged assets deleted after exceeding retention.
    pub expired: Vec<Uuid>,
    /// Confirmed assets whose pending move completed.
    pub settled: Vec<Uuid>,
    pub failed: Vec<BatchFailure>,
}

fn label(asset: &asset::Model) -> String {
    asset.id.to_string()
}

/// Coordinates the object store and the registry through every asset
/// transition.
///
/// Store calls come first and registry writes second, so a record never
/// points at an object that was not written. Batch transitions are best
/// effort: one failing asset is logged and reported while the rest proceed.
pub struct AssetLifecycle {
    store: Arc<dyn ObjectStore>,
    registry: Arc<dyn AssetRegistry>,
    extractor: ReferenceExtractor,
    policy: UploadPolicy,
    concurrency: usize,
    retry: RetryPolicy,
}

impl AssetLifecycle {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn AssetRegistry>,
        extractor: ReferenceExtractor,
        policy: UploadPolicy,
        config: &LifecycleConfig,
    ) -> Self {
        Self {
            store,
            registry,
            extractor,
            policy,
            concurrency: config.max_concurrency.max(1),
            retry: config.retry_policy(),
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn describe(&self, asset: asset::Model) -> AssetDescriptor {
        let url = match asset.key() {
            Ok(key) => self.store.url(&key),
            Err(_) => asset.storage_key.clone(),
        };
        AssetDescriptor { asset, url }
    }

    async fn store_call<T, F, Fut>(&self, operation: &str, attempt: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        with_retry(self.retry, operation, StorageError::is_transient, attempt).await
    }

    /// Store a batch of files of `owner_id`.
    ///
    /// Files are staged, or written straight into `entity` as confirmed
    /// assets when one is given. Each file is validated and stored
    /// independently; the outcomes keep the order of `files`. A file that
    /// fails validation writes nothing.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn upload(
        &self,
        owner_id: &str,
        files: Vec<UploadFile>,
        entity: Option<&EntityRef>,
    ) -> Result<Vec<UploadOutcome>, LifecycleError> {
        if let Some(entity) = entity
            && !entity.entity_type.has_body()
        {
            return Err(LifecycleError::InvalidReference(format!(
                "cannot upload into {} slots",
                entity.entity_type
            )));
        }
        if files.is_empty() {
            return Err(LifecycleError::UploadRejected("No files provided".into()));
        }
        if files.len() > self.policy.max_files() {
            return Err(LifecycleError::UploadRejected(format!(
                "At most {} files per upload",
                self.policy.max_files()
            )));
        }

        let outcomes: Vec<UploadOutcome> = stream::iter(files)
            .map(|file| async move {
                let original_name = file.original_name.clone();
                let result = self
                    .store_new(owner_id, file, entity)
                    .await
                    .map(|asset| self.describe(asset));
                UploadOutcome {
                    original_name,
                    result,
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let stored = outcomes.iter().filter(|o| o.result.is_ok()).count();
        info!(stored, rejected = outcomes.len() - stored, "Upload processed");
        Ok(outcomes)
    }

    /// Write one file and its record, staged or bound to `entity`.
    async fn store_new(
        &self,
        owner_id: &str,
        file: UploadFile,
        entity: Option<&EntityRef>,
    ) -> Result<asset::Model, LifecycleError> {
        let mime_type = self.policy.check(&file)?;
        let original_name = file.original_name.trim().to_string();
        let filename = stored_filename(&original_name);

        let key = match entity {
            Some(entity) => StorageKey::for_entity(
                owner_id,
                entity.entity_type,
                &entity.entity_id,
                &filename,
            ),
            None => StorageKey::staged(owner_id, &filename),
        }
        .map_err(|e| LifecycleError::InvalidReference(e.to_string()))?;

        self.store_call("put", || self.store.put(&file.data, &key, &mime_type))
            .await?;

        let record = NewAsset {
            owner_id: owner_id.to_string(),
            filename,
            original_name,
            mime_type,
            size_bytes: file.data.len() as i64,
            content_hash: checksum(&file.data),
            storage_key: key.to_string(),
            entity: entity.cloned(),
            state: if entity.is_some() {
                AssetState::Confirmed
            } else {
                AssetState::Staged
            },
        };

        match self.registry.create(record).await {
            Ok(asset) => {
                info!(asset_id = %asset.id, key = %asset.storage_key, "Stored asset");
                Ok(asset)
            }
            Err(e) => {
                // No object may outlive a failed record insert.
                if let Err(cleanup) = self.store.delete(&key).await {
                    warn!(key = %key, error = %cleanup, "Failed to remove object after registry error");
                }
                Err(e)
            }
        }
    }

    /// Bring the assets of `entity` in line with the references in its saved
    /// body.
    ///
    /// Referenced staged uploads of `owner_id` are promoted into the entity's
    /// namespace, unreferenced staged uploads of `owner_id` are pruned, and
    /// assets of the entity that the body dropped are released. Returns the
    /// body rewritten to the final URLs.
    #[instrument(skip(self, body), fields(entity = %entity))]
    pub async fn reconcile_on_save(
        &self,
        owner_id: &str,
        entity: &EntityRef,
        body: &str,
    ) -> Result<ReconcileReport, LifecycleError> {
        if !entity.entity_type.has_body() {
            return Err(LifecycleError::InvalidReference(format!(
                "{} entities have no body",
                entity.entity_type
            )));
        }

        let references = self.extractor.extract(body);
        let wanted: BTreeSet<NormalizedRef> =
            references.iter().map(AssetReference::normalized).collect();

        let staged: Vec<asset::Model> = self
            .registry
            .find_by_owner_and_namespace(owner_id, Namespace::Temp)
            .await?
            .into_iter()
            .filter(|a| a.state == AssetState::Staged)
            .collect();
        let (to_promote, to_prune): (Vec<_>, Vec<_>) = staged
            .into_iter()
            .partition(|a| wanted.contains(&a.identity()));
        let to_release: Vec<asset::Model> = self
            .registry
            .find_by_entity(entity)
            .await?
            .into_iter()
            .filter(|a| !wanted.contains(&a.identity()))
            .collect();

        let promoted = best_effort(to_promote, self.concurrency, label, move |a| {
            self.promote(a, entity)
        })
        .await;
        let pruned = best_effort(to_prune, self.concurrency, label, move |a| self.remove(a)).await;
        let released =
            best_effort(to_release, self.concurrency, label, move |a| self.remove(a)).await;

        let locations: HashMap<NormalizedRef, StorageKey> = self
            .registry
            .find_by_entity(entity)
            .await?
            .iter()
            .filter_map(|a| a.key().ok().map(|key| (a.identity(), key)))
            .collect();
        let body = rewrite(body, &references, |reference| {
            locations
                .get(&reference.normalized())
                .filter(|key| **key != reference.key)
                .map(|key| self.store.url(key))
        });

        info!(
            promoted = promoted.succeeded.len(),
            pruned = pruned.succeeded.len(),
            released = released.succeeded.len(),
            failed = promoted.failed.len() + pruned.failed.len() + released.failed.len(),
            "Reconciled assets on save"
        );

        Ok(ReconcileReport {
            body,
            promoted: promoted
                .succeeded
                .into_iter()
                .map(|a| self.describe(a))
                .collect(),
            pruned: pruned.succeeded,
            released: released.succeeded,
            failed: [promoted.failed, pruned.failed, released.failed].concat(),
        })
    }

    /// Move a staged asset under `entity` and confirm it.
    ///
    /// When the move fails the asset is still confirmed and bound, but keeps
    /// its staged key; [`Self::sweep`] completes the move later.
    async fn promote(
        &self,
        asset: asset::Model,
        entity: &EntityRef,
    ) -> Result<asset::Model, LifecycleError> {
        let current = asset.key()?;
        let target = current.with_entity(entity.entity_type, &entity.entity_id)?;

        match self
            .store_call("move", || self.store.move_object(&current, &target))
            .await
        {
            Ok(_) => match self
                .registry
                .update(asset.id, AssetPatch::confirm(entity, &target))
                .await
            {
                Ok(updated) => Ok(updated),
                Err(e) => {
                    if let Err(undo) = self.store.move_object(&target, &current).await {
                        warn!(asset_id = %asset.id, error = %undo, "Failed to undo move after registry error");
                    }
                    Err(e)
                }
            },
            Err(e) => {
                warn!(asset_id = %asset.id, error = %e, "Move failed, confirming at staged key");
                self.registry
                    .update(asset.id, AssetPatch::confirm(entity, &current))
                    .await?;
                Err(e.into())
            }
        }
    }

    /// Delete the object, then its record. The record survives a failed
    /// store delete so the removal can be retried.
    async fn remove(&self, asset: asset::Model) -> Result<Uuid, LifecycleError> {
        match asset.key() {
            Ok(key) => {
                self.store_call("delete", || self.store.delete(&key)).await?;
            }
            Err(e) => {
                warn!(asset_id = %asset.id, key = %asset.storage_key, error = %e, "Unparseable storage key, dropping record only");
            }
        }
        self.registry.delete(asset.id).await?;
        Ok(asset.id)
    }

    /// Delete every asset bound to `entity`.
    #[instrument(skip(self), fields(entity = %entity))]
    pub async fn cascade_delete_entity(
        &self,
        entity: &EntityRef,
    ) -> Result<BatchOutcome<Uuid>, LifecycleError> {
        let assets = self.registry.find_by_entity(entity).await?;
        let outcome = best_effort(assets, self.concurrency, label, move |a| self.remove(a)).await;
        if outcome.is_complete() {
            info!(deleted = outcome.succeeded.len(), "Cascade delete finished");
        } else {
            warn!(
                deleted = outcome.succeeded.len(),
                failed = outcome.failed.len(),
                "Cascade delete left assets behind"
            );
        }
        Ok(outcome)
    }

    /// Store `file` as the single asset of the `(entity_type, owner_id)` slot
    /// and delete whatever occupied it before.
    ///
    /// The new asset is written before the old ones are touched, so a failed
    /// upload leaves the previous asset in place.
    #[instrument(skip(self, file), fields(slot = %entity_type))]
    pub async fn replace_singleton(
        &self,
        owner_id: &str,
        entity_type: EntityType,
        file: UploadFile,
    ) -> Result<ReplaceReport, LifecycleError> {
        if entity_type.has_body() {
            return Err(LifecycleError::InvalidReference(format!(
                "{entity_type} is not a single-asset slot"
            )));
        }
        let slot = EntityRef::new(entity_type, owner_id)?;
        let previous = self.registry.find_by_entity(&slot).await?;

        let created = self.store_new(owner_id, file, Some(&slot)).await?;

        let stale: Vec<asset::Model> = previous
            .into_iter()
            .filter(|a| a.id != created.id)
            .collect();
        let superseded = best_effort(stale, self.concurrency, label, move |a| self.remove(a)).await;

        Ok(ReplaceReport {
            asset: self.describe(created),
            superseded: superseded.succeeded,
            failed: superseded.failed,
        })
    }

    /// Keep the `selected` uploads of `owner_id` and delete the rest of its
    /// staged uploads.
    ///
    /// Every selected id is checked for existence and ownership before
    /// anything changes. With an `entity`, kept staged assets are promoted
    /// into it right away; without one they stay staged and their retention
    /// clock restarts.
    #[instrument(skip(self, selected), fields(selected = selected.len()))]
    pub async fn confirm_selection(
        &self,
        owner_id: &str,
        selected: &[Uuid],
        entity: Option<&EntityRef>,
    ) -> Result<ConfirmReport, LifecycleError> {
        if let Some(entity) = entity
            && !entity.entity_type.has_body()
        {
            return Err(LifecycleError::InvalidReference(format!(
                "cannot confirm into {} slots",
                entity.entity_type
            )));
        }

        let mut chosen = Vec::with_capacity(selected.len());
        let mut chosen_ids = HashSet::with_capacity(selected.len());
        for id in selected {
            if !chosen_ids.insert(*id) {
                continue;
            }
            let asset = self
                .registry
                .find_by_id(*id)
                .await?
                .ok_or_else(|| LifecycleError::NotFound(format!("Asset {id}")))?;
            if asset.owner_id != owner_id {
                return Err(LifecycleError::Unauthorized(id.to_string()));
            }
            chosen.push(asset);
        }

        let discarded: Vec<asset::Model> = self
            .registry
            .find_by_owner_and_namespace(owner_id, Namespace::Temp)
            .await?
            .into_iter()
            .filter(|a| a.state == AssetState::Staged && !chosen_ids.contains(&a.id))
            .collect();

        let deleted = best_effort(discarded, self.concurrency, label, move |a| self.remove(a)).await;
        let kept = best_effort(chosen, self.concurrency, label, move |a| self.keep(a, entity)).await;

        Ok(ConfirmReport {
            kept: kept.succeeded.into_iter().map(|a| self.describe(a)).collect(),
            deleted: deleted.succeeded,
            failed: [deleted.failed, kept.failed].concat(),
        })
    }

    async fn keep(
        &self,
        asset: asset::Model,
        entity: Option<&EntityRef>,
    ) -> Result<asset::Model, LifecycleError> {
        match (asset.state, entity) {
            (AssetState::Staged, Some(entity)) => self.promote(asset, entity).await,
            (AssetState::Staged, None) => self.registry.update(asset.id, AssetPatch::touch()).await,
            (AssetState::Confirmed, _) => Ok(asset),
        }
    }

    /// Delete staged assets untouched for longer than `retention` and finish
    /// moves that failed during promotion.
    #[instrument(skip(self))]
    pub async fn sweep(&self, retention: Duration) -> Result<SweepReport, LifecycleError> {
        let age = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let stale = self.registry.find_staged_before(cutoff).await?;
        let expired = best_effort(stale, self.concurrency, label, move |a| self.remove(a)).await;

        let unsettled = self.registry.find_unsettled_confirmed().await?;
        let settled = best_effort(unsettled, self.concurrency, label, move |a| self.settle(a)).await;

        info!(
            expired = expired.succeeded.len(),
            settled = settled.succeeded.len(),
            failed = expired.failed.len() + settled.failed.len(),
            "Asset sweep finished"
        );

        Ok(SweepReport {
            expired: expired.succeeded,
            settled: settled.succeeded,
            failed: [expired.failed, settled.failed].concat(),
        })
    }

    async fn settle(&self, asset: asset::Model) -> Result<Uuid, LifecycleError> {
        let entity = asset.entity().ok_or_else(|| {
            LifecycleError::InvalidReference(format!("Asset {} is confirmed without an entity", asset.id))
        })?;
        let current = asset.key()?;
        let target = current.with_entity(entity.entity_type, &entity.entity_id)?;

        self.store_call("move", || self.store.move_object(&current, &target))
            .await?;
        self.registry
            .update(asset.id, AssetPatch::relocate(&target))
            .await?;
        Ok(asset.id)
    }

    /// An asset of `owner_id` by id.
    pub async fn get_owned(
        &self,
        owner_id: &str,
        id: Uuid,
    ) -> Result<AssetDescriptor, LifecycleError> {
        let asset = self
            .registry
            .find_by_id(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("Asset {id}")))?;
        if asset.owner_id != owner_id {
            return Err(LifecycleError::Unauthorized(id.to_string()));
        }
        Ok(self.describe(asset))
    }

    /// Staged uploads of `owner_id`, oldest first.
    pub async fn list_staged(&self, owner_id: &str) -> Result<Vec<AssetDescriptor>, LifecycleError> {
        Ok(self
            .registry
            .find_by_owner_and_namespace(owner_id, Namespace::Temp)
            .await?
            .into_iter()
            .filter(|a| a.state == AssetState::Staged)
            .map(|a| self.describe(a))
            .collect())
    }

    /// The asset addressed by a public key.
    ///
    /// Keys are matched exactly first, then by owner and filename, so a URL
    /// captured before promotion keeps resolving after the asset moved.
    pub async fn resolve(&self, raw_key: &str) -> Result<asset::Model, LifecycleError> {
        let key = StorageKey::parse(raw_key)
            .map_err(|_| LifecycleError::NotFound(format!("Object {raw_key}")))?;

        if let Some(asset) = self.registry.find_by_storage_key(raw_key).await? {
            return Ok(asset);
        }
        self.registry
            .find_by_identity(key.owner_id(), key.filename())
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("Object {raw_key}")))
    }

    pub async fn open(&self, asset: &asset::Model) -> Result<BoxReader, LifecycleError> {
        let key = asset.key()?;
        self.store.get_stream(&key).await.map_err(|e| match e {
            StorageError::NotFound(k) => LifecycleError::NotFound(format!("Object {k}")),
            other => other.into(),
        })
    }
}

//! Asset lifecycle: staging, promotion, pruning and cleanup of uploaded
//! binary assets referenced from content bodies.

mod error;
mod orchestrator;
mod policy;
mod registry;
mod sweeper;

use std::fmt;

use common::storage::{EntityType, validate_segment};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use error::LifecycleError;
pub use orchestrator::{
    AssetDescriptor, AssetLifecycle, ConfirmReport, ReconcileReport, ReplaceReport, SweepReport,
    UploadFile, UploadOutcome,
};
pub use policy::UploadPolicy;
pub use registry::{AssetPatch, AssetRegistry, NewAsset, SeaOrmAssetRegistry};
pub use sweeper::run_asset_sweeper;

/// A content entity that assets can be bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, entity_id: &str) -> Result<Self, LifecycleError> {
        validate_segment(entity_id)
            .map_err(|e| LifecycleError::InvalidReference(e.to_string()))?;
        Ok(Self {
            entity_type,
            entity_id: entity_id.to_string(),
        })
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

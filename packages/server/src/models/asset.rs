use chrono::{DateTime, Utc};
use common::{AssetState, BatchFailure};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::{
    AssetDescriptor, ConfirmReport, EntityRef, ReplaceReport, SweepReport, UploadOutcome,
};

/// Response DTO for a single asset.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AssetResponse {
    /// Asset ID (UUIDv7).
    #[schema(example = "01936f0e-1234-7abc-8000-000000000001")]
    pub id: Uuid,
    /// Access URL to embed in content bodies.
    #[schema(example = "/files/u1/temp/01936f0e12347abc8000000000000002.png")]
    pub url: String,
    /// Stored filename, unique per upload.
    #[schema(example = "01936f0e12347abc8000000000000002.png")]
    pub filename: String,
    /// Filename as uploaded.
    #[schema(example = "diagram.png")]
    pub original_name: String,
    #[schema(example = "image/png")]
    pub mime_type: String,
    #[schema(example = 142857)]
    pub size_bytes: i64,
    /// SHA-256 content hash.
    pub content_hash: String,
    pub state: AssetState,
    /// Whether the asset is bound to a content entity.
    pub confirmed: bool,
    /// Content entity the asset is bound to. Absent while staged.
    pub entity: Option<EntityRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AssetDescriptor> for AssetResponse {
    fn from(descriptor: AssetDescriptor) -> Self {
        let entity = descriptor.asset.entity();
        let model = descriptor.asset;
        Self {
            id: model.id,
            url: descriptor.url,
            filename: model.filename,
            original_name: model.original_name,
            mime_type: model.mime_type,
            size_bytes: model.size_bytes,
            content_hash: model.content_hash,
            state: model.state,
            confirmed: model.state.is_confirmed(),
            entity,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Outcome for one file of an upload request.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadResultItem {
    /// Filename as uploaded.
    pub original_name: String,
    /// The stored asset, when the file was accepted.
    pub asset: Option<AssetResponse>,
    /// Why the file was not stored.
    pub error: Option<String>,
}

impl From<UploadOutcome> for UploadResultItem {
    fn from(outcome: UploadOutcome) -> Self {
        match outcome.result {
            Ok(descriptor) => Self {
                original_name: outcome.original_name,
                asset: Some(descriptor.into()),
                error: None,
            },
            Err(e) => Self {
                original_name: outcome.original_name,
                asset: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Response DTO for an upload request. Results keep the order of the files.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub results: Vec<UploadResultItem>,
    pub stored: usize,
    pub rejected: usize,
}

impl From<Vec<UploadOutcome>> for UploadResponse {
    fn from(outcomes: Vec<UploadOutcome>) -> Self {
        let results: Vec<UploadResultItem> = outcomes.into_iter().map(Into::into).collect();
        let stored = results.iter().filter(|r| r.asset.is_some()).count();
        Self {
            rejected: results.len() - stored,
            stored,
            results,
        }
    }
}

/// Response DTO for listing assets.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AssetListResponse {
    pub assets: Vec<AssetResponse>,
    pub total: u64,
}

impl From<Vec<AssetDescriptor>> for AssetListResponse {
    fn from(assets: Vec<AssetDescriptor>) -> Self {
        Self {
            total: assets.len() as u64,
            assets: assets.into_iter().map(Into::into).collect(),
        }
    }
}

/// Request body for confirming a selection of staged uploads.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct ConfirmRequest {
    /// Uploads to keep. Every other staged upload of the caller is deleted.
    pub asset_ids: Vec<Uuid>,
    /// Promote the kept uploads into this entity right away.
    #[serde(default)]
    pub entity: Option<EntityRef>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ConfirmResponse {
    pub kept: Vec<AssetResponse>,
    pub deleted: Vec<Uuid>,
    /// Items that could not be processed. Retried by the sweeper.
    pub failed: Vec<BatchFailure>,
}

impl From<ConfirmReport> for ConfirmResponse {
    fn from(report: ConfirmReport) -> Self {
        Self {
            kept: report.kept.into_iter().map(Into::into).collect(),
            deleted: report.deleted,
            failed: report.failed,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct AvatarResponse {
    pub asset: AssetResponse,
    /// Previous avatars that were deleted.
    pub superseded: Vec<Uuid>,
    pub failed: Vec<BatchFailure>,
}

impl From<ReplaceReport> for AvatarResponse {
    fn from(report: ReplaceReport) -> Self {
        Self {
            asset: report.asset.into(),
            superseded: report.superseded,
            failed: report.failed,
        }
    }
}

/// Query parameters for a manual sweep.
#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SweepParams {
    /// Override the configured retention, in seconds.
    pub retention_secs: Option<u64>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SweepResponse {
    pub expired: Vec<Uuid>,
    pub settled: Vec<Uuid>,
    pub failed: Vec<BatchFailure>,
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            expired: report.expired,
            settled: report.settled,
            failed: report.failed,
        }
    }
}

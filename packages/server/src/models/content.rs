use common::BatchFailure;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::AssetResponse;
use crate::lifecycle::ReconcileReport;

/// Request body of the content-saved hook.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct SaveContentRequest {
    /// The saved rich-text body (markdown with optional HTML).
    #[schema(example = "Results: ![chart](/files/u1/temp/01936f0e12347abc8000000000000002.png)")]
    pub body: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SaveContentResponse {
    /// The body with asset URLs pointing at their final locations. Persist
    /// this instead of the submitted body.
    pub body: String,
    pub promoted: Vec<AssetResponse>,
    pub pruned: Vec<Uuid>,
    pub released: Vec<Uuid>,
    pub failed: Vec<BatchFailure>,
}

impl From<ReconcileReport> for SaveContentResponse {
    fn from(report: ReconcileReport) -> Self {
        Self {
            body: report.body,
            promoted: report.promoted.into_iter().map(Into::into).collect(),
            pruned: report.pruned,
            released: report.released,
            failed: report.failed,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DeleteContentResponse {
    pub deleted: Vec<Uuid>,
    pub failed: Vec<BatchFailure>,
}

use std::time::Duration;

use axum::Json;
use axum::extract::{Query, State};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::asset::{SweepParams, SweepResponse};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/admin/assets/sweep",
    tag = "Admin",
    operation_id = "sweepAssets",
    summary = "Run the orphan sweep now",
    description = "Deletes staged uploads older than the retention window and completes \
        promotions whose object move failed. The same sweep runs periodically in the background.",
    params(SweepParams),
    responses(
        (status = 200, description = "Sweep finished", body = SweepResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, params), fields(user_id = %auth_user.user_id))]
pub async fn sweep_assets(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<SweepParams>,
) -> Result<Json<SweepResponse>, AppError> {
    auth_user.require_permission("asset:sweep")?;

    let retention = params
        .retention_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| state.config.sweeper.retention());
    let report = state.lifecycle.sweep(retention).await?;
    Ok(Json(report.into()))
}

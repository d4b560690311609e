use axum::Json;
use axum::extract::{Path, State};
use common::storage::EntityType;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::lifecycle::EntityRef;
use crate::models::content::{DeleteContentResponse, SaveContentRequest, SaveContentResponse};
use crate::state::AppState;

fn content_entity(entity_type: EntityType, entity_id: &str) -> Result<EntityRef, AppError> {
    if !entity_type.has_body() {
        return Err(AppError::Validation(format!(
            "'{entity_type}' is not a content type"
        )));
    }
    Ok(EntityRef::new(entity_type, entity_id)?)
}

#[utoipa::path(
    post,
    path = "/content/{entity_type}/{entity_id}/saved",
    tag = "Content Hooks",
    operation_id = "contentSaved",
    summary = "Reconcile assets after a content body was saved",
    description = "Called by the content service after creating or updating an entity. \
        Staged uploads of the caller referenced by the body are promoted into the entity, \
        unreferenced staged uploads of the caller are deleted, and assets of the entity the body \
        no longer references are deleted. The returned body has asset URLs rewritten to their \
        final locations. Per-asset failures are reported, not raised.",
    params(
        ("entity_type" = EntityType, Path, description = "Content type: post, event, report or comment"),
        ("entity_id" = String, Path, description = "Content entity ID"),
    ),
    request_body = SaveContentRequest,
    responses(
        (status = 200, description = "Assets reconciled", body = SaveContentResponse),
        (status = 400, description = "Invalid entity (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = %auth_user.user_id, %entity_type, %entity_id))]
pub async fn content_saved(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(EntityType, String)>,
    AppJson(payload): AppJson<SaveContentRequest>,
) -> Result<Json<SaveContentResponse>, AppError> {
    auth_user.require_permission("content:write")?;
    let entity = content_entity(entity_type, &entity_id)?;

    let report = state
        .lifecycle
        .reconcile_on_save(&auth_user.user_id, &entity, &payload.body)
        .await?;
    Ok(Json(report.into()))
}

#[utoipa::path(
    delete,
    path = "/content/{entity_type}/{entity_id}",
    tag = "Content Hooks",
    operation_id = "contentDeleted",
    summary = "Delete every asset of a removed content entity",
    description = "Called by the content service after deleting an entity. Best effort: assets \
        that could not be deleted are listed in `failed` and keep their records.",
    params(
        ("entity_type" = EntityType, Path, description = "Content type: post, event, report or comment"),
        ("entity_id" = String, Path, description = "Content entity ID"),
    ),
    responses(
        (status = 200, description = "Cascade delete finished", body = DeleteContentResponse),
        (status = 400, description = "Invalid entity (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %auth_user.user_id, %entity_type, %entity_id))]
pub async fn content_deleted(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(EntityType, String)>,
) -> Result<Json<DeleteContentResponse>, AppError> {
    auth_user.require_permission("content:delete")?;
    let entity = content_entity(entity_type, &entity_id)?;

    let outcome = state.lifecycle.cascade_delete_entity(&entity).await?;
    Ok(Json(DeleteContentResponse {
        deleted: outcome.succeeded,
        failed: outcome.failed,
    }))
}

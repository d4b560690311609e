use axum::Json;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use common::storage::EntityType;
use tracing::instrument;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::lifecycle::{EntityRef, UploadFile};
use crate::models::asset::{
    AssetListResponse, AssetResponse, AvatarResponse, ConfirmRequest, ConfirmResponse,
    UploadResponse,
};
use crate::state::AppState;

/// Room for multipart framing on top of the file payloads.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Ceiling for a whole upload request: `max_files` full-size files plus
/// framing.
///
/// Files over `max_file_size` are rejected one by one as long as the request
/// stays under this ceiling, since each field is buffered only up to the
/// per-file limit. A request over it fails as a whole with
/// `PAYLOAD_TOO_LARGE`.
pub fn upload_request_limit(config: &UploadConfig) -> usize {
    let per_file = usize::try_from(config.max_file_size).unwrap_or(usize::MAX);
    per_file
        .saturating_mul(config.max_files.max(1))
        .saturating_add(MULTIPART_OVERHEAD)
}

pub fn upload_body_limit(config: &UploadConfig) -> DefaultBodyLimit {
    DefaultBodyLimit::max(upload_request_limit(config))
}

fn multipart_rejection(status: StatusCode, detail: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("Upload request too large: {detail}"))
    } else {
        AppError::Validation(format!("Multipart error: {detail}"))
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    multipart_rejection(err.status(), err.body_text())
}

#[utoipa::path(
    post,
    path = "/assets",
    tag = "Assets",
    operation_id = "uploadAssets",
    summary = "Upload files as staged assets",
    description = "Stores every `file` multipart field as a staged asset of the caller. Each file \
        is validated on its own; the response lists one result per file in request order. \
        Staged assets are promoted when a content body referencing them is saved, and deleted \
        by the sweeper once retention expires. With `entity_type` and `entity_id` text fields \
        the files are stored directly into that content entity instead.",
    request_body(
        content_type = "multipart/form-data",
        description = "One or more `file` fields, optionally `entity_type` and `entity_id`"
    ),
    responses(
        (status = 200, description = "Per-file results", body = UploadResponse),
        (status = 400, description = "No files or too many files (UPLOAD_REJECTED, VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 413, description = "Request over the upload ceiling (PAYLOAD_TOO_LARGE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = %auth_user.user_id))]
pub async fn upload_assets(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let max_file_size = state.lifecycle.policy().max_file_size();
    let max_files = state.lifecycle.policy().max_files();
    let mut files = Vec::new();
    let mut entity_type = None;
    let mut entity_id = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") | Some("files") => {
                if files.len() == max_files {
                    return Err(AppError::UploadRejected(format!(
                        "At most {max_files} files per upload"
                    )));
                }
                files.push(read_upload_field(field, max_file_size).await?);
            }
            Some("entity_type") => {
                let text = read_text_field(field).await?;
                let parsed = text
                    .parse::<EntityType>()
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                entity_type = Some(parsed);
            }
            Some("entity_id") => entity_id = Some(read_text_field(field).await?),
            _ => continue, // Ignore unknown fields.
        }
    }

    let entity = match (entity_type, entity_id) {
        (Some(entity_type), Some(entity_id)) => Some(EntityRef::new(entity_type, &entity_id)?),
        (None, None) => None,
        _ => {
            return Err(AppError::Validation(
                "entity_type and entity_id must be given together".into(),
            ));
        }
    };

    let outcomes = state
        .lifecycle
        .upload(&auth_user.user_id, files, entity.as_ref())
        .await?;
    Ok(Json(outcomes.into()))
}

#[utoipa::path(
    get,
    path = "/assets/staged",
    tag = "Assets",
    operation_id = "listStagedAssets",
    summary = "List the caller's staged uploads",
    responses(
        (status = 200, description = "Staged assets, oldest first", body = AssetListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn list_staged_assets(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<AssetListResponse>, AppError> {
    let assets = state.lifecycle.list_staged(&auth_user.user_id).await?;
    Ok(Json(assets.into()))
}

#[utoipa::path(
    get,
    path = "/assets/{id}",
    tag = "Assets",
    operation_id = "getAsset",
    summary = "Get one of the caller's assets",
    params(("id" = Uuid, Path, description = "Asset ID")),
    responses(
        (status = 200, description = "Asset metadata", body = AssetResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Owned by another user (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Asset not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %auth_user.user_id, asset_id = %id))]
pub async fn get_asset(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssetResponse>, AppError> {
    let asset = state.lifecycle.get_owned(&auth_user.user_id, id).await?;
    Ok(Json(asset.into()))
}

#[utoipa::path(
    post,
    path = "/assets/confirm",
    tag = "Assets",
    operation_id = "confirmAssets",
    summary = "Keep selected uploads and discard the rest",
    description = "Keeps the listed uploads and deletes every other staged upload of the caller. \
        All ids are checked before anything changes. When `entity` is given, kept uploads are \
        promoted into it immediately; otherwise they stay staged with a fresh retention window.",
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Selection applied", body = ConfirmResponse),
        (status = 400, description = "Invalid request (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "An id belongs to another user (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "An id does not exist (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = %auth_user.user_id))]
pub async fn confirm_assets(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, AppError> {
    let entity = payload
        .entity
        .map(|e| EntityRef::new(e.entity_type, &e.entity_id))
        .transpose()?;

    let report = state
        .lifecycle
        .confirm_selection(&auth_user.user_id, &payload.asset_ids, entity.as_ref())
        .await?;
    Ok(Json(report.into()))
}

#[utoipa::path(
    put,
    path = "/users/me/avatar",
    tag = "Assets",
    operation_id = "replaceAvatar",
    summary = "Replace the caller's avatar",
    description = "Stores the `file` field as the caller's avatar, then deletes any previous \
        avatar. A rejected upload leaves the previous avatar untouched.",
    request_body(content_type = "multipart/form-data", description = "A single `file` field"),
    responses(
        (status = 200, description = "Avatar replaced", body = AvatarResponse),
        (status = 400, description = "Invalid file (UPLOAD_REJECTED, VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 413, description = "Request over the upload ceiling (PAYLOAD_TOO_LARGE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = %auth_user.user_id))]
pub async fn replace_avatar(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>, AppError> {
    let max_file_size = state.lifecycle.policy().max_file_size();
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            file = Some(read_upload_field(field, max_file_size).await?);
            break;
        }
    }
    let file = file.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;

    let report = state
        .lifecycle
        .replace_singleton(&auth_user.user_id, EntityType::Avatar, file)
        .await?;
    Ok(Json(report.into()))
}

async fn read_text_field(field: Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map(|text| text.trim().to_string())
        .map_err(multipart_error)
}

/// Read a multipart file field into memory.
///
/// At most `max_size + 1` bytes are kept, so an oversized file is rejected
/// by the upload policy without buffering all of it.
async fn read_upload_field(mut field: Field<'_>, max_size: u64) -> Result<UploadFile, AppError> {
    let original_name = field
        .file_name()
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("File field must have a filename".into()))?;
    let content_type = field.content_type().map(str::to_string);

    let cap = usize::try_from(max_size.saturating_add(1)).unwrap_or(usize::MAX);
    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        let room = cap.saturating_sub(data.len());
        data.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    Ok(UploadFile {
        original_name,
        content_type,
        data,
    })
}

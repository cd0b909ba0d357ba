//! File listing and deletion. Ownership is the upload's email string.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use metatrace_shared::UploadId;
use metatrace_store::UploadRecord;

use crate::api::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct EmailQuery {
    #[serde(default)]
    email: Option<String>,
}

impl EmailQuery {
    fn email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}

#[derive(Serialize)]
pub struct FilesResponse {
    files: Vec<UploadRecord>,
}

pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<FilesResponse>, ApiError> {
    let email = query
        .email()
        .ok_or_else(|| ApiError::BadRequest("User email is required".into()))?;
    let files = state.credentials.list_uploads(email)?;
    Ok(Json(FilesResponse { files }))
}

fn parse_upload_id(raw: &str) -> Result<UploadId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid ID format".into()))
}

#[derive(Deserialize)]
pub struct IdQuery {
    #[serde(default)]
    id: Option<String>,
}

/// Unpin a file and delete its record. Nothing is unpinned for an unknown id.
pub async fn delete_file(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let raw = query
        .id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No ID provided".into()))?;
    let id = parse_upload_id(raw)?;

    let record = state.credentials.get_upload(id)?;

    state
        .pinning
        .unpin(&record.content_identifier)
        .await
        .map_err(|e| ApiError::upstream("Error unpinning from Pinata", e))?;

    if let Some(metadata_cid) = &record.metadata_content_identifier {
        if let Err(e) = state.pinning.unpin(metadata_cid).await {
            warn!(cid = %metadata_cid, error = %e, "Failed to unpin metadata JSON");
        }
    }

    state.credentials.delete_upload(id)?;
    info!(upload_id = %id, cid = %record.content_identifier, "File deleted");

    Ok(Json(json!({ "message": "File deleted successfully" })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAllRequest {
    #[serde(default)]
    file_ids: Option<Vec<String>>,
}

/// Delete records in bulk. Pinned content is left alone.
pub async fn delete_all_files(
    State(state): State<AppState>,
    Json(req): Json<DeleteAllRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let raw_ids = req
        .file_ids
        .ok_or_else(|| ApiError::BadRequest("Invalid file IDs".into()))?;
    let ids = raw_ids
        .iter()
        .map(|raw| parse_upload_id(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let deleted = state.credentials.delete_uploads(&ids)?;

    Ok(Json(json!({
        "message": "All files deleted successfully",
        "deletedCount": deleted,
    })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    files: Vec<UploadRecord>,
    blockchain_metadata: String,
}

/// The user's uploads plus the on-chain reference of the newest one.
pub async fn get_metadata(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<MetadataResponse>, ApiError> {
    let email = query
        .email()
        .ok_or_else(|| ApiError::BadRequest("Email is required".into()))?;
    let files = state.credentials.list_uploads(email)?;
    let Some(newest) = files.first() else {
        return Err(ApiError::NotFound("No files found for this user".into()));
    };

    let blockchain_metadata = state.registry.get_reference(newest.token_id).await?;

    Ok(Json(MetadataResponse {
        files,
        blockchain_metadata,
    }))
}

//! File upload and approval handlers

use super::parse_id;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::services::files::{ClientUpload, UploadedFile};
use crate::services::{AgencyUser, PortalIdentity};
use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use portico_types::{ApprovalStatus, FileApproval, FileId, FileRecord, ProjectId};
use serde::Deserialize;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Invalid upload: {}", err))
}

/// Client upload through the portal. Fields: `file`, optional `description`
/// and `project_id`.
pub async fn upload_portal_file(
    State(state): State<AppState>,
    identity: PortalIdentity,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadedFile>> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut description = None;
    let mut project_id = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_MIME_TYPE)
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((file_name, mime_type, bytes.to_vec()));
            }
            "description" => {
                let text = field.text().await.map_err(multipart_error)?;
                description = Some(text).filter(|t| !t.trim().is_empty());
            }
            "project_id" => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    project_id = Some(parse_id::<ProjectId>(&text, "project")?);
                }
            }
            _ => {}
        }
    }

    let (file_name, mime_type, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;
    let uploaded = state
        .services
        .files
        .upload_client_file(
            &identity,
            ClientUpload {
                file_name,
                mime_type,
                bytes,
                description,
                project_id,
            },
        )
        .await?;
    Ok(Json(uploaded))
}

/// Files shared with the portal client
pub async fn list_portal_files(
    State(state): State<AppState>,
    identity: PortalIdentity,
) -> ApiResult<Json<Vec<FileRecord>>> {
    Ok(Json(state.services.files.list_client_files(&identity).await?))
}

pub async fn approve_portal_file(
    State(state): State<AppState>,
    identity: PortalIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<FileRecord>> {
    let file_id: FileId = parse_id(&id, "file")?;
    let file = state
        .services
        .files
        .approve_file_as_client(&identity, &file_id)
        .await?;
    Ok(Json(file))
}

#[derive(Debug, Deserialize)]
pub struct ReviewFileRequest {
    pub status: ApprovalStatus,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Approve or reject a file as the agency
pub async fn review_file(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
    Json(request): Json<ReviewFileRequest>,
) -> ApiResult<Json<FileRecord>> {
    let file_id: FileId = parse_id(&id, "file")?;
    let file = state
        .services
        .files
        .review_file(&user, &file_id, request.status, request.comment)
        .await?;
    Ok(Json(file))
}

/// Approval history of a file
pub async fn list_file_approvals(
    State(state): State<AppState>,
    user: AgencyUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<FileApproval>>> {
    let file_id: FileId = parse_id(&id, "file")?;
    let approvals = state
        .services
        .files
        .approvals(&user.account_id, &file_id)
        .await?;
    Ok(Json(approvals))
}

//! Client uploads and file approvals

use super::{AgencyUser, PortalIdentity};
use crate::config::UploadConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::integrations::ObjectStore;
use crate::storage::Storage;
use chrono::Utc;
use portico_types::{
    client_upload_path, file::CLIENT_UPLOAD_TAG, file::CLIENT_UPLOAD_TAG_COLOR,
    file_type_for_mime, format_file_size, sanitize_file_name, AccessLevel, AccountId, Activity,
    ApprovalStatus, FileApproval, FileApprovalId, FileId, FileRecord, FileTag, ProjectId,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// A file received from the portal
#[derive(Debug, Clone)]
pub struct ClientUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub description: Option<String>,
    pub project_id: Option<ProjectId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedFile {
    pub file_id: FileId,
    pub file_name: String,
    pub file_size: u64,
    pub public_url: String,
}

pub struct FileService {
    storage: Arc<dyn Storage>,
    object_store: Arc<dyn ObjectStore>,
    uploads: UploadConfig,
}

impl FileService {
    pub fn new(
        storage: Arc<dyn Storage>,
        object_store: Arc<dyn ObjectStore>,
        uploads: UploadConfig,
    ) -> Self {
        Self {
            storage,
            object_store,
            uploads,
        }
    }

    pub async fn upload_client_file(
        &self,
        identity: &PortalIdentity,
        upload: ClientUpload,
    ) -> ServiceResult<UploadedFile> {
        let client_id = identity.require_client()?;

        if upload.bytes.is_empty() {
            return Err(ServiceError::BadRequest("No file provided".to_string()));
        }
        let file_size = upload.bytes.len() as u64;
        if file_size > self.uploads.max_file_size {
            return Err(ServiceError::Validation(format!(
                "File exceeds the maximum size of {}",
                format_file_size(self.uploads.max_file_size)
            )));
        }
        if let Some(project_id) = upload.project_id {
            let owned = self
                .storage
                .get_project(&project_id)
                .await?
                .is_some_and(|p| p.account_id == identity.account_id);
            if !owned {
                return Err(ServiceError::BadRequest("Unknown project".to_string()));
            }
        }

        let now = Utc::now();
        let timestamp_ms = now.timestamp_millis();
        let sanitized = sanitize_file_name(&upload.file_name, timestamp_ms);
        let storage_path =
            client_upload_path(identity.account_id, client_id, timestamp_ms, &sanitized);
        let mime_type = if upload.mime_type.trim().is_empty() {
            "application/octet-stream".to_string()
        } else {
            upload.mime_type
        };

        self.object_store
            .upload(&self.uploads.bucket, &storage_path, &mime_type, upload.bytes)
            .await?;

        let record = FileRecord {
            id: FileId::generate(),
            account_id: identity.account_id,
            client_id: Some(client_id),
            project_id: upload.project_id,
            name: upload.file_name.clone(),
            original_name: upload.file_name,
            file_type: file_type_for_mime(&mime_type).to_string(),
            mime_type,
            storage_path: storage_path.clone(),
            storage_bucket: self.uploads.bucket.clone(),
            file_size,
            file_size_formatted: format_file_size(file_size),
            uploaded_by_name: identity.display_name().to_string(),
            description: upload.description.filter(|d| !d.trim().is_empty()),
            tags: vec![FileTag {
                name: CLIENT_UPLOAD_TAG.to_string(),
                color: CLIENT_UPLOAD_TAG_COLOR.to_string(),
            }],
            access_level: AccessLevel::Client,
            approval_status: ApprovalStatus::Approved,
            approval_required: false,
            sent_by_client: true,
            approved_at: Some(now),
            created_at: now,
        };
        self.storage.upsert_file(record.clone()).await?;
        if let Some(project_id) = record.project_id {
            self.storage.touch_project(&project_id, now).await?;
        }

        tracing::info!(
            account_id = %identity.account_id,
            file_id = %record.id,
            size = file_size,
            "Client file uploaded"
        );
        Ok(UploadedFile {
            file_id: record.id,
            file_name: record.name,
            file_size,
            public_url: self
                .object_store
                .public_url(&self.uploads.bucket, &storage_path),
        })
    }

    /// Agency decision on a file awaiting approval
    pub async fn review_file(
        &self,
        user: &AgencyUser,
        file_id: &FileId,
        decision: ApprovalStatus,
        comment: Option<String>,
    ) -> ServiceResult<FileRecord> {
        if decision == ApprovalStatus::Pending {
            return Err(ServiceError::BadRequest(
                "Status must be approved or rejected".to_string(),
            ));
        }
        let mut file = self.owned_file(&user.account_id, file_id).await?;
        let comment = comment.filter(|c| !c.trim().is_empty());
        let now = Utc::now();

        self.record_decision(&mut file, &user.user_name, decision, comment.clone())
            .await?;

        if let (Some(comment), Some(project_id)) = (comment, file.project_id) {
            let mut activity = Activity::new(
                user.account_id,
                Some(project_id),
                "file",
                "file_comment",
                user.user_name.clone(),
            );
            activity.actor_id = Some(user.user_id);
            activity.metadata = json!({
                "file_id": file.id,
                "file_name": file.name,
                "status": decision,
                "comment": comment,
            });
            self.storage.insert_activity(activity).await?;
            self.storage.touch_project(&project_id, now).await?;
        }

        tracing::info!(file_id = %file.id, status = ?decision, "File reviewed");
        Ok(file)
    }

    /// Client approval of a file shared with them
    pub async fn approve_file_as_client(
        &self,
        identity: &PortalIdentity,
        file_id: &FileId,
    ) -> ServiceResult<FileRecord> {
        let client_id = identity.require_client()?;
        let mut file = self
            .storage
            .get_file(file_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("File not found".to_string()))?;
        if file.account_id != identity.account_id || file.client_id != Some(client_id) {
            return Err(ServiceError::Forbidden(
                "File is not shared with this client".to_string(),
            ));
        }

        self.record_decision(
            &mut file,
            identity.display_name(),
            ApprovalStatus::Approved,
            None,
        )
        .await?;
        tracing::info!(file_id = %file.id, "File approved by client");
        Ok(file)
    }

    pub async fn list_client_files(&self, identity: &PortalIdentity) -> ServiceResult<Vec<FileRecord>> {
        let client_id = identity.require_client()?;
        let files = self
            .storage
            .list_files_for_client(&identity.account_id, &client_id)
            .await?;
        Ok(files
            .into_iter()
            .filter(|f| f.access_level != AccessLevel::Team || f.sent_by_client)
            .collect())
    }

    pub async fn approvals(
        &self,
        account_id: &AccountId,
        file_id: &FileId,
    ) -> ServiceResult<Vec<FileApproval>> {
        self.owned_file(account_id, file_id).await?;
        Ok(self.storage.list_file_approvals(file_id).await?)
    }

    async fn owned_file(&self, account_id: &AccountId, file_id: &FileId) -> ServiceResult<FileRecord> {
        self.storage
            .get_file(file_id)
            .await?
            .filter(|f| f.account_id == *account_id)
            .ok_or_else(|| ServiceError::NotFound("File not found".to_string()))
    }

    async fn record_decision(
        &self,
        file: &mut FileRecord,
        approver_name: &str,
        status: ApprovalStatus,
        comment: Option<String>,
    ) -> ServiceResult<()> {
        let now = Utc::now();
        file.approval_status = status;
        file.approved_at = (status == ApprovalStatus::Approved).then_some(now);
        self.storage.upsert_file(file.clone()).await?;
        self.storage
            .insert_file_approval(FileApproval {
                id: FileApprovalId::generate(),
                file_id: file.id,
                approver_name: approver_name.to_string(),
                status,
                comment,
                decided_at: now,
            })
            .await?;
        Ok(())
    }
}

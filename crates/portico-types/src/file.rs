//! Portal files and approvals

use crate::{AccountId, ClientId, FileApprovalId, FileId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag attached to every file a client uploads through the portal
pub const CLIENT_UPLOAD_TAG: &str = "uploaded by client";
pub const CLIENT_UPLOAD_TAG_COLOR: &str = "#10B981";

/// Approval state of a file shared with a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Who may see a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    #[default]
    Team,
    Client,
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTag {
    pub name: String,
    pub color: String,
}

/// Metadata row for a stored file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub account_id: AccountId,
    pub client_id: Option<ClientId>,
    pub project_id: Option<ProjectId>,
    /// Sanitized name, as stored
    pub name: String,
    pub original_name: String,
    /// Coarse type derived from the MIME type (`image`, `video`, `pdf`...)
    pub file_type: String,
    pub mime_type: String,
    pub storage_path: String,
    pub storage_bucket: String,
    pub file_size: u64,
    pub file_size_formatted: String,
    pub uploaded_by_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<FileTag>,
    #[serde(default)]
    pub access_level: AccessLevel,
    #[serde(default)]
    pub approval_status: ApprovalStatus,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub sent_by_client: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One approval decision on a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileApproval {
    pub id: FileApprovalId,
    pub file_id: FileId,
    pub approver_name: String,
    pub status: ApprovalStatus,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// Make an uploaded file name safe for object-storage keys.
///
/// Characters outside `[A-Za-z0-9.-]` become `_`, `_` runs collapse, and leading
/// or trailing `_` are trimmed. Falls back to `file_{timestamp}` when nothing is left.
pub fn sanitize_file_name(name: &str, timestamp_ms: i64) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        let ch = if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' {
            ch
        } else {
            '_'
        };
        if ch == '_' && out.ends_with('_') {
            continue;
        }
        out.push(ch);
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        format!("file_{}", timestamp_ms)
    } else {
        trimmed.to_string()
    }
}

/// Human-readable size with a 1024 base, e.g. `1.5 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);

    let rounded = format!("{:.2}", value);
    let rounded = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rounded, UNITS[exponent])
}

/// Coarse file type from a MIME type
pub fn file_type_for_mime(mime_type: &str) -> &'static str {
    let mime = mime_type.to_ascii_lowercase();
    if mime.starts_with("image/") {
        "image"
    } else if mime.starts_with("video/") {
        "video"
    } else if mime.starts_with("audio/") {
        "audio"
    } else if mime == "application/pdf" {
        "pdf"
    } else if mime.contains("spreadsheet") || mime.contains("excel") || mime == "text/csv" {
        "spreadsheet"
    } else if mime.contains("word") || mime.contains("document") || mime.starts_with("text/") {
        "document"
    } else if mime.contains("zip") || mime.contains("compressed") {
        "archive"
    } else {
        "other"
    }
}

/// Storage key for a client upload
pub fn client_upload_path(
    account_id: AccountId,
    client_id: ClientId,
    timestamp_ms: i64,
    sanitized_name: &str,
) -> String {
    format!(
        "{}/clients/{}/files/client-uploads/{}-{}",
        account_id, client_id, timestamp_ms, sanitized_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("My Logo (final).png", 1), "My_Logo_final_.png");
        assert_eq!(sanitize_file_name("brief-v2.pdf", 1), "brief-v2.pdf");
        assert_eq!(sanitize_file_name("__a  b__", 1), "a_b");
        assert_eq!(sanitize_file_name("日本語", 42), "file_42");
        assert_eq!(sanitize_file_name("", 7), "file_7");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_file_size(1_288_490_189), "1.2 GB");
    }

    #[test]
    fn test_file_type_for_mime() {
        assert_eq!(file_type_for_mime("image/png"), "image");
        assert_eq!(file_type_for_mime("application/pdf"), "pdf");
        assert_eq!(file_type_for_mime("text/csv"), "spreadsheet");
        assert_eq!(file_type_for_mime("application/octet-stream"), "other");
    }

    #[test]
    fn test_client_upload_path_layout() {
        let account = AccountId::generate();
        let client = ClientId::generate();
        let path = client_upload_path(account, client, 1700000000000, "a.png");
        assert_eq!(
            path,
            format!("{}/clients/{}/files/client-uploads/1700000000000-a.png", account, client)
        );
    }

    proptest! {
        #[test]
        fn sanitized_names_are_storage_safe(name in ".{0,48}", ts in 0i64..i64::MAX) {
            let clean = sanitize_file_name(&name, ts);
            prop_assert!(!clean.is_empty());
            prop_assert!(clean
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_'));
            prop_assert!(!clean.contains("__"));
            prop_assert!(!clean.starts_with('_'));
            prop_assert!(!clean.ends_with('_'));
        }
    }
}

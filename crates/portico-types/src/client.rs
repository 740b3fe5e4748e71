//! Clients, the portal allowlist, and portals

use crate::slug::{normalize_email, slugify};
use crate::{AccountId, AllowlistEntryId, ClientId, PortalId, ProjectId};
use serde::{Deserialize, Serialize};

/// A client of an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub account_id: AccountId,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    /// Stored normalized (trimmed, lowercase)
    pub email: String,
    pub slug: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: ClientStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    #[default]
    Active,
    Pending,
    Archived,
}

impl std::str::FromStr for ClientStatus {
    type Err = crate::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "active" => Ok(ClientStatus::Active),
            "pending" => Ok(ClientStatus::Pending),
            "archived" => Ok(ClientStatus::Archived),
            other => Err(crate::ParseEnumError::new("client status", other)),
        }
    }
}

impl Client {
    pub fn new(
        account_id: AccountId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: &str,
    ) -> Self {
        let first_name = first_name.into();
        let last_name = last_name.into();
        let slug = slugify(&format!("{} {}", first_name, last_name));
        Self {
            id: ClientId::generate(),
            account_id,
            first_name,
            last_name,
            company: None,
            email: normalize_email(email),
            slug,
            phone: None,
            status: ClientStatus::Active,
            created_at: chrono::Utc::now(),
            updated_at: None,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.status == ClientStatus::Archived
    }

    pub fn display_name(&self) -> String {
        match self.company.as_deref() {
            Some(company) if !company.trim().is_empty() => company.to_string(),
            _ => format!("{} {}", self.first_name, self.last_name)
                .trim()
                .to_string(),
        }
    }
}

/// An email authorized to access the portals of one account.
///
/// The `client_id` link is optional: rows created before the client record
/// existed are linked lazily by the allowlist resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowlistEntry {
    pub id: AllowlistEntryId,
    pub account_id: AccountId,
    pub client_id: Option<ClientId>,
    pub email: String,
    pub name: Option<String>,
    pub role: Option<String>,
    pub company_slug: Option<String>,
    pub client_slug: Option<String>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub has_password_setup: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl AllowlistEntry {
    pub fn new(account_id: AccountId, email: &str) -> Self {
        Self {
            id: AllowlistEntryId::generate(),
            account_id,
            client_id: None,
            email: normalize_email(email),
            name: None,
            role: None,
            company_slug: None,
            client_slug: None,
            is_active: true,
            password_hash: None,
            has_password_setup: false,
            created_at: chrono::Utc::now(),
        }
    }

    /// Whether this row grants access to the portal addressed by the two slugs.
    pub fn matches_portal(&self, company_slug: &str, client_slug: &str) -> bool {
        self.company_slug.as_deref() == Some(company_slug)
            || self.client_slug.as_deref() == Some(client_slug)
    }

    /// Copy without the password hash, safe to return from the API
    pub fn redacted(&self) -> Self {
        Self {
            password_hash: None,
            ..self.clone()
        }
    }
}

/// Branded, per-client portal configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    pub id: PortalId,
    pub account_id: AccountId,
    pub client_id: ClientId,
    pub name: String,
    pub status: PortalStatus,
    pub url: String,
    /// Enabled modules (files, invoices, contracts, messages, forms...)
    #[serde(default)]
    pub modules: serde_json::Value,
    /// Brand colors
    #[serde(default)]
    pub colors: serde_json::Value,
    #[serde(default)]
    pub view_count: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalStatus {
    #[default]
    Active,
    Draft,
    Archived,
}

/// A unit of client work that messages, files and activities hang off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub account_id: AccountId,
    pub client_id: Option<ClientId>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub due_date: Option<chrono::NaiveDate>,
    pub last_activity_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Rows written before projects carried a status are live work, hence `Active` as default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    Draft,
    #[default]
    Active,
    OnHold,
    Completed,
    Archived,
}

impl std::str::FromStr for ProjectStatus {
    type Err = crate::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "draft" => Ok(ProjectStatus::Draft),
            "active" => Ok(ProjectStatus::Active),
            "on-hold" => Ok(ProjectStatus::OnHold),
            "completed" => Ok(ProjectStatus::Completed),
            "archived" => Ok(ProjectStatus::Archived),
            other => Err(crate::ParseEnumError::new("project status", other)),
        }
    }
}

impl Project {
    pub fn new(account_id: AccountId, client_id: Option<ClientId>, name: impl Into<String>) -> Self {
        Self {
            id: ProjectId::generate(),
            account_id,
            client_id,
            name: name.into(),
            description: None,
            status: ProjectStatus::Active,
            due_date: None,
            last_activity_at: None,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Role and display data for a portal member as returned by the allowlist lookups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub email: String,
    pub name: Option<String>,
    pub role: Option<String>,
}

impl From<&AllowlistEntry> for MemberSummary {
    fn from(entry: &AllowlistEntry) -> Self {
        Self {
            email: entry.email.clone(),
            name: entry.name.clone(),
            role: entry.role.clone(),
        }
    }
}

//! Agency-side management of clients, projects and portals

use super::identity::{IdentityService, NewMember};
use super::{require_owned_client, require_owned_project, AgencyUser};
use crate::error::{ServiceError, ServiceResult};
use crate::storage::Storage;
use chrono::{NaiveDate, Utc};
use portico_types::{
    normalize_email, AccountId, Client, ClientId, ClientStatus, Portal, PortalId, PortalStatus,
    Project, ProjectId, ProjectStatus,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub status: Option<ClientStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewProject {
    pub name: String,
    pub client_id: Option<ClientId>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub client_id: Option<ClientId>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewPortal {
    pub client_id: Option<ClientId>,
    pub name: Option<String>,
    pub status: Option<PortalStatus>,
    pub modules: Value,
    pub colors: Value,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn valid_email(email: &str) -> bool {
    matches!(email.split_once('@'), Some((local, domain)) if !local.is_empty() && domain.contains('.'))
}

/// `base`, or `base-2`, `base-3`... whichever is not in `taken`
fn unique_slug(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

#[derive(Clone)]
pub struct ClientService {
    storage: Arc<dyn Storage>,
    identity: IdentityService,
    public_base_url: String,
}

impl ClientService {
    pub fn new(storage: Arc<dyn Storage>, identity: IdentityService, public_base_url: String) -> Self {
        Self {
            storage,
            identity,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn list_clients(&self, account_id: &AccountId) -> ServiceResult<Vec<Client>> {
        Ok(self.storage.list_clients(account_id).await?)
    }

    pub async fn get_client(&self, account_id: &AccountId, id: &ClientId) -> ServiceResult<Client> {
        require_owned_client(self.storage.as_ref(), account_id, id).await
    }

    /// Create a client. Emails are unique per account and portal slugs get a
    /// numeric suffix when another client already has the name.
    pub async fn create_client(&self, user: &AgencyUser, new: NewClient) -> ServiceResult<Client> {
        let email = normalize_email(&new.email);
        if new.first_name.trim().is_empty() || email.is_empty() {
            return Err(ServiceError::BadRequest(
                "First name and email are required".to_string(),
            ));
        }
        if !valid_email(&email) {
            return Err(ServiceError::Validation("Invalid email address".to_string()));
        }
        if self
            .storage
            .find_client_by_email(&user.account_id, &email)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(
                "A client with this email already exists".to_string(),
            ));
        }

        let mut client = Client::new(
            user.account_id,
            new.first_name.trim(),
            new.last_name.trim(),
            &email,
        );
        client.company = non_blank(new.company);
        client.phone = non_blank(new.phone);

        let taken: HashSet<String> = self
            .storage
            .list_clients(&user.account_id)
            .await?
            .into_iter()
            .map(|c| c.slug)
            .collect();
        client.slug = unique_slug(&client.slug, &taken);

        self.storage.upsert_client(client.clone()).await?;
        tracing::info!(account_id = %user.account_id, client_id = %client.id, "Client created");
        Ok(client)
    }

    /// Edit a client. The portal slug stays as issued so existing links keep working.
    pub async fn update_client(
        &self,
        user: &AgencyUser,
        id: &ClientId,
        changes: ClientChanges,
    ) -> ServiceResult<Client> {
        let mut client = require_owned_client(self.storage.as_ref(), &user.account_id, id).await?;

        if let Some(email) = changes.email {
            let email = normalize_email(&email);
            if !valid_email(&email) {
                return Err(ServiceError::Validation("Invalid email address".to_string()));
            }
            if email != client.email {
                let taken = self
                    .storage
                    .find_client_by_email(&user.account_id, &email)
                    .await?
                    .is_some_and(|other| other.id != client.id);
                if taken {
                    return Err(ServiceError::Conflict(
                        "A client with this email already exists".to_string(),
                    ));
                }
                client.email = email;
            }
        }
        if let Some(first_name) = changes.first_name {
            if first_name.trim().is_empty() {
                return Err(ServiceError::BadRequest("First name is required".to_string()));
            }
            client.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = changes.last_name {
            client.last_name = last_name.trim().to_string();
        }
        if changes.company.is_some() {
            client.company = non_blank(changes.company);
        }
        if changes.phone.is_some() {
            client.phone = non_blank(changes.phone);
        }
        if let Some(status) = changes.status {
            client.status = status;
        }
        client.updated_at = Some(Utc::now());

        self.storage.upsert_client(client.clone()).await?;
        tracing::info!(client_id = %client.id, "Client updated");
        Ok(client)
    }

    /// Archive a client: its allowlist rows are deactivated and its portal archived,
    /// so existing sessions stop resolving.
    pub async fn archive_client(&self, user: &AgencyUser, id: &ClientId) -> ServiceResult<Client> {
        let mut client = require_owned_client(self.storage.as_ref(), &user.account_id, id).await?;
        client.status = ClientStatus::Archived;
        client.updated_at = Some(Utc::now());
        self.storage.upsert_client(client.clone()).await?;

        let mut revoked = 0;
        for mut entry in self
            .storage
            .list_allowlist_for_client(&user.account_id, &client.id)
            .await?
            .into_iter()
            .filter(|e| e.is_active)
        {
            entry.is_active = false;
            self.storage.update_allowlist_entry(entry).await?;
            revoked += 1;
        }
        if let Some(mut portal) = self
            .storage
            .find_portal_for_client(&user.account_id, &client.id)
            .await?
        {
            portal.status = PortalStatus::Archived;
            self.storage.upsert_portal(portal).await?;
        }

        tracing::info!(client_id = %client.id, revoked, "Client archived");
        Ok(client)
    }

    /// Projects of an account, optionally only those of one client
    pub async fn list_projects(
        &self,
        account_id: &AccountId,
        client_id: Option<&ClientId>,
    ) -> ServiceResult<Vec<Project>> {
        let mut projects = self.storage.list_projects(account_id).await?;
        if let Some(client_id) = client_id {
            projects.retain(|p| p.client_id.as_ref() == Some(client_id));
        }
        Ok(projects)
    }

    pub async fn get_project(&self, account_id: &AccountId, id: &ProjectId) -> ServiceResult<Project> {
        require_owned_project(self.storage.as_ref(), account_id, id).await
    }

    pub async fn create_project(&self, user: &AgencyUser, new: NewProject) -> ServiceResult<Project> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(ServiceError::BadRequest("Project name is required".to_string()));
        }
        if let Some(client_id) = &new.client_id {
            let client = require_owned_client(self.storage.as_ref(), &user.account_id, client_id).await?;
            if client.is_archived() {
                return Err(ServiceError::Conflict("Client is archived".to_string()));
            }
        }

        let mut project = Project::new(user.account_id, new.client_id, name);
        project.description = non_blank(new.description);
        project.status = new.status.unwrap_or(ProjectStatus::Draft);
        project.due_date = new.due_date;
        self.storage.upsert_project(project.clone()).await?;

        tracing::info!(account_id = %user.account_id, project_id = %project.id, "Project created");
        Ok(project)
    }

    pub async fn update_project(
        &self,
        user: &AgencyUser,
        id: &ProjectId,
        changes: ProjectChanges,
    ) -> ServiceResult<Project> {
        let mut project = require_owned_project(self.storage.as_ref(), &user.account_id, id).await?;

        if let Some(name) = changes.name {
            if name.trim().is_empty() {
                return Err(ServiceError::BadRequest("Project name is required".to_string()));
            }
            project.name = name.trim().to_string();
        }
        if let Some(client_id) = changes.client_id {
            require_owned_client(self.storage.as_ref(), &user.account_id, &client_id).await?;
            project.client_id = Some(client_id);
        }
        if changes.description.is_some() {
            project.description = non_blank(changes.description);
        }
        if let Some(status) = changes.status {
            project.status = status;
        }
        if changes.due_date.is_some() {
            project.due_date = changes.due_date;
        }

        self.storage.upsert_project(project.clone()).await?;
        self.storage.touch_project(&project.id, Utc::now()).await?;
        tracing::info!(project_id = %project.id, status = ?project.status, "Project updated");
        Ok(project)
    }

    pub async fn list_portals(&self, account_id: &AccountId) -> ServiceResult<Vec<Portal>> {
        let mut portals = self.storage.list_portals_for_account(account_id).await?;
        portals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(portals)
    }

    /// Open a client's portal and allowlist the client's own email for it.
    ///
    /// A client has at most one portal.
    pub async fn create_portal(&self, user: &AgencyUser, new: NewPortal) -> ServiceResult<Portal> {
        let client_id = new
            .client_id
            .ok_or_else(|| ServiceError::BadRequest("Client is required".to_string()))?;
        let client = require_owned_client(self.storage.as_ref(), &user.account_id, &client_id).await?;
        if client.is_archived() {
            return Err(ServiceError::Conflict("Client is archived".to_string()));
        }
        if self
            .storage
            .find_portal_for_client(&user.account_id, &client.id)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(
                "This client already has a portal".to_string(),
            ));
        }

        let account = self
            .storage
            .get_account(&user.account_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Account not found".to_string()))?;
        let company_slug = account.company_slug().ok_or_else(|| {
            ServiceError::BadRequest(
                "Set a company or owner name before creating portals".to_string(),
            )
        })?;

        let portal = Portal {
            id: PortalId::generate(),
            account_id: user.account_id,
            client_id: client.id,
            name: non_blank(new.name).unwrap_or_else(|| format!("{} Portal", client.display_name())),
            status: new.status.unwrap_or_default(),
            url: format!(
                "{}/{}?client={}",
                self.public_base_url, company_slug, client.slug
            ),
            modules: new.modules,
            colors: new.colors,
            view_count: 0,
            created_at: Utc::now(),
        };
        self.storage.upsert_portal(portal.clone()).await?;

        let display_name = format!("{} {}", client.first_name, client.last_name);
        let invited = self
            .identity
            .add_members(
                &user.account_id,
                &client.id,
                vec![NewMember {
                    email: client.email.clone(),
                    name: display_name.trim().to_string(),
                    role: None,
                }],
            )
            .await?;

        tracing::info!(
            portal_id = %portal.id,
            client_id = %client.id,
            invited,
            "Portal created"
        );
        Ok(portal)
    }
}

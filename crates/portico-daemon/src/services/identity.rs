//! Portal resolver: slugs to accounts, emails to allowlist rows and clients

use crate::error::{ServiceError, ServiceResult, StorageError};
use crate::storage::Storage;
use portico_types::{
    normalize_email, Account, AccountId, AllowlistEntry, AllowlistEntryId, ClientId, Portal,
    PortalId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of resolving an email against an account's allowlist
#[derive(Debug, Clone, PartialEq)]
pub struct AllowlistResolution {
    pub entry: AllowlistEntry,
    pub client_id: Option<ClientId>,
}

/// Answer to "does a portal exist here, and may this email enter it?"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortalCheck {
    pub exists: bool,
    /// `None` when no email was supplied
    pub authorized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal: Option<Portal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_slug: Option<String>,
}

/// Allowlist data a login page needs to build the portal URL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientSlugLookup {
    pub name: Option<String>,
    pub role: Option<String>,
    pub company_slug: Option<String>,
    pub client_slug: Option<String>,
}

/// A member to add to a client's portal
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewMember {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Clone)]
pub struct IdentityService {
    storage: Arc<dyn Storage>,
}

impl IdentityService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Account whose derived company slug is `company_slug`
    pub async fn resolve_account(&self, company_slug: &str) -> ServiceResult<Account> {
        self.storage
            .find_account_by_company_slug(company_slug.trim())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Company not found".to_string()))
    }

    /// Like `resolve_account`, falling back to the owner-name slug
    pub async fn resolve_account_by_any_slug(&self, slug: &str) -> ServiceResult<Account> {
        let slug = slug.trim();
        if let Some(account) = self.storage.find_account_by_company_slug(slug).await? {
            return Ok(account);
        }
        self.storage
            .find_account_by_owner_slug(slug)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Company not found".to_string()))
    }

    /// The active allowlist row for (account, email), if any
    pub async fn find_active_entry(
        &self,
        account_id: &AccountId,
        email: &str,
    ) -> ServiceResult<Option<AllowlistEntry>> {
        let email = normalize_email(email);
        Ok(self
            .storage
            .find_allowlist_entry(account_id, &email)
            .await?
            .filter(|entry| entry.is_active))
    }

    /// Resolve the client an allowlisted email belongs to.
    ///
    /// A row without a client link is linked to the account's client with the
    /// same email when one exists. Repeated calls converge on the same client id.
    pub async fn resolve_allowlist_client(
        &self,
        account_id: &AccountId,
        email: &str,
    ) -> ServiceResult<AllowlistResolution> {
        let mut entry = self
            .find_active_entry(account_id, email)
            .await?
            .ok_or_else(|| ServiceError::Forbidden("Email not authorized".to_string()))?;

        if let Some(client_id) = entry.client_id {
            return Ok(AllowlistResolution {
                entry,
                client_id: Some(client_id),
            });
        }

        let client = self
            .storage
            .find_client_by_email(account_id, &entry.email)
            .await?;

        let client_id = match client {
            Some(client) => {
                let linked = self
                    .storage
                    .link_allowlist_client(&entry.id, &client.id)
                    .await?
                    .unwrap_or(client.id);
                tracing::info!(
                    account_id = %account_id,
                    entry_id = %entry.id,
                    client_id = %linked,
                    "Linked allowlist entry to client"
                );
                Some(linked)
            }
            None => None,
        };

        entry.client_id = client_id;
        Ok(AllowlistResolution { entry, client_id })
    }

    pub async fn check_portal(
        &self,
        company_slug: &str,
        client_slug: Option<&str>,
        email: Option<&str>,
    ) -> ServiceResult<PortalCheck> {
        let account = self.resolve_account(company_slug).await?;

        let Some(email) = email.filter(|e| !e.trim().is_empty()) else {
            return self.check_any_portal(&account, client_slug).await;
        };

        let resolution = match self.resolve_allowlist_client(&account.id, email).await {
            Ok(resolution) => resolution,
            Err(ServiceError::Forbidden(_)) => {
                return Ok(PortalCheck {
                    exists: false,
                    authorized: Some(false),
                    portal: None,
                    client_slug: None,
                })
            }
            Err(e) => return Err(e),
        };

        let Some(client_id) = resolution.client_id else {
            return Ok(PortalCheck {
                exists: false,
                authorized: Some(true),
                portal: None,
                client_slug: resolution.entry.client_slug,
            });
        };

        let portal = self
            .storage
            .find_portal_for_client(&account.id, &client_id)
            .await?;
        let client_slug = match self.storage.get_client(&client_id).await? {
            Some(client) => Some(client.slug),
            None => resolution.entry.client_slug,
        };

        Ok(PortalCheck {
            exists: portal.is_some(),
            authorized: Some(true),
            portal,
            client_slug,
        })
    }

    async fn check_any_portal(
        &self,
        account: &Account,
        client_slug: Option<&str>,
    ) -> ServiceResult<PortalCheck> {
        let portals = self.storage.list_portals_for_account(&account.id).await?;

        let mut found = None;
        for portal in portals {
            match client_slug {
                None => {
                    found = Some(portal);
                    break;
                }
                Some(slug) => {
                    let client = self.storage.get_client(&portal.client_id).await?;
                    if client.is_some_and(|c| c.slug == slug) {
                        found = Some(portal);
                        break;
                    }
                }
            }
        }

        Ok(PortalCheck {
            exists: found.is_some(),
            authorized: None,
            portal: found,
            client_slug: client_slug.map(str::to_string),
        })
    }

    pub async fn lookup_client_slug(
        &self,
        company_slug: &str,
        email: &str,
    ) -> ServiceResult<ClientSlugLookup> {
        let account = self.resolve_account(company_slug).await?;
        let entry = self
            .find_active_entry(&account.id, email)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Email not found for this company".to_string()))?;

        Ok(ClientSlugLookup {
            name: entry.name,
            role: entry.role,
            company_slug: entry.company_slug,
            client_slug: entry.client_slug,
        })
    }

    /// Authorize new emails for a client's portal, returning how many were added
    pub async fn add_members(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
        members: Vec<NewMember>,
    ) -> ServiceResult<usize> {
        let client = self
            .storage
            .get_client(client_id)
            .await?
            .filter(|c| c.account_id == *account_id)
            .ok_or_else(|| ServiceError::NotFound("Client not found".to_string()))?;
        let account = self
            .storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Account not found".to_string()))?;
        let company_slug = account.company_slug().ok_or_else(|| {
            ServiceError::BadRequest(
                "Set a company or owner name before inviting portal members".to_string(),
            )
        })?;

        let valid: Vec<NewMember> = members
            .into_iter()
            .filter(|m| !m.email.trim().is_empty() && !m.name.trim().is_empty())
            .collect();
        if valid.is_empty() {
            return Err(ServiceError::BadRequest("No valid members provided".to_string()));
        }

        let mut added = 0;
        for member in valid {
            let email = normalize_email(&member.email);
            if self
                .storage
                .find_allowlist_entry(account_id, &email)
                .await?
                .is_some()
            {
                tracing::debug!(account_id = %account_id, "Skipping member already on allowlist");
                continue;
            }

            let mut entry = AllowlistEntry::new(*account_id, &email);
            entry.client_id = Some(client.id);
            entry.name = Some(member.name.trim().to_string());
            entry.role = member.role.filter(|r| !r.trim().is_empty());
            entry.company_slug = Some(company_slug.clone());
            entry.client_slug = Some(client.slug.clone());

            match self.storage.insert_allowlist_entry(entry).await {
                Ok(()) => added += 1,
                Err(StorageError::Conflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(
            account_id = %account_id,
            client_id = %client_id,
            added,
            "Portal members added"
        );
        Ok(added)
    }

    pub async fn list_members(
        &self,
        account_id: &AccountId,
        client_id: &ClientId,
    ) -> ServiceResult<Vec<AllowlistEntry>> {
        let entries = self
            .storage
            .list_allowlist_for_client(account_id, client_id)
            .await?;
        Ok(entries.iter().map(AllowlistEntry::redacted).collect())
    }

    pub async fn deactivate_member(
        &self,
        account_id: &AccountId,
        entry_id: &AllowlistEntryId,
    ) -> ServiceResult<AllowlistEntry> {
        let mut entry = self
            .storage
            .get_allowlist_entry(entry_id)
            .await?
            .filter(|e| e.account_id == *account_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Member {} not found", entry_id)))?;

        entry.is_active = false;
        self.storage.update_allowlist_entry(entry.clone()).await?;
        tracing::info!(account_id = %account_id, entry_id = %entry_id, "Portal member deactivated");
        Ok(entry.redacted())
    }

    pub async fn increment_view(&self, portal_id: &PortalId) -> ServiceResult<u64> {
        self.storage
            .increment_portal_views(portal_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Portal not found".to_string()))
    }
}

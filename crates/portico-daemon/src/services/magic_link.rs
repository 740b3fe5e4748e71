//! Magic-link login, client portal sessions and portal passwords
//!
//! Bearer secrets (link tokens, session and refresh tokens) are 32 random bytes,
//! hex encoded. Only their blake3 digests are stored.

use super::identity::IdentityService;
use super::PortalIdentity;
use crate::config::{AuthConfig, Environment};
use crate::error::{ServiceError, ServiceResult};
use crate::integrations::{EmailMessage, Mailer};
use crate::storage::{PurgeCounts, Storage};
use chrono::{DateTime, Duration, Utc};
use portico_types::{
    normalize_email, AccountId, AllowlistEntry, ClientSessionRecord, MagicLinkRecord,
    SessionRejection,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const TOKEN_BYTES: usize = 32;

/// Fresh random bearer secret
pub(crate) fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Digest under which a bearer secret is stored
pub(crate) fn hash_token(token: &str) -> String {
    blake3::hash(token.trim().as_bytes()).to_hex().to_string()
}

fn require(fields: &[&str], message: &str) -> ServiceResult<()> {
    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err(ServiceError::BadRequest(message.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MagicLinkRequest {
    pub email: String,
    pub company_slug: String,
    pub client_slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MagicLinkIssued {
    pub email: String,
    pub name: Option<String>,
    pub role: Option<String>,
}

/// A freshly created client session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionGrant {
    pub email: String,
    pub name: Option<String>,
    pub role: Option<String>,
    pub company_slug: String,
    pub client_slug: String,
    pub session_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct MagicLinkService {
    storage: Arc<dyn Storage>,
    identity: IdentityService,
    mailer: Arc<dyn Mailer>,
    auth: AuthConfig,
    public_base_url: String,
    environment: Environment,
}

impl MagicLinkService {
    pub fn new(
        storage: Arc<dyn Storage>,
        identity: IdentityService,
        mailer: Arc<dyn Mailer>,
        auth: AuthConfig,
        public_base_url: String,
        environment: Environment,
    ) -> Self {
        Self {
            storage,
            identity,
            mailer,
            auth,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            environment,
        }
    }

    /// Issue a login link for an allowlisted email and send it.
    ///
    /// Email delivery failures are logged, not returned.
    pub async fn request_magic_link(
        &self,
        request: MagicLinkRequest,
    ) -> ServiceResult<MagicLinkIssued> {
        require(
            &[&request.email, &request.company_slug, &request.client_slug],
            "Email, company slug and client slug are required",
        )?;
        let company_slug = request.company_slug.trim();
        let client_slug = request.client_slug.trim();

        let account = self.identity.resolve_account(company_slug).await?;
        let entry = self
            .identity
            .find_active_entry(&account.id, &request.email)
            .await?
            .filter(|entry| entry.matches_portal(company_slug, client_slug))
            .ok_or_else(|| {
                ServiceError::Forbidden("Email not authorized for this portal".to_string())
            })?;

        let token = generate_token();
        let now = Utc::now();
        self.storage
            .insert_magic_link(MagicLinkRecord {
                token_hash: hash_token(&token),
                email: entry.email.clone(),
                company_slug: company_slug.to_string(),
                client_slug: client_slug.to_string(),
                expires_at: now + Duration::seconds(self.auth.magic_link_ttl_secs),
                used_at: None,
                created_at: now,
            })
            .await?;

        let link = format!(
            "{}/{}?client={}&token={}",
            self.public_base_url, company_slug, client_slug, token
        );
        let message = EmailMessage::magic_link(
            &entry.email,
            account.display_name(),
            &link,
            self.auth.magic_link_ttl_secs / 60,
        );
        if let Err(e) = self.mailer.send(&message).await {
            tracing::warn!(account_id = %account.id, error = %e, "Magic link email not delivered");
        }
        if self.environment.is_development() {
            tracing::info!(link = %link, "Magic link issued");
        }

        tracing::info!(account_id = %account.id, company_slug, client_slug, "Magic link requested");
        Ok(MagicLinkIssued {
            email: entry.email,
            name: entry.name,
            role: entry.role,
        })
    }

    /// Exchange a magic-link token for a client session
    pub async fn validate_magic_link(
        &self,
        token: &str,
        company_slug: &str,
        client_slug: &str,
    ) -> ServiceResult<SessionGrant> {
        require(
            &[token, company_slug, client_slug],
            "Token, company slug and client slug are required",
        )?;
        let company_slug = company_slug.trim();
        let client_slug = client_slug.trim();
        let invalid = || ServiceError::BadRequest("Invalid or expired token".to_string());

        let token_hash = hash_token(token);
        let now = Utc::now();
        let link = self
            .storage
            .get_magic_link(&token_hash)
            .await?
            .filter(|link| link.is_for_portal(company_slug, client_slug))
            .filter(|link| !link.is_expired(now))
            .ok_or_else(invalid)?;

        if !self.auth.magic_link_reusable {
            if link.used_at.is_some() {
                return Err(invalid());
            }
            if !self.storage.consume_magic_link(&token_hash, now).await? {
                return Err(invalid());
            }
        }

        let account = self.identity.resolve_account(company_slug).await?;
        let entry = self
            .identity
            .find_active_entry(&account.id, &link.email)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Portal access not found".to_string()))?;

        let grant = self
            .issue_session(account.id, &entry, company_slug, client_slug)
            .await?;
        tracing::info!(account_id = %account.id, company_slug, client_slug, "Magic link redeemed");
        Ok(grant)
    }

    async fn issue_session(
        &self,
        account_id: AccountId,
        entry: &AllowlistEntry,
        company_slug: &str,
        client_slug: &str,
    ) -> ServiceResult<SessionGrant> {
        let session_token = generate_token();
        let refresh_token = generate_token();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.auth.session_ttl_secs);

        self.storage
            .insert_session(ClientSessionRecord {
                session_hash: hash_token(&session_token),
                refresh_hash: hash_token(&refresh_token),
                account_id,
                email: entry.email.clone(),
                company_slug: company_slug.to_string(),
                client_slug: client_slug.to_string(),
                expires_at,
                refresh_expires_at: now + Duration::seconds(self.auth.refresh_ttl_secs),
                created_at: now,
            })
            .await?;

        Ok(SessionGrant {
            email: entry.email.clone(),
            name: entry.name.clone(),
            role: entry.role.clone(),
            company_slug: company_slug.to_string(),
            client_slug: client_slug.to_string(),
            session_token,
            refresh_token,
            expires_at,
        })
    }

    /// Authenticate a portal request
    pub async fn validate_session(
        &self,
        session_token: &str,
        company_slug: &str,
        client_slug: &str,
    ) -> ServiceResult<PortalIdentity> {
        if session_token.trim().is_empty() {
            return Err(ServiceError::session_rejected(SessionRejection::Invalid));
        }
        let session = self
            .storage
            .get_session(&hash_token(session_token))
            .await?
            .filter(|s| s.is_for_portal(company_slug.trim(), client_slug.trim()))
            .ok_or_else(|| ServiceError::session_rejected(SessionRejection::Invalid))?;

        if session.is_expired(Utc::now()) {
            return Err(ServiceError::session_rejected(SessionRejection::Expired));
        }

        let resolution = match self
            .identity
            .resolve_allowlist_client(&session.account_id, &session.email)
            .await
        {
            Ok(resolution) => resolution,
            Err(ServiceError::Forbidden(_)) => {
                return Err(ServiceError::NotFound("Portal access not found".to_string()))
            }
            Err(e) => return Err(e),
        };

        Ok(PortalIdentity {
            email: session.email,
            name: resolution.entry.name,
            role: resolution.entry.role,
            account_id: session.account_id,
            client_id: resolution.client_id,
            company_slug: session.company_slug,
            client_slug: session.client_slug,
        })
    }

    /// Rotate a session: the old one is deleted and a new pair issued
    pub async fn refresh_session(&self, refresh_token: &str) -> ServiceResult<SessionGrant> {
        if refresh_token.trim().is_empty() {
            return Err(ServiceError::BadRequest("Refresh token is required".to_string()));
        }
        let session = self
            .storage
            .find_session_by_refresh(&hash_token(refresh_token))
            .await?
            .ok_or_else(|| ServiceError::session_rejected(SessionRejection::Invalid))?;

        if !session.is_refreshable(Utc::now()) {
            self.storage.delete_session(&session.session_hash).await?;
            return Err(ServiceError::session_rejected(SessionRejection::Expired));
        }

        let entry = self
            .identity
            .find_active_entry(&session.account_id, &session.email)
            .await?
            .ok_or_else(|| ServiceError::session_rejected(SessionRejection::Invalid))?;

        if !self.storage.delete_session(&session.session_hash).await? {
            // Another refresh with the same token won the race.
            return Err(ServiceError::session_rejected(SessionRejection::Invalid));
        }

        self.issue_session(
            session.account_id,
            &entry,
            &session.company_slug,
            &session.client_slug,
        )
        .await
    }

    /// Log out; returns whether a session was removed
    pub async fn revoke_session(&self, session_token: &str) -> ServiceResult<bool> {
        Ok(self
            .storage
            .delete_session(&hash_token(session_token))
            .await?)
    }

    /// Set a portal password.
    ///
    /// The first password needs only an allowlisted email. Replacing an existing
    /// one requires a live session held by that same email.
    pub async fn setup_password(
        &self,
        email: &str,
        password: &str,
        slug: &str,
        session_token: Option<&str>,
    ) -> ServiceResult<()> {
        require(&[email, password, slug], "Email, password and slug are required")?;
        let account = self.identity.resolve_account_by_any_slug(slug).await?;
        let mut entry = self
            .identity
            .find_active_entry(&account.id, email)
            .await?
            .ok_or_else(|| ServiceError::Forbidden("Email not authorized".to_string()))?;

        if entry.password_hash.is_some() {
            self.require_session_for(&account.id, &entry.email, session_token)
                .await?;
        }

        if password.chars().count() < self.auth.min_password_len {
            return Err(ServiceError::Validation(format!(
                "Password must be at least {} characters",
                self.auth.min_password_len
            )));
        }

        let password = password.to_string();
        let cost = self.auth.password_hash_cost;
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| ServiceError::Internal(format!("password hashing task failed: {}", e)))?
            .map_err(|e| ServiceError::Internal(format!("password hashing failed: {}", e)))?;

        entry.password_hash = Some(hash);
        entry.has_password_setup = true;
        self.storage.update_allowlist_entry(entry).await?;

        tracing::info!(account_id = %account.id, "Portal password set");
        Ok(())
    }

    async fn require_session_for(
        &self,
        account_id: &AccountId,
        email: &str,
        session_token: Option<&str>,
    ) -> ServiceResult<()> {
        let token = session_token.filter(|t| !t.trim().is_empty()).ok_or_else(|| {
            ServiceError::unauthorized("Sign in to change an existing password")
        })?;
        let session = self
            .storage
            .get_session(&hash_token(token))
            .await?
            .ok_or_else(|| ServiceError::session_rejected(SessionRejection::Invalid))?;
        if session.is_expired(Utc::now()) {
            return Err(ServiceError::session_rejected(SessionRejection::Expired));
        }
        if session.account_id != *account_id || normalize_email(&session.email) != email {
            tracing::warn!(%account_id, "Password change with another member's session");
            return Err(ServiceError::unauthorized(
                "Session does not belong to this email",
            ));
        }
        Ok(())
    }

    /// Delete expired magic links and sessions past their refresh window
    pub async fn purge_expired(&self) -> ServiceResult<PurgeCounts> {
        let purged = self.storage.purge_expired(Utc::now()).await?;
        if purged.total() > 0 {
            tracing::info!(
                magic_links = purged.magic_links,
                sessions = purged.sessions,
                "Purged expired credentials"
            );
        }
        Ok(purged)
    }

    /// Check a portal password and open a session on success
    pub async fn verify_password(
        &self,
        email: &str,
        password: &str,
        slug: &str,
    ) -> ServiceResult<SessionGrant> {
        require(&[email, password, slug], "Email, password and slug are required")?;
        let account = self.identity.resolve_account_by_any_slug(slug).await?;
        let email = normalize_email(email);
        let resolution = self.identity.resolve_allowlist_client(&account.id, &email).await?;
        let entry = resolution.entry;

        let hash = entry
            .password_hash
            .clone()
            .filter(|_| entry.has_password_setup)
            .ok_or_else(|| ServiceError::BadRequest("Password not set up".to_string()))?;

        let candidate = password.to_string();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(candidate, &hash))
            .await
            .map_err(|e| ServiceError::Internal(format!("password check task failed: {}", e)))?
            .map_err(|e| ServiceError::Internal(format!("password check failed: {}", e)))?;
        if !matches {
            tracing::warn!(account_id = %account.id, "Portal password rejected");
            return Err(ServiceError::unauthorized("Invalid email or password"));
        }

        let company_slug = account
            .company_slug()
            .unwrap_or_else(|| slug.trim().to_string());
        let client_slug = match (entry.client_slug.clone(), resolution.client_id) {
            (Some(slug), _) => slug,
            (None, Some(client_id)) => self
                .storage
                .get_client(&client_id)
                .await?
                .map(|c| c.slug)
                .ok_or_else(|| ServiceError::NotFound("Client not found".to_string()))?,
            (None, None) => {
                return Err(ServiceError::NotFound(
                    "No portal is linked to this email".to_string(),
                ))
            }
        };

        self.issue_session(account.id, &entry, &company_slug, &client_slug)
            .await
    }
}

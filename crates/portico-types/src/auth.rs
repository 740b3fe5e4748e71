//! Magic-link tokens and client portal sessions
//!
//! Only digests of the bearer secrets are ever persisted; the raw values exist
//! in the email and in the client's browser.

use crate::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pending passwordless login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagicLinkRecord {
    pub token_hash: String,
    pub email: String,
    pub company_slug: String,
    pub client_slug: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MagicLinkRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_for_portal(&self, company_slug: &str, client_slug: &str) -> bool {
        self.company_slug == company_slug && self.client_slug == client_slug
    }
}

/// An authenticated client portal session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSessionRecord {
    pub session_hash: String,
    pub refresh_hash: String,
    pub account_id: AccountId,
    pub email: String,
    pub company_slug: String,
    pub client_slug: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ClientSessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_refreshable(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at > now
    }

    pub fn is_for_portal(&self, company_slug: &str, client_slug: &str) -> bool {
        self.company_slug == company_slug && self.client_slug == client_slug
    }
}

/// Why a session token was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRejection {
    Expired,
    Invalid,
}

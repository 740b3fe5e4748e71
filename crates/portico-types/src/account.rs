//! Tenant accounts and subscription plan tiers

use crate::slug::slugify;
use crate::AccountId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An agency or freelancer workspace. Every other record is scoped to one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Company display name; source of the company slug
    pub company_name: Option<String>,

    /// Owner's full name; slug fallback when there is no company name
    pub owner_name: Option<String>,

    /// Current plan tier, mirrored from the payment processor
    #[serde(default)]
    pub plan_tier: PlanTier,

    /// Raw subscription status reported by the payment processor
    pub subscription_status: Option<String>,

    /// Customer id at the payment processor
    pub billing_customer_id: Option<String>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Account {
    pub fn new(company_name: impl Into<String>) -> Self {
        Self {
            id: AccountId::generate(),
            company_name: Some(company_name.into()),
            owner_name: None,
            plan_tier: PlanTier::Free,
            subscription_status: None,
            billing_customer_id: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Slug used in portal URLs, derived from the company name or the owner's name.
    pub fn company_slug(&self) -> Option<String> {
        [self.company_name.as_deref(), self.owner_name.as_deref()]
            .into_iter()
            .flatten()
            .map(slugify)
            .find(|slug| !slug.is_empty())
    }

    /// Slug derived from the owner's name only
    pub fn owner_slug(&self) -> Option<String> {
        self.owner_name
            .as_deref()
            .map(slugify)
            .filter(|slug| !slug.is_empty())
    }

    /// Name shown to clients
    pub fn display_name(&self) -> &str {
        self.company_name
            .as_deref()
            .or(self.owner_name.as_deref())
            .unwrap_or("Your agency")
    }
}

/// Account subscription level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Premium,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Premium => "premium",
        }
    }

    /// Whether a checkout session can be opened for this tier
    pub fn is_purchasable(&self) -> bool {
        !matches!(self, PlanTier::Free)
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = crate::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            "premium" => Ok(PlanTier::Premium),
            other => Err(crate::ParseEnumError::new("plan tier", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_slug_prefers_company_name() {
        let mut account = Account::new("Acme Studio");
        account.owner_name = Some("Jane Doe".to_string());
        assert_eq!(account.company_slug().as_deref(), Some("acme-studio"));
    }

    #[test]
    fn test_company_slug_falls_back_to_owner() {
        let mut account = Account::new("   ");
        account.owner_name = Some("Jane Doe".to_string());
        assert_eq!(account.company_slug().as_deref(), Some("jane-doe"));
    }

    #[test]
    fn test_company_slug_absent() {
        let mut account = Account::new("");
        account.company_name = None;
        assert_eq!(account.company_slug(), None);
    }

    #[test]
    fn test_plan_tier_parsing() {
        assert_eq!("pro".parse::<PlanTier>().unwrap(), PlanTier::Pro);
        assert!("enterprise".parse::<PlanTier>().is_err());
        assert!(!PlanTier::Free.is_purchasable());
        assert!(PlanTier::Premium.is_purchasable());
    }
}

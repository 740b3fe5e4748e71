//! Subscription checkout and payment webhook reconciliation

use super::AgencyUser;
use crate::config::BillingConfig;
use crate::error::{IntegrationError, ServiceError, ServiceResult};
use crate::integrations::{
    verify_webhook_signature, CheckoutSessionRequest, PaymentGateway, WebhookEvent,
};
use crate::storage::Storage;
use chrono::Utc;
use portico_types::{AccountId, PlanTier};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

/// What a webhook event changed
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    PlanUpdated {
        account_id: AccountId,
        plan_tier: PlanTier,
    },
    Ignored,
}

pub struct BillingService {
    storage: Arc<dyn Storage>,
    payments: Arc<dyn PaymentGateway>,
    config: BillingConfig,
    public_base_url: String,
}

impl BillingService {
    pub fn new(
        storage: Arc<dyn Storage>,
        payments: Arc<dyn PaymentGateway>,
        config: BillingConfig,
        public_base_url: String,
    ) -> Self {
        Self {
            storage,
            payments,
            config,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn price_for(&self, tier: PlanTier) -> Option<&str> {
        match tier {
            PlanTier::Pro => self.config.pro_price_id.as_deref(),
            PlanTier::Premium => self.config.premium_price_id.as_deref(),
            PlanTier::Free => None,
        }
    }

    fn tier_for_price(&self, price_id: Option<&str>) -> PlanTier {
        match price_id {
            Some(id) if self.config.pro_price_id.as_deref() == Some(id) => PlanTier::Pro,
            Some(id) if self.config.premium_price_id.as_deref() == Some(id) => PlanTier::Premium,
            _ => PlanTier::Free,
        }
    }

    /// Open a subscription checkout for `plan_tier`, creating the billing customer if needed
    pub async fn create_checkout(
        &self,
        user: &AgencyUser,
        plan_tier: &str,
    ) -> ServiceResult<CheckoutResponse> {
        let tier = plan_tier
            .trim()
            .parse::<PlanTier>()
            .ok()
            .filter(PlanTier::is_purchasable)
            .ok_or_else(|| ServiceError::BadRequest("Invalid plan tier".to_string()))?;
        let price_id = self
            .price_for(tier)
            .ok_or(IntegrationError::NotConfigured("Plan price"))?
            .to_string();

        let mut account = self
            .storage
            .get_account(&user.account_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Account not found".to_string()))?;

        let customer_id = match account.billing_customer_id.clone() {
            Some(id) => id,
            None => {
                let mut metadata = BTreeMap::new();
                metadata.insert("account_id".to_string(), account.id.to_string());
                metadata.insert("user_id".to_string(), user.user_id.to_string());
                let id = self
                    .payments
                    .create_customer(None, Some(account.display_name()), &metadata)
                    .await?;
                account.billing_customer_id = Some(id.clone());
                self.storage.upsert_account(account.clone()).await?;
                id
            }
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("accountId".to_string(), account.id.to_string());
        metadata.insert("planTier".to_string(), tier.to_string());

        let session = self
            .payments
            .create_checkout_session(&CheckoutSessionRequest {
                customer_id,
                price_id,
                success_url: self.config.success_url.clone().unwrap_or_else(|| {
                    format!("{}/settings/billing?success=true", self.public_base_url)
                }),
                cancel_url: self.config.cancel_url.clone().unwrap_or_else(|| {
                    format!("{}/settings/billing?canceled=true", self.public_base_url)
                }),
                metadata,
            })
            .await?;

        tracing::info!(account_id = %account.id, plan = %tier, "Checkout session created");
        Ok(CheckoutResponse {
            session_id: session.id,
            url: session.url,
        })
    }

    /// Verify and apply a payment webhook
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> ServiceResult<WebhookOutcome> {
        let secret = self
            .config
            .webhook_secret
            .as_deref()
            .ok_or(IntegrationError::NotConfigured("Webhook secret"))?;
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ServiceError::BadRequest("Missing signature header".to_string()))?;

        verify_webhook_signature(
            payload,
            signature,
            secret,
            self.config.webhook_tolerance_secs,
            Utc::now().timestamp(),
        )
        .map_err(|e| {
            tracing::warn!(error = %e, "Webhook signature rejected");
            ServiceError::BadRequest(format!("Webhook signature verification failed: {}", e))
        })?;

        let event = WebhookEvent::parse(payload)
            .map_err(|e| ServiceError::BadRequest(e.to_string()))?;
        tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Webhook received");

        match event.event_type.as_str() {
            "checkout.session.completed" => self.apply_checkout_completed(&event).await,
            "customer.subscription.created"
            | "customer.subscription.updated"
            | "customer.subscription.deleted" => self.apply_subscription_change(&event).await,
            _ => Ok(WebhookOutcome::Ignored),
        }
    }

    async fn apply_checkout_completed(&self, event: &WebhookEvent) -> ServiceResult<WebhookOutcome> {
        let account_id = event
            .metadata("accountId")
            .and_then(|id| id.parse::<AccountId>().ok());
        let tier = event
            .metadata("planTier")
            .and_then(|t| t.parse::<PlanTier>().ok());
        let (Some(account_id), Some(tier)) = (account_id, tier) else {
            tracing::warn!(event_id = %event.id, "Checkout event without account metadata");
            return Ok(WebhookOutcome::Ignored);
        };

        let Some(mut account) = self.storage.get_account(&account_id).await? else {
            tracing::warn!(event_id = %event.id, account_id = %account_id, "Checkout for unknown account");
            return Ok(WebhookOutcome::Ignored);
        };

        account.plan_tier = tier;
        account.subscription_status = Some("active".to_string());
        if account.billing_customer_id.is_none() {
            account.billing_customer_id = event.customer().map(str::to_string);
        }
        self.storage.upsert_account(account).await?;

        tracing::info!(account_id = %account_id, plan = %tier, "Plan upgraded after checkout");
        Ok(WebhookOutcome::PlanUpdated {
            account_id,
            plan_tier: tier,
        })
    }

    async fn apply_subscription_change(&self, event: &WebhookEvent) -> ServiceResult<WebhookOutcome> {
        let Some(customer) = event.customer() else {
            return Ok(WebhookOutcome::Ignored);
        };
        let Some(mut account) = self
            .storage
            .find_account_by_billing_customer(customer)
            .await?
        else {
            tracing::warn!(event_id = %event.id, "Subscription event for unknown customer");
            return Ok(WebhookOutcome::Ignored);
        };

        let status = event.status().unwrap_or("canceled");
        let tier = match status {
            "active" | "trialing" => self.tier_for_price(event.first_price_id()),
            _ => PlanTier::Free,
        };

        account.plan_tier = tier;
        account.subscription_status = Some(status.to_string());
        let account_id = account.id;
        self.storage.upsert_account(account).await?;

        tracing::info!(account_id = %account_id, plan = %tier, status, "Subscription synced");
        Ok(WebhookOutcome::PlanUpdated {
            account_id,
            plan_tier: tier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IntegrationResult;
    use crate::integrations::CheckoutSession;
    use crate::storage::InMemoryStorage;
    use async_trait::async_trait;
    use hmac::{Hmac, Mac};
    use portico_types::{Account, UserId};
    use sha2::Sha256;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeGateway {
        customers: Mutex<Vec<BTreeMap<String, String>>>,
        sessions: Mutex<Vec<CheckoutSessionRequest>>,
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_customer(
            &self,
            _email: Option<&str>,
            _name: Option<&str>,
            metadata: &BTreeMap<String, String>,
        ) -> IntegrationResult<String> {
            let mut customers = self.customers.lock().await;
            customers.push(metadata.clone());
            Ok(format!("cus_{}", customers.len()))
        }

        async fn create_checkout_session(
            &self,
            request: &CheckoutSessionRequest,
        ) -> IntegrationResult<CheckoutSession> {
            self.sessions.lock().await.push(request.clone());
            Ok(CheckoutSession {
                id: "cs_1".to_string(),
                url: Some("https://checkout.test/cs_1".to_string()),
            })
        }
    }

    struct Fixture {
        service: BillingService,
        storage: Arc<dyn Storage>,
        gateway: Arc<FakeGateway>,
        user: AgencyUser,
    }

    async fn fixture() -> Fixture {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let account = Account::new("Acme");
        storage.upsert_account(account.clone()).await.unwrap();
        let gateway = Arc::new(FakeGateway::default());
        let config = BillingConfig {
            webhook_secret: Some("whsec_test".to_string()),
            pro_price_id: Some("price_pro".to_string()),
            premium_price_id: Some("price_premium".to_string()),
            ..BillingConfig::default()
        };
        Fixture {
            service: BillingService::new(
                storage.clone(),
                gateway.clone(),
                config,
                "https://app.test".to_string(),
            ),
            storage,
            gateway,
            user: AgencyUser {
                account_id: account.id,
                user_id: UserId::generate(),
                user_name: "Jane".to_string(),
            },
        }
    }

    fn signed(payload: &str) -> String {
        let t = Utc::now().timestamp();
        let mut mac = Hmac::<Sha256>::new_from_slice(b"whsec_test").unwrap();
        mac.update(format!("{}.{}", t, payload).as_bytes());
        format!("t={},v1={}", t, hex::encode(mac.finalize().into_bytes()))
    }

    #[tokio::test]
    async fn test_checkout_creates_customer_once() {
        let f = fixture().await;
        let first = f.service.create_checkout(&f.user, "pro").await.unwrap();
        assert_eq!(first.session_id, "cs_1");
        f.service.create_checkout(&f.user, "premium").await.unwrap();

        let customers = f.gateway.customers.lock().await;
        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0]["account_id"], f.user.account_id.to_string());

        let sessions = f.gateway.sessions.lock().await;
        assert_eq!(sessions[0].price_id, "price_pro");
        assert_eq!(sessions[0].metadata["planTier"], "pro");
        assert_eq!(sessions[1].customer_id, "cus_1");
        assert_eq!(
            sessions[0].success_url,
            "https://app.test/settings/billing?success=true"
        );

        let account = f.storage.get_account(&f.user.account_id).await.unwrap().unwrap();
        assert_eq!(account.billing_customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn test_checkout_rejects_free_and_unknown_tiers() {
        let f = fixture().await;
        for tier in ["free", "enterprise", ""] {
            let err = f.service.create_checkout(&f.user, tier).await.unwrap_err();
            assert!(matches!(err, ServiceError::BadRequest(_)));
        }
    }

    #[tokio::test]
    async fn test_checkout_completed_upgrades_plan() {
        let f = fixture().await;
        let payload = serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "customer": "cus_9",
                "metadata": { "accountId": f.user.account_id.to_string(), "planTier": "premium" }
            } }
        })
        .to_string();

        let outcome = f
            .service
            .handle_webhook(payload.as_bytes(), Some(&signed(&payload)))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::PlanUpdated {
                account_id: f.user.account_id,
                plan_tier: PlanTier::Premium
            }
        );

        let account = f.storage.get_account(&f.user.account_id).await.unwrap().unwrap();
        assert_eq!(account.plan_tier, PlanTier::Premium);
        assert_eq!(account.subscription_status.as_deref(), Some("active"));
        assert_eq!(account.billing_customer_id.as_deref(), Some("cus_9"));
    }

    #[tokio::test]
    async fn test_subscription_events_follow_status() {
        let f = fixture().await;
        let mut account = f.storage.get_account(&f.user.account_id).await.unwrap().unwrap();
        account.billing_customer_id = Some("cus_7".to_string());
        f.storage.upsert_account(account).await.unwrap();

        let event = |event_type: &str, status: &str| {
            serde_json::json!({
                "id": "evt",
                "type": event_type,
                "data": { "object": {
                    "customer": "cus_7",
                    "status": status,
                    "items": { "data": [ { "price": { "id": "price_pro" } } ] }
                } }
            })
            .to_string()
        };

        let payload = event("customer.subscription.updated", "trialing");
        f.service
            .handle_webhook(payload.as_bytes(), Some(&signed(&payload)))
            .await
            .unwrap();
        let account = f.storage.get_account(&f.user.account_id).await.unwrap().unwrap();
        assert_eq!(account.plan_tier, PlanTier::Pro);

        let payload = event("customer.subscription.deleted", "canceled");
        f.service
            .handle_webhook(payload.as_bytes(), Some(&signed(&payload)))
            .await
            .unwrap();
        let account = f.storage.get_account(&f.user.account_id).await.unwrap().unwrap();
        assert_eq!(account.plan_tier, PlanTier::Free);
        assert_eq!(account.subscription_status.as_deref(), Some("canceled"));
    }

    #[tokio::test]
    async fn test_webhook_signature_required() {
        let f = fixture().await;
        let payload = r#"{"id":"evt","type":"invoice.paid","data":{"object":{}}}"#;

        let err = f.service.handle_webhook(payload.as_bytes(), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let err = f
            .service
            .handle_webhook(payload.as_bytes(), Some("t=1,v1=deadbeef"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let outcome = f
            .service
            .handle_webhook(payload.as_bytes(), Some(&signed(payload)))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);
    }
}

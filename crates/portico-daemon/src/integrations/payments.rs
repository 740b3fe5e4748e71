//! Payment processor client and webhook verification

use super::{check_status, http_client};
use crate::error::{IntegrationError, IntegrationResult};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Parameters of a subscription checkout
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSessionRequest {
    pub customer_id: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a customer, returning its id
    async fn create_customer(
        &self,
        email: Option<&str>,
        name: Option<&str>,
        metadata: &BTreeMap<String, String>,
    ) -> IntegrationResult<String>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> IntegrationResult<CheckoutSession>;
}

#[derive(Debug, Default)]
pub struct DisabledPaymentGateway;

#[async_trait]
impl PaymentGateway for DisabledPaymentGateway {
    async fn create_customer(
        &self,
        _email: Option<&str>,
        _name: Option<&str>,
        _metadata: &BTreeMap<String, String>,
    ) -> IntegrationResult<String> {
        Err(IntegrationError::NotConfigured("Payment processing"))
    }

    async fn create_checkout_session(
        &self,
        _request: &CheckoutSessionRequest,
    ) -> IntegrationResult<CheckoutSession> {
        Err(IntegrationError::NotConfigured("Payment processing"))
    }
}

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    id: String,
}

/// Stripe-compatible form-encoded API client
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_url: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(api_url: &str, secret_key: &str) -> IntegrationResult<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(30))?,
            api_url: api_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        form: &[(String, String)],
    ) -> IntegrationResult<T> {
        let response = self
            .client
            .post(format!("{}/v1/{}", self.api_url, endpoint))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))
    }
}

fn metadata_fields(metadata: &BTreeMap<String, String>) -> impl Iterator<Item = (String, String)> + '_ {
    metadata
        .iter()
        .map(|(k, v)| (format!("metadata[{}]", k), v.clone()))
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_customer(
        &self,
        email: Option<&str>,
        name: Option<&str>,
        metadata: &BTreeMap<String, String>,
    ) -> IntegrationResult<String> {
        let mut form = Vec::new();
        if let Some(email) = email {
            form.push(("email".to_string(), email.to_string()));
        }
        if let Some(name) = name {
            form.push(("name".to_string(), name.to_string()));
        }
        form.extend(metadata_fields(metadata));

        let customer: CustomerResponse = self.post_form("customers", &form).await?;
        tracing::info!(customer_id = %customer.id, "Billing customer created");
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> IntegrationResult<CheckoutSession> {
        let mut form = vec![
            ("customer".to_string(), request.customer_id.clone()),
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), request.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
        ];
        form.extend(metadata_fields(&request.metadata));

        self.post_form("checkout/sessions", &form).await
    }
}

/// Webhook signature failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookSignatureError {
    #[error("signature header has no timestamp")]
    MissingTimestamp,

    #[error("signature header has no v1 signature")]
    MissingSignature,

    #[error("signature timestamp outside tolerance")]
    Stale,

    #[error("no signature matches the payload")]
    Mismatch,
}

/// Verify a `t=<unix>,v1=<hex>` header: HMAC-SHA256 of `"{t}.{payload}"` keyed by
/// `secret`, with `t` within `tolerance_secs` of `now_unix`.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now_unix: i64,
) -> Result<(), WebhookSignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookSignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(WebhookSignatureError::MissingSignature);
    }
    if now_unix.abs_diff(timestamp) > tolerance_secs.max(0).unsigned_abs() {
        return Err(WebhookSignatureError::Stale);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookSignatureError::Mismatch)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    if signatures
        .iter()
        .any(|candidate| mac.clone().verify_slice(candidate).is_ok())
    {
        Ok(())
    } else {
        Err(WebhookSignatureError::Mismatch)
    }
}

/// A decoded webhook event
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: Value,
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> IntegrationResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| IntegrationError::InvalidResponse(format!("invalid webhook event: {}", e)))
    }

    fn object_str(&self, key: &str) -> Option<&str> {
        self.data.object.get(key).and_then(Value::as_str)
    }

    pub fn customer(&self) -> Option<&str> {
        self.object_str("customer")
    }

    pub fn status(&self) -> Option<&str> {
        self.object_str("status")
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.data
            .object
            .get("metadata")
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
    }

    /// Price id of the subscription's first item
    pub fn first_price_id(&self) -> Option<&str> {
        self.data
            .object
            .pointer("/items/data/0/price/id")
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = format!("t=1700000000,v1={}", sign("whsec", 1_700_000_000, payload));
        assert_eq!(
            verify_webhook_signature(payload, &header, "whsec", 300, 1_700_000_100),
            Ok(())
        );
    }

    #[test]
    fn test_any_v1_may_match() {
        let payload = b"{}";
        let header = format!(
            "t=10,v1={},v1={}",
            "00".repeat(32),
            sign("whsec", 10, payload)
        );
        assert!(verify_webhook_signature(payload, &header, "whsec", 300, 10).is_ok());
    }

    #[test]
    fn test_rejections() {
        let payload = b"{}";
        let good = sign("whsec", 10, payload);

        assert_eq!(
            verify_webhook_signature(payload, &format!("v1={}", good), "whsec", 300, 10),
            Err(WebhookSignatureError::MissingTimestamp)
        );
        assert_eq!(
            verify_webhook_signature(payload, "t=10", "whsec", 300, 10),
            Err(WebhookSignatureError::MissingSignature)
        );
        assert_eq!(
            verify_webhook_signature(payload, &format!("t=10,v1={}", good), "whsec", 300, 1000),
            Err(WebhookSignatureError::Stale)
        );
        assert_eq!(
            verify_webhook_signature(b"{ }", &format!("t=10,v1={}", good), "whsec", 300, 10),
            Err(WebhookSignatureError::Mismatch)
        );
        assert_eq!(
            verify_webhook_signature(payload, &format!("t=10,v1={}", good), "other", 300, 10),
            Err(WebhookSignatureError::Mismatch)
        );
    }

    #[test]
    fn test_extreme_timestamps_are_stale() {
        for t in [i64::MIN, i64::MAX, -1] {
            assert_eq!(
                verify_webhook_signature(
                    b"{}",
                    &format!("t={},v1=00", t),
                    "whsec",
                    300,
                    1_700_000_000
                ),
                Err(WebhookSignatureError::Stale)
            );
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_signed_payloads_verify_and_tampering_fails(
            payload in proptest::collection::vec(proptest::num::u8::ANY, 0..256),
            timestamp in 1_000_000i64..2_000_000_000,
            skew in -300i64..=300,
            flip in proptest::num::usize::ANY,
        ) {
            let header = format!("t={},v1={}", timestamp, sign("whsec", timestamp, &payload));
            proptest::prop_assert!(
                verify_webhook_signature(&payload, &header, "whsec", 300, timestamp + skew).is_ok()
            );

            let mut tampered = payload.clone();
            if tampered.is_empty() {
                tampered.push(0);
            } else {
                let i = flip % tampered.len();
                tampered[i] ^= 0x01;
            }
            proptest::prop_assert_eq!(
                verify_webhook_signature(&tampered, &header, "whsec", 300, timestamp),
                Err(WebhookSignatureError::Mismatch)
            );
        }
    }

    #[test]
    fn test_event_accessors() {
        let event = WebhookEvent::parse(
            br#"{
                "id": "evt_1",
                "type": "customer.subscription.updated",
                "data": { "object": {
                    "customer": "cus_1",
                    "status": "active",
                    "metadata": { "accountId": "a" },
                    "items": { "data": [ { "price": { "id": "price_pro" } } ] }
                } }
            }"#,
        )
        .unwrap();

        assert_eq!(event.event_type, "customer.subscription.updated");
        assert_eq!(event.customer(), Some("cus_1"));
        assert_eq!(event.status(), Some("active"));
        assert_eq!(event.metadata("accountId"), Some("a"));
        assert_eq!(event.first_price_id(), Some("price_pro"));
    }

    #[tokio::test]
    async fn test_checkout_session_is_form_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("authorization", "Bearer sk_test"))
            .and(body_string_contains("mode=subscription"))
            .and(body_string_contains("metadata%5BplanTier%5D=pro"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_1",
                "url": "https://checkout.test/cs_1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = StripeGateway::new(&server.uri(), "sk_test").unwrap();
        let mut metadata = BTreeMap::new();
        metadata.insert("planTier".to_string(), "pro".to_string());
        let session = gateway
            .create_checkout_session(&CheckoutSessionRequest {
                customer_id: "cus_1".to_string(),
                price_id: "price_pro".to_string(),
                success_url: "https://app.test/ok".to_string(),
                cancel_url: "https://app.test/cancel".to_string(),
                metadata,
            })
            .await
            .unwrap();

        assert_eq!(session.id, "cs_1");
        assert_eq!(session.url.as_deref(), Some("https://checkout.test/cs_1"));
    }
}

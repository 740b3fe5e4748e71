//! Third-party service clients
//!
//! Every service sits behind a trait so the daemon can run with any of them
//! unconfigured. The `Disabled*` implementations answer `NotConfigured`.

pub mod llm;
pub mod mailer;
pub mod object_store;
pub mod payments;

use crate::config::DaemonConfig;
use crate::error::IntegrationResult;
use std::sync::Arc;
use std::time::Duration;

pub use llm::{CompletionClient, DisabledCompletionClient, OpenAiClient};
pub use mailer::{DisabledMailer, EmailMessage, Mailer, ResendMailer};
pub use object_store::{DisabledObjectStore, HttpObjectStore, ObjectStore};
pub use payments::{
    verify_webhook_signature, CheckoutSession, CheckoutSessionRequest, DisabledPaymentGateway,
    PaymentGateway, StripeGateway, WebhookEvent, WebhookSignatureError,
};

/// Handles to every external service
#[derive(Clone)]
pub struct Integrations {
    pub mailer: Arc<dyn Mailer>,
    pub object_store: Arc<dyn ObjectStore>,
    pub llm: Arc<dyn CompletionClient>,
    pub payments: Arc<dyn PaymentGateway>,
}

impl Integrations {
    /// Build clients from configuration, falling back to disabled ones where
    /// credentials are missing.
    pub fn from_config(config: &DaemonConfig) -> IntegrationResult<Self> {
        let mailer: Arc<dyn Mailer> = match config.email.api_key.as_deref() {
            Some(key) => Arc::new(ResendMailer::new(
                &config.email.api_url,
                key,
                &config.email.from,
            )?),
            None => {
                tracing::warn!("Email delivery not configured");
                Arc::new(DisabledMailer)
            }
        };

        let object_store: Arc<dyn ObjectStore> = match (
            config.storage_service.api_url.as_deref(),
            config.storage_service.service_key.as_deref(),
        ) {
            (Some(url), Some(key)) => Arc::new(HttpObjectStore::new(
                url,
                key,
                config.storage_service.public_url.as_deref(),
            )?),
            _ => {
                tracing::warn!("Object storage not configured");
                Arc::new(DisabledObjectStore)
            }
        };

        let llm: Arc<dyn CompletionClient> = match config.llm.api_key.as_deref() {
            Some(key) => Arc::new(OpenAiClient::new(
                &config.llm.api_url,
                key,
                &config.llm.model,
                Duration::from_secs(config.llm.timeout_secs),
            )?),
            None => {
                tracing::warn!("LLM completions not configured");
                Arc::new(DisabledCompletionClient)
            }
        };

        let payments: Arc<dyn PaymentGateway> = match config.billing.secret_key.as_deref() {
            Some(key) => Arc::new(StripeGateway::new(&config.billing.api_url, key)?),
            None => {
                tracing::warn!("Payment processing not configured");
                Arc::new(DisabledPaymentGateway)
            }
        };

        Ok(Self {
            mailer,
            object_store,
            llm,
            payments,
        })
    }

    /// All services disabled
    pub fn disabled() -> Self {
        Self {
            mailer: Arc::new(DisabledMailer),
            object_store: Arc::new(DisabledObjectStore),
            llm: Arc::new(DisabledCompletionClient),
            payments: Arc::new(DisabledPaymentGateway),
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> IntegrationResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| crate::error::IntegrationError::Transport(format!(
            "failed to build HTTP client: {}",
            e
        )))
}

/// Turn a non-success response into `Upstream`, keeping a bounded slice of the body
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> IntegrationResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(crate::error::IntegrationError::Upstream {
        status: status.as_u16(),
        body: truncate(&body, 320),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

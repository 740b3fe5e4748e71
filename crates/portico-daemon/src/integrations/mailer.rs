//! Transactional email

use super::{check_status, http_client};
use crate::error::{IntegrationError, IntegrationResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A plain-text email
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

impl EmailMessage {
    /// The portal login email
    pub fn magic_link(to: &str, portal_name: &str, link: &str, ttl_minutes: i64) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("Your login link for {}", portal_name),
            text: format!(
                "Hi,\n\nUse the link below to sign in to the {} client portal:\n\n{}\n\n\
                 The link expires in {} minutes. If you did not request it you can ignore this email.\n",
                portal_name, link, ttl_minutes
            ),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a message, returning the provider's message id
    async fn send(&self, message: &EmailMessage) -> IntegrationResult<String>;
}

#[derive(Debug, Default)]
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _message: &EmailMessage) -> IntegrationResult<String> {
        Err(IntegrationError::NotConfigured("Email delivery"))
    }
}

#[derive(Debug, Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

/// Resend-compatible HTTP mailer
#[derive(Debug, Clone)]
pub struct ResendMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn new(api_url: &str, api_key: &str, from: &str) -> IntegrationResult<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(15))?,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> IntegrationResult<String> {
        let body = SendEmailBody {
            from: &self.from,
            to: [&message.to],
            subject: &message.subject,
            text: &message.text,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let parsed: SendEmailResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;

        tracing::debug!(message_id = %parsed.id, "Email accepted");
        Ok(parsed.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_resend_mailer_posts_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_test"))
            .and(body_partial_json(serde_json::json!({
                "from": "Portico <login@portico.test>",
                "to": ["ada@example.com"],
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "email_1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mailer =
            ResendMailer::new(&server.uri(), "re_test", "Portico <login@portico.test>").unwrap();
        let message =
            EmailMessage::magic_link("ada@example.com", "Acme", "http://x/acme?token=t", 60);

        assert_eq!(mailer.send(&message).await.unwrap(), "email_1");
    }

    #[tokio::test]
    async fn test_resend_mailer_surfaces_upstream_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid from"))
            .mount(&server)
            .await;

        let mailer = ResendMailer::new(&server.uri(), "re_test", "bad").unwrap();
        let err = mailer
            .send(&EmailMessage::magic_link("a@b.co", "Acme", "http://x", 60))
            .await
            .unwrap_err();

        assert!(matches!(err, IntegrationError::Upstream { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_disabled_mailer() {
        let err = DisabledMailer
            .send(&EmailMessage::magic_link("a@b.co", "Acme", "http://x", 60))
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::NotConfigured(_)));
    }
}

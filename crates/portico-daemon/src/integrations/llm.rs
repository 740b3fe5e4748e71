//! Chat-completion client for the content generators

use super::{check_status, http_client};
use crate::error::{IntegrationError, IntegrationResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run one system + user exchange in JSON mode and return the raw message content
    async fn complete_json(&self, system_prompt: &str, user_prompt: &str) -> IntegrationResult<String>;
}

#[derive(Debug, Default)]
pub struct DisabledCompletionClient;

#[async_trait]
impl CompletionClient for DisabledCompletionClient {
    async fn complete_json(&self, _system: &str, _user: &str) -> IntegrationResult<String> {
        Err(IntegrationError::NotConfigured("LLM completions"))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

/// OpenAI-compatible `/chat/completions` client
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_url: &str, api_key: &str, model: &str, timeout: Duration) -> IntegrationResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete_json(&self, system_prompt: &str, user_prompt: &str) -> IntegrationResult<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let body: OpenAiResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| IntegrationError::InvalidResponse("completion had no content".to_string()))
    }
}

/// Parse completion content that must be a JSON object
pub fn parse_json_object(content: &str) -> IntegrationResult<serde_json::Map<String, Value>> {
    match serde_json::from_str::<Value>(content.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(IntegrationError::InvalidResponse(
            "completion was not a JSON object".to_string(),
        )),
        Err(e) => Err(IntegrationError::InvalidResponse(format!(
            "completion was not valid JSON: {}",
            e
        ))),
    }
}

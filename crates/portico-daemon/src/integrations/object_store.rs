//! Object storage for uploaded files

use super::{check_status, http_client};
use crate::error::{IntegrationError, IntegrationResult};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `bucket/path`. Existing objects are never overwritten.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> IntegrationResult<()>;

    /// Publicly reachable URL of an object
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

#[derive(Debug, Default)]
pub struct DisabledObjectStore;

#[async_trait]
impl ObjectStore for DisabledObjectStore {
    async fn upload(
        &self,
        _bucket: &str,
        _path: &str,
        _content_type: &str,
        _bytes: Vec<u8>,
    ) -> IntegrationResult<()> {
        Err(IntegrationError::NotConfigured("Object storage"))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("/storage/v1/object/public/{}/{}", bucket, path)
    }
}

/// Supabase-storage-compatible REST client
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    api_url: String,
    service_key: String,
    public_url: String,
}

impl HttpObjectStore {
    pub fn new(api_url: &str, service_key: &str, public_url: Option<&str>) -> IntegrationResult<Self> {
        let api_url = api_url.trim_end_matches('/').to_string();
        let public_url = public_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| api_url.clone());
        Ok(Self {
            client: http_client(Duration::from_secs(120))?,
            api_url,
            service_key: service_key.to_string(),
            public_url,
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> IntegrationResult<()> {
        let size = bytes.len();
        let response = self
            .client
            .post(format!("{}/storage/v1/object/{}/{}", self.api_url, bucket, path))
            .bearer_auth(&self.service_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;

        check_status(response).await?;
        tracing::debug!(bucket, path, size, "Object stored");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.public_url, bucket, path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_upload_without_upsert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/portal/acct/brief.pdf"))
            .and(header("x-upsert", "false"))
            .and(header("content-type", "application/pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Key": "portal/acct/brief.pdf"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(&server.uri(), "service", None).unwrap();
        store
            .upload("portal", "acct/brief.pdf", "application/pdf", b"%PDF".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upload_conflict_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("Duplicate"))
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(&server.uri(), "service", None).unwrap();
        let err = store
            .upload("portal", "a.txt", "text/plain", b"hi".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Upstream { status: 409, .. }));
    }

    #[test]
    fn test_public_url_prefers_configured_host() {
        let store =
            HttpObjectStore::new("http://internal:8000/", "k", Some("https://cdn.portico.test"))
                .unwrap();
        assert_eq!(
            store.public_url("portal", "a/b.png"),
            "https://cdn.portico.test/storage/v1/object/public/portal/a/b.png"
        );
    }
}

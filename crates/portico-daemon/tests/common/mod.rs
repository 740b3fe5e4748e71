//! Shared fixtures for the HTTP API tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use portico_daemon::api::create_router;
use portico_daemon::api::rest::state::AppState;
use portico_daemon::error::IntegrationResult;
use portico_daemon::integrations::{EmailMessage, Mailer, ObjectStore};
use portico_daemon::{DaemonConfig, InMemoryStorage, Integrations, Services, Storage};
use portico_types::{Account, AllowlistEntry, Client, Project, UserId};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceExt;

pub const COMPANY_SLUG: &str = "acme-studio";
pub const CLIENT_SLUG: &str = "ada-lovelace";
pub const CLIENT_EMAIL: &str = "ada@example.com";
pub const WEBHOOK_SECRET: &str = "whsec_test";

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> IntegrationResult<String> {
        self.sent.lock().await.push(message.clone());
        Ok(format!("msg-{}", self.sent.lock().await.len()))
    }
}

impl RecordingMailer {
    /// Token from the most recent magic link email
    pub async fn last_token(&self) -> String {
        let sent = self.sent.lock().await;
        let text = &sent.last().expect("no email sent").text;
        let start = text.find("token=").expect("no token in email") + "token=".len();
        text[start..]
            .chars()
            .take_while(char::is_ascii_hexdigit)
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    pub objects: Mutex<Vec<(String, String, usize)>>,
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        _content_type: &str,
        bytes: Vec<u8>,
    ) -> IntegrationResult<()> {
        self.objects
            .lock()
            .await
            .push((bucket.to_string(), path.to_string(), bytes.len()));
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://files.test/{}/{}", bucket, path)
    }
}

pub struct TestApp {
    pub router: Router,
    pub storage: Arc<dyn Storage>,
    pub mailer: Arc<RecordingMailer>,
    pub objects: Arc<MemoryObjectStore>,
    pub account: Account,
    pub client: Client,
    pub project: Project,
    pub user_id: UserId,
}

impl TestApp {
    pub async fn new() -> Self {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());

        let account = Account::new("Acme Studio");
        storage.upsert_account(account.clone()).await.unwrap();

        let client = Client::new(account.id, "Ada", "Lovelace", CLIENT_EMAIL);
        storage.upsert_client(client.clone()).await.unwrap();

        let mut entry = AllowlistEntry::new(account.id, CLIENT_EMAIL);
        entry.name = Some("Ada".to_string());
        entry.company_slug = Some(COMPANY_SLUG.to_string());
        entry.client_slug = Some(CLIENT_SLUG.to_string());
        storage.insert_allowlist_entry(entry).await.unwrap();

        let project = Project::new(account.id, Some(client.id), "Rebrand");
        storage.upsert_project(project.clone()).await.unwrap();

        let mut config = DaemonConfig::development();
        config.server.public_base_url = "https://portal.test".to_string();
        config.auth.password_hash_cost = 4;
        config.billing.webhook_secret = Some(WEBHOOK_SECRET.to_string());

        let mailer = Arc::new(RecordingMailer::default());
        let objects = Arc::new(MemoryObjectStore::default());
        let mut integrations = Integrations::disabled();
        integrations.mailer = mailer.clone();
        integrations.object_store = objects.clone();

        let services = Services::new(storage.clone(), &integrations, &config);
        let router = create_router(AppState::new(services, "memory", &config.server));

        Self {
            router,
            storage,
            mailer,
            objects,
            account,
            client,
            project,
            user_id: UserId::generate(),
        }
    }

    /// Headers the auth gateway adds for an agency user of this account
    pub fn agency_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("x-account-id", self.account.id.to_string()),
            ("x-user-id", self.user_id.to_string()),
            ("x-user-name", "Jane Doe".to_string()),
        ]
    }

    /// Headers for a portal request with the given session token
    pub fn portal_headers(session_token: &str) -> Vec<(&'static str, String)> {
        vec![
            ("authorization", format!("Bearer {}", session_token)),
            ("x-company-slug", COMPANY_SLUG.to_string()),
            ("x-client-slug", CLIENT_SLUG.to_string()),
        ]
    }

    /// Sign in through a magic link and return the session token
    pub async fn portal_session(&self) -> String {
        let (status, _) = self
            .post_json(
                "/api/v1/portal/magic-link",
                &[],
                serde_json::json!({
                    "email": CLIENT_EMAIL,
                    "company_slug": COMPANY_SLUG,
                    "client_slug": CLIENT_SLUG,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let token = self.mailer.last_token().await;
        let (status, grant) = self
            .post_json(
                "/api/v1/portal/validate-token",
                &[],
                serde_json::json!({
                    "token": token,
                    "company_slug": COMPANY_SLUG,
                    "client_slug": CLIENT_SLUG,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        grant["session_token"].as_str().unwrap().to_string()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, headers: &[(&str, String)]) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        headers: &[(&str, String)],
        body: Value,
    ) -> (StatusCode, Value) {
        self.json_request("POST", uri, headers, body).await
    }

    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        headers: &[(&str, String)],
        body: Value,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }
}

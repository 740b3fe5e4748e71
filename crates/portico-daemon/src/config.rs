//! Configuration for portico-daemon

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Portal authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Client uploads
    #[serde(default)]
    pub uploads: UploadConfig,

    /// Transactional email provider
    #[serde(default)]
    pub email: EmailConfig,

    /// Object storage service
    #[serde(default)]
    pub storage_service: ObjectStorageConfig,

    /// LLM completions provider
    #[serde(default)]
    pub llm: LlmConfig,

    /// Payment processor
    #[serde(default)]
    pub billing: BillingConfig,

    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            uploads: UploadConfig::default(),
            email: EmailConfig::default(),
            storage_service: ObjectStorageConfig::default(),
            llm: LlmConfig::default(),
            billing: BillingConfig::default(),
            environment: Environment::Development,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Public origin of the portal front end, used in emailed and shared links
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
            request_timeout_secs: default_request_timeout(),
            max_body_size: default_max_body_size(),
            public_base_url: default_public_base_url(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Portal authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Magic link lifetime
    #[serde(default = "default_magic_link_ttl")]
    pub magic_link_ttl_secs: i64,

    /// Portal session lifetime
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: i64,

    /// Refresh token lifetime
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: i64,

    /// Accept a magic link more than once until it expires
    #[serde(default)]
    pub magic_link_reusable: bool,

    /// bcrypt cost for portal passwords
    #[serde(default = "default_hash_cost")]
    pub password_hash_cost: u32,

    /// Minimum portal password length
    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,

    /// How often expired magic links and sessions are deleted; 0 disables the sweep
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            magic_link_ttl_secs: default_magic_link_ttl(),
            session_ttl_secs: default_session_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
            magic_link_reusable: false,
            password_hash_cost: default_hash_cost(),
            min_password_len: default_min_password_len(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

/// Client upload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Object storage bucket for portal content
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Largest accepted upload in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            max_file_size: default_max_file_size(),
        }
    }
}

/// Transactional email provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_email_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_email_from")]
    pub from: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: default_email_api_url(),
            api_key: None,
            from: default_email_from(),
        }
    }
}

/// Object storage service
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObjectStorageConfig {
    /// Base URL of the storage REST API
    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default)]
    pub service_key: Option<String>,

    /// Base URL for public object links; defaults to `api_url`
    #[serde(default)]
    pub public_url: Option<String>,
}

/// LLM completions provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_llm_api_url(),
            api_key: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Payment processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_billing_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub secret_key: Option<String>,

    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default)]
    pub pro_price_id: Option<String>,

    #[serde(default)]
    pub premium_price_id: Option<String>,

    /// Redirect after a completed checkout; defaults to the public base URL
    #[serde(default)]
    pub success_url: Option<String>,

    #[serde(default)]
    pub cancel_url: Option<String>,

    /// Maximum accepted age of a signed webhook
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            api_url: default_billing_api_url(),
            secret_key: None,
            webhook_secret: None,
            pro_price_id: None,
            premium_price_id: None,
            success_url: None,
            cancel_url: None,
            webhook_tolerance_secs: default_webhook_tolerance(),
        }
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("Unknown environment: {}", other)),
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    90
}

fn default_max_body_size() -> usize {
    60 * 1024 * 1024
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_magic_link_ttl() -> i64 {
    3600
}

fn default_session_ttl() -> i64 {
    86_400
}

fn default_refresh_ttl() -> i64 {
    30 * 86_400
}

fn default_hash_cost() -> u32 {
    10
}

fn default_min_password_len() -> usize {
    8
}

fn default_purge_interval() -> u64 {
    3600
}

fn default_bucket() -> String {
    "client-portal-content".to_string()
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

fn default_email_api_url() -> String {
    "https://api.resend.com".to_string()
}

fn default_email_from() -> String {
    "Portico <noreply@portico.local>".to_string()
}

fn default_llm_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_billing_api_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_webhook_tolerance() -> i64 {
    300
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file, then `PORTICO_*` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // PORTICO_BILLING__SECRET_KEY -> billing.secret_key
        builder = builder.add_source(
            config::Environment::with_prefix("PORTICO")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Create a development configuration
    pub fn development() -> Self {
        Self::default()
    }
}

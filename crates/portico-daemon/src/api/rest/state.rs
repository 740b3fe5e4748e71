//! Application state for API handlers

use crate::config::ServerConfig;
use crate::services::Services;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Domain services
    pub services: Arc<Services>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// Name of the active storage backend
    pub storage_backend: &'static str,

    /// Request body ceiling, uploads included
    pub max_body_size: usize,

    /// Whether to answer cross-origin requests
    pub enable_cors: bool,

    /// Per-request deadline
    pub request_timeout: Duration,
}

impl AppState {
    /// Create new application state
    pub fn new(services: Services, storage_backend: &'static str, server: &ServerConfig) -> Self {
        Self {
            services: Arc::new(services),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
            storage_backend,
            max_body_size: server.max_body_size,
            enable_cors: server.enable_cors,
            request_timeout: Duration::from_secs(server.request_timeout_secs),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}

//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::integrations::Integrations;
use crate::services::{MagicLinkService, Services};
use crate::storage::{InMemoryStorage, PostgresStorage, Storage};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Portico daemon server
pub struct Server {
    config: DaemonConfig,
    state: AppState,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let (storage, backend) = connect_storage(&config.storage).await?;
        let integrations = Integrations::from_config(&config)?;
        let services = Services::new(storage, &integrations, &config);
        let state = AppState::new(services, backend, &config.server);

        Ok(Self { config, state })
    }

    /// The fully layered router, for embedding or tests
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let app = self.router();

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Portico daemon listening on {}", addr);
        tracing::info!(
            environment = ?self.config.environment,
            storage = self.state.storage_backend,
            "Serving portal API"
        );

        let sweeper = spawn_credential_sweeper(
            self.state.services.magic_link.clone(),
            self.config.auth.purge_interval_secs,
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Portico daemon shutting down");
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        Ok(())
    }
}

/// Periodically delete expired magic links and dead sessions.
///
/// Returns `None` when the interval is 0.
pub fn spawn_credential_sweeper(
    magic_link: Arc<MagicLinkService>,
    interval_secs: u64,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        tracing::info!("Credential purge disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs, "Credential purge started");

        loop {
            interval.tick().await;
            if let Err(e) = magic_link.purge_expired().await {
                tracing::error!(error = %e, "Credential purge failed");
            }
        }
    }))
}

async fn connect_storage(
    config: &StorageConfig,
) -> DaemonResult<(Arc<dyn Storage>, &'static str)> {
    match config {
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Ok((Arc::new(InMemoryStorage::new()), "memory"))
        }
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let storage =
                PostgresStorage::new(url, *max_connections, *connect_timeout_secs).await?;
            tracing::info!(max_connections, "Connected to PostgreSQL");
            Ok((Arc::new(storage), "postgres"))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

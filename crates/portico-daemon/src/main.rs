//! Portico daemon - multi-tenant client portal backend
//!
//! The daemon provides:
//! - Passwordless and password portal sign-in for clients
//! - Contract signing, file exchange, invoices and project messages
//! - Subscription billing through the payment processor
//! - AI-assisted content planning for the agency

use clap::Parser;
use portico_daemon::config::{DaemonConfig, Environment, StorageConfig};
use portico_daemon::error::{DaemonError, DaemonResult};
use portico_daemon::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Portico daemon CLI
#[derive(Parser)]
#[command(name = "porticod")]
#[command(about = "Portico - client portal backend", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PORTICO_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "PORTICO_LISTEN_ADDR")]
    listen: Option<String>,

    /// PostgreSQL connection URL; in-memory storage when absent
    #[arg(long, env = "PORTICO_DATABASE_URL")]
    database_url: Option<String>,

    /// Deployment environment (development or production)
    #[arg(short, long, env = "PORTICO_ENVIRONMENT")]
    environment: Option<String>,

    /// Log level
    #[arg(long, env = "PORTICO_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "PORTICO_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }

    if let Some(url) = cli.database_url {
        config.storage = StorageConfig::Postgres {
            url,
            max_connections: 10,
            connect_timeout_secs: 30,
        };
    }

    if let Some(environment) = cli.environment {
        config.environment = match environment.to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "production" | "prod" => Environment::Production,
            other => {
                return Err(DaemonError::Config(format!(
                    "Unknown environment: {}",
                    other
                )));
            }
        };
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        "Starting Portico daemon"
    );

    let server = Server::new(config).await?;
    server.run().await
}

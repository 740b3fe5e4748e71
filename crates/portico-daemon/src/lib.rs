//! Portico daemon library
//!
//! This module provides the core components for the Portico client portal backend:
//! - REST API handlers and identity extractors
//! - Storage backends (in-memory and PostgreSQL)
//! - Domain services (portal auth, contracts, files, billing, growth)
//! - Third-party integrations behind traits
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod integrations;
pub mod server;
pub mod services;
pub mod storage;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, IntegrationError, ServiceError, StorageError};
pub use integrations::Integrations;
pub use server::Server;
pub use services::Services;
pub use storage::{InMemoryStorage, PostgresStorage, Storage};

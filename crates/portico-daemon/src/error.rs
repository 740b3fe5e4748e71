//! Error types for portico-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use portico_types::SessionRejection;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Integration client could not be built
    #[error("Integration error: {0}")]
    Integration(#[from] IntegrationError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict (e.g., already exists)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("Query error: {0}")]
    Query(String),
}

/// Failures talking to a third-party service
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// Credentials or endpoint missing from configuration
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// Request never produced a response
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status from the service
    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for IntegrationError {
    fn from(err: reqwest::Error) -> Self {
        IntegrationError::Transport(err.to_string())
    }
}

/// Domain failures raised by the service layer
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    Unauthorized {
        message: String,
        rejection: Option<SessionRejection>,
    },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        ServiceError::Unauthorized {
            message: message.into(),
            rejection: None,
        }
    }

    pub fn session_rejected(rejection: SessionRejection) -> Self {
        let message = match rejection {
            SessionRejection::Expired => "Session expired",
            SessionRejection::Invalid => "Invalid session",
        };
        ServiceError::Unauthorized {
            message: message.to_string(),
            rejection: Some(rejection),
        }
    }
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("{0}")]
    NotFound(String),

    /// Bad request
    #[error("{0}")]
    BadRequest(String),

    /// Missing or rejected credentials
    #[error("{message}")]
    Unauthorized {
        message: String,
        rejection: Option<SessionRejection>,
    },

    /// Authenticated but not allowed
    #[error("{0}")]
    Forbidden(String),

    /// Conflict
    #[error("{0}")]
    Conflict(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Validation error
    #[error("{0}")]
    Validation(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Third-party service failure
    #[error("{0}")]
    Integration(#[from] IntegrationError),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::BadRequest(m) => ApiError::BadRequest(m),
            ServiceError::Unauthorized { message, rejection } => {
                ApiError::Unauthorized { message, rejection }
            }
            ServiceError::Forbidden(m) => ApiError::Forbidden(m),
            ServiceError::NotFound(m) => ApiError::NotFound(m),
            ServiceError::Conflict(m) => ApiError::Conflict(m),
            ServiceError::Validation(m) => ApiError::Validation(m),
            ServiceError::Storage(e) => ApiError::Storage(e),
            ServiceError::Integration(e) => ApiError::Integration(e),
            ServiceError::Internal(m) => ApiError::Internal(m),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Storage(StorageError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Storage(StorageError::Conflict(_)) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ApiError::Integration(IntegrationError::NotConfigured(_)) => {
                (StatusCode::BAD_GATEWAY, "NOT_CONFIGURED")
            }
            ApiError::Integration(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
        };

        let details = match &self {
            ApiError::Unauthorized {
                rejection: Some(rejection),
                ..
            } => Some(serde_json::json!({ "error_type": rejection })),
            _ => None,
        };

        if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type alias for integration calls
pub type IntegrationResult<T> = Result<T, IntegrationError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

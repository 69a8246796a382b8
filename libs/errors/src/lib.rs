//! Unified error handling for the IoT portal services
//!
//! Every library in the workspace returns [`PortalResult`]. Job code keeps
//! per-item failures as values and only propagates errors that abort a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// ErrorInfo - API error response type
// ============================================================================

/// Standard error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code (HTTP status)
    pub code: u16,
    /// Stable machine readable code, e.g. `REGISTRY_ERROR`
    pub error_code: String,
    /// Error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Field-specific errors for validation
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub field_errors: HashMap<String, Vec<String>>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: 500,
            error_code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            details: None,
            field_errors: HashMap::new(),
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn with_error_code(mut self, error_code: impl Into<String>) -> Self {
        self.error_code = error_code.into();
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn add_field_error(mut self, field: impl Into<String>, error: impl Into<String>) -> Self {
        self.field_errors
            .entry(field.into())
            .or_default()
            .push(error.into());
        self
    }
}

// ============================================================================
// PortalError - Main error type
// ============================================================================

/// Main error type for the portal services
#[derive(Debug, Error)]
pub enum PortalError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // ======================================
    // Database Errors
    // ======================================
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    // ======================================
    // Remote registry Errors
    // ======================================
    /// The remote registry answered with an unexpected status or payload
    #[error("Registry error: {operation}: {message}")]
    Registry { operation: String, message: String },

    /// Remote or repository call failed on the server side (HTTP 5xx)
    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Timeout waiting for response from {0}")]
    Timeout(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // ======================================
    // Domain Errors
    // ======================================
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid twin {device_id}: {reason}")]
    InvalidTwin { device_id: String, reason: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Job already running: {0}")]
    JobBusy(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    // ======================================
    // File & Serialization Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ======================================
    // Catch-all
    // ======================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using PortalError
pub type PortalResult<T> = Result<T, PortalError>;

/// Error category, used for classification, log levels and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    Configuration,
    Database,
    Network,
    Timeout,
    Permission,
    Validation,
    NotFound,
    ResourceBusy,
    Internal,
    Unknown,
}

impl PortalError {
    pub fn registry(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Registry {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn invalid_twin(device_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTwin {
            device_id: device_id.into(),
            reason: reason.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidTwin { .. } => 400,
            Self::Authentication(_) => 401,
            Self::NotFound { .. } => 404,
            Self::JobBusy(_) => 409,
            Self::Registry { .. } | Self::HttpClient(_) => 502,
            Self::InternalServerError(_) => 500,
            Self::Timeout(_) => 504,
            _ => 500,
        }
    }

    /// Stable code for API payloads and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::MissingConfig(_) => "MISSING_CONFIG",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Sqlite(_) => "SQLITE_ERROR",
            Self::Registry { .. } => "REGISTRY_ERROR",
            Self::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            Self::Authentication(_) => "AUTHENTICATION_FAILED",
            Self::Timeout(_) => "TIMEOUT",
            Self::HttpClient(_) => "HTTP_CLIENT_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidTwin { .. } => "INVALID_TWIN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::JobBusy(_) => "JOB_BUSY",
            Self::Scheduler(_) => "SCHEDULER_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Deserialization(_) => "DESERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidConfig { .. } | Self::MissingConfig(_) => {
                ErrorCategory::Configuration
            },
            Self::Database(_) | Self::Sqlite(_) => ErrorCategory::Database,
            Self::Registry { .. } | Self::HttpClient(_) | Self::InternalServerError(_) => {
                ErrorCategory::Network
            },
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Authentication(_) => ErrorCategory::Permission,
            Self::Validation(_) | Self::InvalidTwin { .. } => ErrorCategory::Validation,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::JobBusy(_) => ErrorCategory::ResourceBusy,
            Self::Scheduler(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Deserialization(_)
            | Self::Internal(_) => ErrorCategory::Internal,
            Self::Other(_) => ErrorCategory::Unknown,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::ResourceBusy
        )
    }

    /// Get log level
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Database => Level::ERROR,
            ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::Permission => {
                Level::WARN
            },
            ErrorCategory::Validation | ErrorCategory::NotFound => Level::INFO,
            _ => Level::WARN,
        }
    }

    /// Convert to API ErrorInfo for HTTP responses
    pub fn to_error_info(&self) -> ErrorInfo {
        let mut error_info = ErrorInfo::new(self.to_string())
            .with_code(self.status_code())
            .with_error_code(self.error_code());

        match self {
            Self::InvalidConfig { field, reason } => {
                error_info = error_info.add_field_error(field, reason);
            },
            Self::InvalidTwin { device_id, reason } => {
                error_info = error_info.add_field_error(device_id, reason);
            },
            Self::Registry { operation, .. } => {
                error_info = error_info.with_details(format!("Operation: {}", operation));
            },
            _ => {},
        }

        error_info
    }
}

// Conversion traits for common error types
impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for PortalError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}

impl From<std::num::ParseIntError> for PortalError {
    fn from(err: std::num::ParseIntError) -> Self {
        Self::Validation(format!("Invalid integer: {}", err))
    }
}

#[cfg(feature = "axum-support")]
impl axum::response::IntoResponse for PortalError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(self.to_error_info())).into_response()
    }
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::PortalError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::PortalError::Configuration(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr) => {
        $crate::PortalError::Validation($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::PortalError::Validation(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(PortalError::Validation("test".into()).status_code(), 400);
        assert_eq!(PortalError::Authentication("test".into()).status_code(), 401);
        assert_eq!(PortalError::not_found("device dev-1").status_code(), 404);
        assert_eq!(
            PortalError::InternalServerError("test".into()).status_code(),
            500
        );
        assert_eq!(
            PortalError::registry("query devices", "bad payload").status_code(),
            502
        );
    }

    #[test]
    fn test_error_retryable() {
        assert!(PortalError::Timeout("iothub".into()).is_retryable());
        assert!(PortalError::InternalServerError("count".into()).is_retryable());
        assert!(!PortalError::Validation("test".into()).is_retryable());
        assert!(!PortalError::not_found("model").is_retryable());
    }

    #[test]
    fn test_error_info() {
        let error = PortalError::invalid_twin("dev-1", "missing modelId tag");
        let info = error.to_error_info();
        assert_eq!(info.code, 400);
        assert_eq!(info.error_code, "INVALID_TWIN");
        assert!(info.field_errors.contains_key("dev-1"));
    }

    #[test]
    fn test_macros() {
        let err = config_error!("bad cron {}", "* *");
        assert!(matches!(err, PortalError::Configuration(ref m) if m == "bad cron * *"));
        let err = validation_error!("empty id");
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}

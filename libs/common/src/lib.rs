//! Portal basic library
//!
//! Provides functions shared by the portal services:
//! - logging and service bootstrap
//! - graceful shutdown
//! - SQLite client
//! - shared configuration sections

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub mod logging;
pub mod service_bootstrap;
pub mod service_config;
pub mod shutdown;

pub use service_config::{
    helpers, timeouts, ApiConfig, DatabaseConfig, LoggingConfig, ValidationResult,
    DEFAULT_API_HOST, DEFAULT_DB_PATH, LOCALHOST_HOST,
};

// Re-export common dependencies
pub use anyhow;
pub use tokio;
pub use tokio_util::sync::CancellationToken;

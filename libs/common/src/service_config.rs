//! Configuration sections shared by the portal services
//!
//! Services embed these sections in their own figment-loaded config struct.

use serde::{Deserialize, Serialize};

/// Default API listen host
pub const DEFAULT_API_HOST: &str = "0.0.0.0";

/// Localhost address for local connections
pub const LOCALHOST_HOST: &str = "127.0.0.1";

/// Default SQLite database path
pub const DEFAULT_DB_PATH: &str = "data/portal.db";

/// Timeout constants shared by HTTP clients
pub mod timeouts {
    use std::time::Duration;

    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS);

    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

    pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;
    pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
}

/// Admin API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,

    #[serde(default = "default_api_host")]
    pub host: String,

    /// Listen port (0 means "use the service default")
    #[serde(default)]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_api_host(),
            port: 0,
        }
    }
}

/// SQLite configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory (empty means `PORTAL_LOG_DIR` or `logs`)
    #[serde(default)]
    pub dir: String,

    /// JSON lines in the log file
    #[serde(default)]
    pub json: bool,

    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: String::new(),
            json: false,
            max_files: default_max_files(),
        }
    }
}

pub fn bool_true() -> bool {
    true
}

fn default_api_host() -> String {
    DEFAULT_API_HOST.to_string()
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_files() -> usize {
    30
}

// ============================================================================
// Validation
// ============================================================================

/// Validation result collecting every problem instead of stopping at the first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        if !other.is_valid {
            self.is_valid = false;
        }
    }
}

/// Helper validation functions
pub mod helpers {
    /// Validate IP address format
    pub fn validate_ip(ip: &str) -> Result<(), String> {
        use std::net::IpAddr;
        ip.parse::<IpAddr>()
            .map(|_| ())
            .map_err(|_| format!("Invalid IP address: {}", ip))
    }

    /// Validate an absolute http(s) URL
    pub fn validate_http_url(url: &str) -> Result<(), String> {
        if url.starts_with("http://") || url.starts_with("https://") {
            Ok(())
        } else {
            Err(format!("URL must start with http:// or https://: {}", url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_result_merge() {
        let mut a = ValidationResult::new();
        a.add_warning("lorawan disabled");
        let mut b = ValidationResult::new();
        b.add_error("api.port: 0");

        a.merge(b);
        assert!(!a.is_valid);
        assert_eq!(a.errors.len(), 1);
        assert_eq!(a.warnings.len(), 1);
    }

    #[test]
    fn test_helpers() {
        assert!(helpers::validate_ip("0.0.0.0").is_ok());
        assert!(helpers::validate_ip("localhost").is_err());
        assert!(helpers::validate_http_url("https://lora.example.net").is_ok());
        assert!(helpers::validate_http_url("ftp://x").is_err());
    }

    #[test]
    fn test_section_defaults_from_empty_yaml() {
        let logging: LoggingConfig = serde_yaml::from_str("{}").unwrap_or_default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.max_files, 30);

        let api: ApiConfig = serde_yaml::from_str("port: 8080").unwrap_or_default();
        assert!(api.enabled);
        assert_eq!(api.port, 8080);
    }
}

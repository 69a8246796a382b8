//! Unified service bootstrap utilities
//!
//! Startup banner, logging initialization and environment helpers shared by
//! the portal services.

use crate::logging::{self, LogConfig};
use crate::service_config::LoggingConfig;
use tracing::info;

/// Service metadata for startup
pub struct ServiceInfo {
    /// Service name (e.g., "syncsrv")
    pub name: String,
    /// Service version from Cargo.toml
    pub version: String,
    pub description: String,
    pub default_port: u16,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>, default_port: u16) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: description.into(),
            default_port,
        }
    }
}

/// Print startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
 ██╗ ██████╗ ████████╗    ██████╗  ██████╗ ██████╗ ████████╗ █████╗ ██╗
 ██║██╔═══██╗╚══██╔══╝    ██╔══██╗██╔═══██╗██╔══██╗╚══██╔══╝██╔══██╗██║
 ██║██║   ██║   ██║       ██████╔╝██║   ██║██████╔╝   ██║   ███████║██║
 ██║██║   ██║   ██║       ██╔═══╝ ██║   ██║██╔══██╗   ██║   ██╔══██║██║
 ██║╚██████╔╝   ██║       ██║     ╚██████╔╝██║  ██║   ██║   ██║  ██║███████╗
 ╚═╝ ╚═════╝    ╚═╝       ╚═╝      ╚═════╝ ╚═╝  ╚═╝   ╚═╝   ╚═╝  ╚═╝╚══════╝
    "#;

    info!("{}", banner);
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!(" Default Port: {}", service.default_port);
}

/// Initialize logging for a service
///
/// Log root directory priority:
/// 1. `PORTAL_LOG_DIR` environment variable
/// 2. `logging_config.dir`
/// 3. Default "logs"
pub fn init_logging(
    service: &ServiceInfo,
    logging_config: Option<&LoggingConfig>,
) -> anyhow::Result<()> {
    let config_dir = logging_config.map(|c| c.dir.as_str());
    logging::init_log_root(config_dir);

    let level = logging_config
        .map(|c| logging::parse_level(&c.level))
        .unwrap_or(tracing::Level::INFO);

    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: logging::get_log_root().join(&service.name),
        level,
        enable_json: logging_config.map(|c| c.json).unwrap_or(false),
        max_log_files: logging_config.map(|c| c.max_files).unwrap_or(30),
    };

    logging::init_with_config(log_config).map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}

/// Load environment variables from `.env` in debug builds
///
/// Variables already present in the environment win. Release builds expect
/// the environment to be set externally.
pub fn load_development_env() {
    #[cfg(debug_assertions)]
    {
        if let Ok(content) = std::fs::read_to_string(".env") {
            for line in content.lines() {
                let trimmed = line.trim();
                if trimmed.starts_with('#') || trimmed.is_empty() {
                    continue;
                }

                if let Some((key, value)) = trimmed.split_once('=') {
                    let key = key.trim();
                    let value = value.trim();

                    if std::env::var(key).is_err() {
                        std::env::set_var(key, value);
                    }
                }
            }
        }
    }
}

/// Get service configuration file path
///
/// Priority: explicit path > `PORTAL_CONFIG` > `config/{service}.yaml`
pub fn get_config_path(service: &ServiceInfo, explicit: Option<&str>) -> String {
    if let Some(path) = explicit {
        return path.to_string();
    }

    if let Ok(path) = std::env::var("PORTAL_CONFIG") {
        if !path.is_empty() {
            return path;
        }
    }

    format!("config/{}.yaml", service.name)
}

/// Resolve the listen port: configured value, then `SERVICE_PORT`, then
/// `{SERVICE}_PORT`, then the service default
pub fn get_service_port(config_port: u16, service: &ServiceInfo) -> u16 {
    let is_default = config_port == 0 || config_port == service.default_port;

    if is_default {
        if let Ok(port) = std::env::var("SERVICE_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                return p;
            }
        }

        let env_var = format!("{}_PORT", service.name.to_uppercase());
        if let Ok(port) = std::env::var(&env_var) {
            if let Ok(p) = port.parse::<u16>() {
                return p;
            }
        }
    }

    if config_port > 0 {
        config_port
    } else {
        service.default_port
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_service_info_creation() {
        let service = ServiceInfo::new("syncsrv", "Registry sync", 6010);
        assert_eq!(service.name, "syncsrv");
        assert_eq!(service.description, "Registry sync");
        assert_eq!(service.default_port, 6010);
    }

    #[test]
    fn test_get_config_path_explicit_wins() {
        let service = ServiceInfo::new("syncsrv", "Test", 6010);
        assert_eq!(
            get_config_path(&service, Some("/etc/portal.yaml")),
            "/etc/portal.yaml"
        );
    }

    #[test]
    fn test_get_service_port_explicit() {
        let service = ServiceInfo::new("portaltest", "Test", 6010);
        assert_eq!(get_service_port(7000, &service), 7000);
    }
}

//! Service configuration
//!
//! Priority: defaults < YAML file < `PORTAL_` environment variables
//! (`PORTAL_REGISTRY__HOST_NAME=...`, nested keys split on `__`).

use crate::jobs::JobKind;
use common::service_config::helpers;
use common::{ApiConfig, DatabaseConfig, LoggingConfig, ValidationResult};
use errors::{PortalError, PortalResult};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use portal_registry::{LorawanConfig, RegistryConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Default admin API port
pub const DEFAULT_PORT: u16 = 6010;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "PORTAL_";

/// Largest page the registry accepts
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSection {
    #[serde(default = "default_service_name")]
    pub name: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: default_service_name(),
        }
    }
}

/// Schedule of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSchedule {
    #[serde(default = "common::service_config::bool_true")]
    pub enabled: bool,

    /// `cron` expression with a seconds field, e.g. `0 */10 * * * *`
    pub cron: String,
}

impl JobSchedule {
    fn every(cron: &str) -> Self {
        Self {
            enabled: true,
            cron: cron.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub service: ServiceSection,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub lorawan: LorawanConfig,

    /// Keyed by job name (`sync-devices`, `send-planning-command`, ...)
    #[serde(default = "default_jobs")]
    pub jobs: BTreeMap<String, JobSchedule>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            service: ServiceSection::default(),
            api: ApiConfig {
                port: DEFAULT_PORT,
                ..ApiConfig::default()
            },
            database: DatabaseConfig::default(),
            registry: RegistryConfig::default(),
            lorawan: LorawanConfig::default(),
            jobs: default_jobs(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PortalConfig {
    /// Load from an optional YAML file and the environment
    pub fn load(path: Option<&Path>) -> PortalResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(PortalConfig::default()));

        if let Some(path) = path {
            if path.exists() {
                info!("Loading config: {}", path.display());
                figment = figment.merge(Yaml::file(path));
            } else {
                warn!("Config {} not found, using defaults", path.display());
            }
        }

        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load from a YAML string (environment ignored)
    pub fn from_yaml_str(yaml: &str) -> PortalResult<Self> {
        Self::extract(Figment::from(Serialized::defaults(PortalConfig::default())).merge(Yaml::string(yaml)))
    }

    fn extract(figment: Figment) -> PortalResult<Self> {
        let config: PortalConfig = figment
            .extract()
            .map_err(|e| PortalError::Configuration(format!("Failed to load configuration: {}", e)))?;
        let registry = config.registry.clone().resolve()?;
        Ok(Self { registry, ..config })
    }

    /// Parsed schedules of the enabled jobs
    pub fn enabled_jobs(&self) -> PortalResult<Vec<(JobKind, cron::Schedule)>> {
        let mut jobs = Vec::new();
        for (name, schedule) in &self.jobs {
            if !schedule.enabled {
                continue;
            }
            let kind = JobKind::from_str(name)?;
            if kind == JobKind::SendPlanningCommand && !self.lorawan.enabled {
                continue;
            }
            let cron = cron::Schedule::from_str(&schedule.cron).map_err(|e| PortalError::InvalidConfig {
                field: format!("jobs.{}.cron", name),
                reason: e.to_string(),
            })?;
            jobs.push((kind, cron));
        }
        Ok(jobs)
    }

    /// Check every section, collecting all problems
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.api.enabled {
            if self.api.port == 0 {
                result.add_error("api.port: Port cannot be 0");
            }
            if let Err(e) = helpers::validate_ip(&self.api.host) {
                result.add_error(format!("api.host: {}", e));
            }
        }

        if self.database.path.trim().is_empty() {
            result.add_error("database.path: cannot be empty");
        }
        if self.database.max_connections == 0 {
            result.add_error("database.max_connections: must be at least 1");
        }

        if !self.registry.has_credentials() {
            result.add_error(
                "registry: host_name, shared_access_key_name and shared_access_key are required",
            );
        }
        if self.registry.page_size == 0 || self.registry.page_size > MAX_PAGE_SIZE {
            result.add_error(format!(
                "registry.page_size: must be between 1 and {}",
                MAX_PAGE_SIZE
            ));
        }

        if self.lorawan.enabled {
            if let Err(e) = helpers::validate_http_url(&self.lorawan.api_url) {
                result.add_error(format!("lorawan.api_url: {}", e));
            }
            if self.lorawan.api_key.is_empty() {
                result.add_warning("lorawan.api_key: empty, downlink requests are unauthenticated");
            }
        } else {
            result.add_warning("lorawan: disabled, planning commands will not run");
        }

        for (name, schedule) in &self.jobs {
            if let Err(e) = JobKind::from_str(name) {
                result.add_error(format!("jobs.{}: {}", name, e));
            }
            if let Err(e) = cron::Schedule::from_str(&schedule.cron) {
                result.add_error(format!("jobs.{}.cron: {}", name, e));
            }
        }

        result
    }
}

fn default_service_name() -> String {
    "syncsrv".to_string()
}

fn default_jobs() -> BTreeMap<String, JobSchedule> {
    JobKind::ALL
        .iter()
        .map(|kind| (kind.name().to_string(), JobSchedule::every(kind.default_cron())))
        .collect()
}

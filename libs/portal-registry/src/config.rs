//! Client configuration sections

use crate::paging::DEFAULT_PAGE_SIZE;
use errors::{PortalError, PortalResult};
use serde::{Deserialize, Serialize};

/// Default IoT Hub service API version
pub const DEFAULT_API_VERSION: &str = "2021-04-12";

/// Remote registry connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// `HostName=...;SharedAccessKeyName=...;SharedAccessKey=...`, overrides the fields below
    #[serde(default)]
    pub connection_string: Option<String>,

    #[serde(default)]
    pub host_name: String,

    #[serde(default = "default_key_name")]
    pub shared_access_key_name: String,

    /// Base64 encoded policy key
    #[serde(default)]
    pub shared_access_key: String,

    /// Base URL override, defaults to `https://{host_name}`
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Lifetime of generated SAS tokens
    #[serde(default = "default_sas_ttl_secs")]
    pub sas_ttl_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            host_name: String::new(),
            shared_access_key_name: default_key_name(),
            shared_access_key: String::new(),
            endpoint: None,
            api_version: default_api_version(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
            sas_ttl_secs: default_sas_ttl_secs(),
        }
    }
}

impl RegistryConfig {
    /// Copy the credentials of a connection string into the config
    pub fn resolve(mut self) -> PortalResult<Self> {
        let Some(connection_string) = self.connection_string.take() else {
            return Ok(self);
        };

        for part in connection_string.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| PortalError::InvalidConfig {
                field: "registry.connection_string".to_string(),
                reason: format!("malformed segment '{}'", part),
            })?;
            match key.trim() {
                "HostName" => self.host_name = value.trim().to_string(),
                "SharedAccessKeyName" => self.shared_access_key_name = value.trim().to_string(),
                // Keys end with '=' padding, keep everything after the first '='
                "SharedAccessKey" => self.shared_access_key = value.trim().to_string(),
                _ => {},
            }
        }
        Ok(self)
    }

    pub fn base_url(&self) -> String {
        match self.endpoint.as_deref().filter(|e| !e.is_empty()) {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}", self.host_name),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.host_name.is_empty()
            && !self.shared_access_key_name.is_empty()
            && !self.shared_access_key.is_empty()
    }
}

/// LoRaWAN network server management API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LorawanConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the LoRaWAN management functions
    #[serde(default)]
    pub api_url: String,

    /// Sent in the `x-functions-key` header
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_key_name() -> String {
    "iothubowner".to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_sas_ttl_secs() -> u64 {
    3600
}

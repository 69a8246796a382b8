//! Locally mirrored entities
//!
//! Each synced entity is keyed by the remote device identifier and carries
//! the twin version it was last built from.

use crate::twin::{object_len, DeviceTwin, TAG_LORA_REGION};
use chrono::{DateTime, Utc};
use errors::{PortalError, PortalResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Entity mirrored from a twin, compared by version during reconciliation
pub trait Versioned {
    fn id(&self) -> &str;
    fn version(&self) -> i64;
}

/// Name/value pair owned by exactly one device or edge device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTagValue {
    pub id: String,
    pub name: String,
    pub value: String,
}

impl DeviceTagValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            value: value.into(),
        }
    }

    /// Fresh tag rows for every custom tag of the twin
    pub fn from_twin(twin: &DeviceTwin) -> Vec<Self> {
        twin.custom_tags()
            .into_iter()
            .map(|(name, value)| Self::new(name, value))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub supports_lora_features: bool,
}

impl DeviceModel {
    pub fn kind(&self) -> DeviceKind {
        if self.supports_lora_features {
            DeviceKind::Lorawan
        } else {
            DeviceKind::Standard
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDeviceModel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Storage routing for a device twin, resolved once from its model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Standard,
    Lorawan,
}

// ============================================================================
// Devices
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub device_model_id: String,
    pub is_connected: bool,
    pub is_enabled: bool,
    pub status_updated_time: Option<DateTime<Utc>>,
    pub version: i64,
    /// Assigned in the portal, never taken from the twin
    pub layer_id: Option<String>,
    pub tags: Vec<DeviceTagValue>,
}

impl Device {
    pub fn from_twin(twin: &DeviceTwin, device_model_id: &str) -> Self {
        Self {
            id: twin.device_id.clone(),
            name: twin.display_name(),
            device_model_id: device_model_id.to_string(),
            is_connected: twin.is_connected(),
            is_enabled: twin.is_enabled(),
            status_updated_time: twin.status_update_time,
            version: twin.version,
            layer_id: None,
            tags: DeviceTagValue::from_twin(twin),
        }
    }
}

impl Versioned for Device {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

/// LoRaWAN specific settings, read from the twin properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LorawanSettings {
    pub use_otaa: bool,
    pub app_eui: Option<String>,
    pub app_key: Option<String>,
    pub app_s_key: Option<String>,
    pub nwk_s_key: Option<String>,
    pub dev_addr: Option<String>,
    pub gateway_id: Option<String>,
    pub sensor_decoder: Option<String>,
    pub class_type: Option<String>,
    pub downlink: Option<bool>,
    pub keep_alive_timeout: Option<i64>,
    /// The device joined the network at least once
    pub already_logged_in_once: bool,
}

impl LorawanSettings {
    pub fn from_twin(twin: &DeviceTwin) -> Self {
        let app_eui = twin.desired_string("AppEUI");
        Self {
            use_otaa: app_eui.as_deref().is_some_and(|v| !v.is_empty()),
            app_eui,
            app_key: twin.desired_string("AppKey"),
            app_s_key: twin.desired_string("AppSKey"),
            nwk_s_key: twin.desired_string("NwkSKey"),
            dev_addr: twin.desired_string("DevAddr"),
            gateway_id: twin.desired_string("GatewayID"),
            sensor_decoder: twin.desired_string("SensorDecoder"),
            class_type: twin.desired_string("ClassType"),
            downlink: twin.desired("Downlink").and_then(Value::as_bool),
            keep_alive_timeout: twin.desired("KeepAliveTimeout").and_then(Value::as_i64),
            already_logged_in_once: twin.reported("DevAddr").is_some_and(|v| !v.is_null()),
        }
    }
}

/// LoRaWAN specialization sharing the identifier of its base device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LorawanDevice {
    pub device: Device,
    pub settings: LorawanSettings,
}

impl LorawanDevice {
    pub fn from_twin(twin: &DeviceTwin, device_model_id: &str) -> Self {
        Self {
            device: Device::from_twin(twin, device_model_id),
            settings: LorawanSettings::from_twin(twin),
        }
    }
}

impl Versioned for LorawanDevice {
    fn id(&self) -> &str {
        &self.device.id
    }

    fn version(&self) -> i64 {
        self.device.version
    }
}

// ============================================================================
// Edge devices
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDevice {
    pub id: String,
    pub name: String,
    pub device_model_id: String,
    pub version: i64,
    pub connection_state: String,
    pub is_enabled: bool,
    /// Downstream devices connected through the edge hub
    pub nb_devices: i64,
    /// Modules deployed by the edge agent
    pub nb_modules: i64,
    pub tags: Vec<DeviceTagValue>,
}

impl EdgeDevice {
    /// Build from the device twin and its `$edgeAgent` / `$edgeHub` module twins
    pub fn from_twins(
        twin: &DeviceTwin,
        agent_twin: &DeviceTwin,
        hub_twin: &DeviceTwin,
        device_model_id: &str,
    ) -> Self {
        Self {
            id: twin.device_id.clone(),
            name: twin.display_name(),
            device_model_id: device_model_id.to_string(),
            version: twin.version,
            connection_state: twin.connection_state.to_string(),
            is_enabled: twin.is_enabled(),
            nb_devices: object_len(hub_twin.reported("clients")),
            nb_modules: object_len(agent_twin.desired("modules")),
            tags: DeviceTagValue::from_twin(twin),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == "Connected"
    }
}

impl Versioned for EdgeDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

// ============================================================================
// Concentrators
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concentrator {
    pub id: String,
    pub name: String,
    pub lora_region: Option<String>,
    pub device_type: String,
    pub client_thumbprint: Option<String>,
    pub is_connected: bool,
    pub is_enabled: bool,
    pub version: i64,
}

impl Concentrator {
    pub fn from_twin(twin: &DeviceTwin) -> Self {
        Self {
            id: twin.device_id.clone(),
            name: twin.display_name(),
            lora_region: twin.tag(TAG_LORA_REGION),
            device_type: twin.device_type().unwrap_or_default(),
            client_thumbprint: client_thumbprint(twin),
            is_connected: twin.is_connected(),
            is_enabled: twin.is_enabled(),
            version: twin.version,
        }
    }
}

impl Versioned for Concentrator {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

/// Desired `clientThumbprint`, either a string or the first array element
fn client_thumbprint(twin: &DeviceTwin) -> Option<String> {
    match twin.desired("clientThumbprint")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Downlink command defined on a device model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceModelCommand {
    pub id: String,
    pub device_model_id: String,
    pub name: String,
    /// Payload as a hex string
    pub frame: String,
    pub port: i32,
    pub confirmed: bool,
}

impl DeviceModelCommand {
    /// Raw payload bytes decoded from the hex frame
    pub fn payload(&self) -> PortalResult<Vec<u8>> {
        hex::decode(self.frame.trim()).map_err(|e| {
            PortalError::Validation(format!("Command {} has an invalid frame: {}", self.id, e))
        })
    }
}

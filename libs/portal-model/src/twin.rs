//! Device twin as returned by the remote registry
//!
//! Field names follow the registry JSON (camelCase). Only the parts the sync
//! jobs read are modelled; everything else is ignored on deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tag carrying the device model identifier
pub const TAG_MODEL_ID: &str = "modelId";
/// Tag carrying the display name of the device
pub const TAG_DEVICE_NAME: &str = "deviceName";
/// Tag carrying the device type (`LoRa Concentrator` for concentrators)
pub const TAG_DEVICE_TYPE: &str = "deviceType";
/// Tag carrying the LoRa region of a concentrator
pub const TAG_LORA_REGION: &str = "loraRegion";

/// Device type tag value of LoRa concentrators
pub const CONCENTRATOR_DEVICE_TYPE: &str = "LoRa Concentrator";

/// Tags managed by the portal itself, never exposed as custom tags
const RESERVED_TAGS: [&str; 3] = [TAG_MODEL_ID, TAG_DEVICE_NAME, TAG_DEVICE_TYPE];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TwinStatus {
    #[default]
    #[serde(rename = "enabled", alias = "Enabled")]
    Enabled,
    #[serde(rename = "disabled", alias = "Disabled")]
    Disabled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[serde(rename = "Connected", alias = "connected")]
    Connected,
    #[default]
    #[serde(rename = "Disconnected", alias = "disconnected")]
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwinCapabilities {
    #[serde(default)]
    pub iot_edge: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwinProperties {
    #[serde(default)]
    pub desired: Map<String, Value>,
    #[serde(default)]
    pub reported: Map<String, Value>,
}

/// Remote representation of a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTwin {
    pub device_id: String,

    /// Module twins carry the module identifier (`$edgeAgent`, `$edgeHub`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,

    #[serde(default)]
    pub etag: Option<String>,

    /// Monotonic twin version
    #[serde(default)]
    pub version: i64,

    #[serde(default)]
    pub status: TwinStatus,

    #[serde(default, alias = "statusUpdatedTime")]
    pub status_update_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub connection_state: ConnectionState,

    #[serde(default)]
    pub capabilities: TwinCapabilities,

    #[serde(default)]
    pub tags: Map<String, Value>,

    #[serde(default)]
    pub properties: TwinProperties,
}

impl DeviceTwin {
    pub fn new(device_id: impl Into<String>, version: i64) -> Self {
        Self {
            device_id: device_id.into(),
            version,
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.tags.insert(name.to_string(), value.into());
        self
    }

    pub fn with_desired(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.desired.insert(name.to_string(), value.into());
        self
    }

    pub fn with_reported(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.reported.insert(name.to_string(), value.into());
        self
    }

    pub fn with_connection(mut self, state: ConnectionState) -> Self {
        self.connection_state = state;
        self
    }

    pub fn with_status(mut self, status: TwinStatus) -> Self {
        self.status = status;
        self
    }

    pub fn as_edge(mut self) -> Self {
        self.capabilities.iot_edge = true;
        self
    }

    /// Tag value as a string; non-string scalars are stringified
    pub fn tag(&self, name: &str) -> Option<String> {
        self.tags.get(name).and_then(scalar_to_string)
    }

    pub fn model_id(&self) -> Option<String> {
        self.tag(TAG_MODEL_ID)
    }

    /// Display name, falling back to the device identifier
    pub fn display_name(&self) -> String {
        self.tag(TAG_DEVICE_NAME)
            .unwrap_or_else(|| self.device_id.clone())
    }

    pub fn device_type(&self) -> Option<String> {
        self.tag(TAG_DEVICE_TYPE)
    }

    pub fn is_concentrator(&self) -> bool {
        self.device_type().as_deref() == Some(CONCENTRATOR_DEVICE_TYPE)
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    pub fn is_enabled(&self) -> bool {
        self.status == TwinStatus::Enabled
    }

    /// User defined tags, excluding the ones the portal manages
    pub fn custom_tags(&self) -> Vec<(String, String)> {
        self.tags
            .iter()
            .filter(|(name, _)| !RESERVED_TAGS.contains(&name.as_str()))
            .filter_map(|(name, value)| scalar_to_string(value).map(|v| (name.clone(), v)))
            .collect()
    }

    pub fn desired(&self, name: &str) -> Option<&Value> {
        self.properties.desired.get(name)
    }

    pub fn reported(&self, name: &str) -> Option<&Value> {
        self.properties.reported.get(name)
    }

    pub fn desired_string(&self, name: &str) -> Option<String> {
        self.desired(name).and_then(scalar_to_string)
    }

    pub fn reported_string(&self, name: &str) -> Option<String> {
        self.reported(name).and_then(scalar_to_string)
    }
}

/// One page of a registry query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwinPage {
    pub items: Vec<DeviceTwin>,
    /// Total matching items when the registry reports it
    pub total_items: Option<i64>,
    /// Absent on the last page
    pub continuation_token: Option<String>,
}

impl TwinPage {
    pub fn last(items: Vec<DeviceTwin>) -> Self {
        Self {
            total_items: Some(items.len() as i64),
            items,
            continuation_token: None,
        }
    }

    pub fn is_last(&self) -> bool {
        self.continuation_token
            .as_deref()
            .is_none_or(|token| token.is_empty())
    }
}

/// Stringify a JSON scalar; null, arrays and objects yield `None`
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Number of entries in an object-valued property (0 when absent)
pub fn object_len(value: Option<&Value>) -> i64 {
    value
        .and_then(Value::as_object)
        .map(|obj| obj.keys().filter(|k| !k.starts_with('$')).count() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_registry_twin() {
        let raw = json!({
            "deviceId": "dev-1",
            "etag": "AAAAAAAAAAE=",
            "version": 4,
            "status": "enabled",
            "statusUpdateTime": "2024-03-01T10:00:00Z",
            "connectionState": "Connected",
            "capabilities": { "iotEdge": false },
            "tags": { "modelId": "model-a", "deviceName": "Pump", "floor": 3 },
            "properties": {
                "desired": { "AppEUI": "0011", "$version": 2 },
                "reported": { "DevAddr": "26011" }
            },
            "cloudToDeviceMessageCount": 0
        });

        let twin: DeviceTwin = serde_json::from_value(raw).unwrap();
        assert_eq!(twin.device_id, "dev-1");
        assert_eq!(twin.version, 4);
        assert!(twin.is_connected());
        assert!(twin.is_enabled());
        assert_eq!(twin.model_id().as_deref(), Some("model-a"));
        assert_eq!(twin.display_name(), "Pump");
        assert_eq!(twin.desired_string("AppEUI").as_deref(), Some("0011"));
        assert_eq!(twin.reported_string("DevAddr").as_deref(), Some("26011"));
        assert!(twin.status_update_time.is_some());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let twin: DeviceTwin = serde_json::from_value(json!({ "deviceId": "x" })).unwrap();
        assert_eq!(twin.version, 0);
        assert!(!twin.is_connected());
        assert!(!twin.capabilities.iot_edge);
        assert!(twin.model_id().is_none());
        assert_eq!(twin.display_name(), "x");
    }

    #[test]
    fn test_custom_tags_exclude_reserved() {
        let twin = DeviceTwin::new("dev-1", 1)
            .with_tag(TAG_MODEL_ID, "m")
            .with_tag(TAG_DEVICE_NAME, "n")
            .with_tag(TAG_DEVICE_TYPE, "t")
            .with_tag("site", "lyon")
            .with_tag("floor", 2)
            .with_tag("empty", Value::Null);

        let mut tags = twin.custom_tags();
        tags.sort();
        assert_eq!(
            tags,
            vec![
                ("floor".to_string(), "2".to_string()),
                ("site".to_string(), "lyon".to_string())
            ]
        );
    }

    #[test]
    fn test_concentrator_detection() {
        let twin = DeviceTwin::new("gw-1", 1).with_tag(TAG_DEVICE_TYPE, CONCENTRATOR_DEVICE_TYPE);
        assert!(twin.is_concentrator());
        assert!(!DeviceTwin::new("dev-1", 1).is_concentrator());
    }

    #[test]
    fn test_object_len_ignores_metadata() {
        let modules = json!({ "sensor": {}, "filter": {}, "$metadata": {} });
        assert_eq!(object_len(Some(&modules)), 2);
        assert_eq!(object_len(None), 0);
        assert_eq!(object_len(Some(&json!("x"))), 0);
    }

    #[test]
    fn test_page_is_last() {
        assert!(TwinPage::last(vec![]).is_last());
        let page = TwinPage {
            items: vec![],
            total_items: None,
            continuation_token: Some(String::new()),
        };
        assert!(page.is_last());
    }
}

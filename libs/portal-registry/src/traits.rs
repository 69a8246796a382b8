//! Trait definitions for the remote registry abstraction

use async_trait::async_trait;
use errors::PortalResult;
use portal_model::{DeviceModelCommand, DeviceTwin, TwinPage};
use std::fmt;

/// Restriction on the `deviceType` tag of listed device twins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwinFilter {
    All,
    /// Only twins whose `deviceType` tag equals the value
    DeviceType(String),
    /// Twins whose `deviceType` tag is absent or differs from the value
    ExcludeDeviceType(String),
}

impl TwinFilter {
    pub fn matches(&self, twin: &DeviceTwin) -> bool {
        let device_type = twin.device_type();
        match self {
            TwinFilter::All => true,
            TwinFilter::DeviceType(t) => device_type.as_deref() == Some(t.as_str()),
            TwinFilter::ExcludeDeviceType(t) => device_type.as_deref() != Some(t.as_str()),
        }
    }
}

/// Device population counted by the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCountQuery {
    pub edge: bool,
    pub connected_only: bool,
}

impl fmt::Display for DeviceCountQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            if self.connected_only { "connected " } else { "" },
            if self.edge { "edge devices" } else { "devices" }
        )
    }
}

/// Remote device registry
///
/// Implementations:
/// - `HttpRegistry`: IoT Hub REST API
/// - `MemoryRegistry`: in-memory backend for testing
#[async_trait]
pub trait DeviceRegistry: Send + Sync + 'static {
    /// One page of non-edge device twins
    async fn list_device_twins(
        &self,
        filter: &TwinFilter,
        continuation: Option<&str>,
        page_size: usize,
    ) -> PortalResult<TwinPage>;

    /// One page of edge device twins
    async fn list_edge_device_twins(
        &self,
        continuation: Option<&str>,
        page_size: usize,
    ) -> PortalResult<TwinPage>;

    /// `$edgeAgent` module twin, desired properties list the deployed modules
    async fn get_twin_with_modules(&self, device_id: &str) -> PortalResult<DeviceTwin>;

    /// `$edgeHub` module twin, reported properties list the connected clients
    async fn get_twin_with_edge_hub(&self, device_id: &str) -> PortalResult<DeviceTwin>;

    /// Distinct IDs of devices running the LoRaWAN network server module
    async fn list_gateway_ids(&self) -> PortalResult<Vec<String>>;

    /// Sum of failed module deployments over all configurations
    async fn failed_deployments_count(&self) -> PortalResult<i64>;

    async fn count_devices(&self, query: DeviceCountQuery) -> PortalResult<i64>;
}

/// Sends downlink commands to devices
#[async_trait]
pub trait CommandDispatcher: Send + Sync + 'static {
    async fn send_command(&self, device_id: &str, command: &DeviceModelCommand) -> PortalResult<()>;
}

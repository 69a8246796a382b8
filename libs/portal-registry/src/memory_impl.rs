//! In-memory registry implementation
//!
//! Uses DashMap for concurrent access. Intended for tests and local runs:
//! twins are served in device ID order, split into pages by the requested
//! page size, and any operation can be made to fail.

use crate::traits::{CommandDispatcher, DeviceCountQuery, DeviceRegistry, TwinFilter};
use async_trait::async_trait;
use dashmap::DashMap;
use errors::{PortalError, PortalResult};
use parking_lot::RwLock;
use portal_model::{DeviceModelCommand, DeviceTwin, TwinPage};
use std::sync::atomic::{AtomicI64, Ordering};

/// Command recorded by [`MemoryRegistry::send_command`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedCommand {
    pub device_id: String,
    pub command_id: String,
}

/// In-memory registry with failure injection
pub struct MemoryRegistry {
    twins: DashMap<String, DeviceTwin>,
    agent_twins: DashMap<String, DeviceTwin>,
    hub_twins: DashMap<String, DeviceTwin>,
    gateway_ids: RwLock<Vec<String>>,
    failed_deployments: AtomicI64,
    /// Operation name -> error message
    failures: DashMap<String, String>,
    /// Listing pages (0-based) that fail
    failing_pages: DashMap<usize, String>,
    /// Device IDs whose module twin lookups or commands fail
    failing_devices: DashMap<String, String>,
    calls: DashMap<String, usize>,
    dispatched: RwLock<Vec<DispatchedCommand>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            twins: DashMap::new(),
            agent_twins: DashMap::new(),
            hub_twins: DashMap::new(),
            gateway_ids: RwLock::new(Vec::new()),
            failed_deployments: AtomicI64::new(0),
            failures: DashMap::new(),
            failing_pages: DashMap::new(),
            failing_devices: DashMap::new(),
            calls: DashMap::new(),
            dispatched: RwLock::new(Vec::new()),
        }
    }

    /// Insert or replace a device twin
    pub fn put_twin(&self, twin: DeviceTwin) {
        self.twins.insert(twin.device_id.clone(), twin);
    }

    pub fn remove_twin(&self, device_id: &str) {
        self.twins.remove(device_id);
    }

    /// Set the `$edgeAgent` and `$edgeHub` module twins of an edge device
    pub fn put_module_twins(&self, device_id: &str, agent: DeviceTwin, hub: DeviceTwin) {
        self.agent_twins.insert(device_id.to_string(), agent);
        self.hub_twins.insert(device_id.to_string(), hub);
    }

    pub fn set_gateway_ids(&self, ids: Vec<String>) {
        *self.gateway_ids.write() = ids;
    }

    pub fn set_failed_deployments(&self, count: i64) {
        self.failed_deployments.store(count, Ordering::SeqCst);
    }

    /// Make every call of `operation` fail with an internal server error
    pub fn fail_operation(&self, operation: &str, message: &str) {
        self.failures.insert(operation.to_string(), message.to_string());
    }

    /// Make the listing page at `index` (0-based) fail
    pub fn fail_page(&self, index: usize, message: &str) {
        self.failing_pages.insert(index, message.to_string());
    }

    /// Make module twin lookups and commands for one device fail
    pub fn fail_device(&self, device_id: &str, message: &str) {
        self.failing_devices.insert(device_id.to_string(), message.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
        self.failing_pages.clear();
        self.failing_devices.clear();
    }

    /// Number of calls made to an operation
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.get(operation).map(|c| *c).unwrap_or(0)
    }

    pub fn dispatched(&self) -> Vec<DispatchedCommand> {
        self.dispatched.read().clone()
    }

    fn enter(&self, operation: &str) -> PortalResult<()> {
        *self.calls.entry(operation.to_string()).or_insert(0) += 1;
        match self.failures.get(operation) {
            Some(message) => Err(PortalError::InternalServerError(message.clone())),
            None => Ok(()),
        }
    }

    fn check_device(&self, device_id: &str) -> PortalResult<()> {
        match self.failing_devices.get(device_id) {
            Some(message) => Err(PortalError::InternalServerError(message.clone())),
            None => Ok(()),
        }
    }

    fn page<F>(&self, continuation: Option<&str>, page_size: usize, keep: F) -> PortalResult<TwinPage>
    where
        F: Fn(&DeviceTwin) -> bool,
    {
        let offset = match continuation.filter(|t| !t.is_empty()) {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| PortalError::registry("paging", format!("unknown token {}", token)))?,
            None => 0,
        };
        let page_size = page_size.max(1);
        if let Some(message) = self.failing_pages.get(&(offset / page_size)) {
            return Err(PortalError::InternalServerError(message.clone()));
        }

        let mut matching: Vec<DeviceTwin> = self
            .twins
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|a, b| a.device_id.cmp(&b.device_id));

        let total = matching.len();
        let items: Vec<DeviceTwin> = matching.into_iter().skip(offset).take(page_size).collect();
        let next = offset + items.len();

        Ok(TwinPage {
            items,
            total_items: Some(total as i64),
            continuation_token: (next < total).then(|| next.to_string()),
        })
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceRegistry for MemoryRegistry {
    async fn list_device_twins(
        &self,
        filter: &TwinFilter,
        continuation: Option<&str>,
        page_size: usize,
    ) -> PortalResult<TwinPage> {
        self.enter("list_device_twins")?;
        self.page(continuation, page_size, |twin| {
            !twin.capabilities.iot_edge && filter.matches(twin)
        })
    }

    async fn list_edge_device_twins(
        &self,
        continuation: Option<&str>,
        page_size: usize,
    ) -> PortalResult<TwinPage> {
        self.enter("list_edge_device_twins")?;
        self.page(continuation, page_size, |twin| twin.capabilities.iot_edge)
    }

    async fn get_twin_with_modules(&self, device_id: &str) -> PortalResult<DeviceTwin> {
        self.enter("get_twin_with_modules")?;
        self.check_device(device_id)?;
        self.agent_twins
            .get(device_id)
            .map(|t| t.clone())
            .ok_or_else(|| PortalError::not_found(format!("$edgeAgent twin of {}", device_id)))
    }

    async fn get_twin_with_edge_hub(&self, device_id: &str) -> PortalResult<DeviceTwin> {
        self.enter("get_twin_with_edge_hub")?;
        self.check_device(device_id)?;
        self.hub_twins
            .get(device_id)
            .map(|t| t.clone())
            .ok_or_else(|| PortalError::not_found(format!("$edgeHub twin of {}", device_id)))
    }

    async fn list_gateway_ids(&self) -> PortalResult<Vec<String>> {
        self.enter("list_gateway_ids")?;
        Ok(self.gateway_ids.read().clone())
    }

    async fn failed_deployments_count(&self) -> PortalResult<i64> {
        self.enter("failed_deployments_count")?;
        Ok(self.failed_deployments.load(Ordering::SeqCst))
    }

    async fn count_devices(&self, query: DeviceCountQuery) -> PortalResult<i64> {
        self.enter("count_devices")?;
        Ok(self
            .twins
            .iter()
            .filter(|t| t.capabilities.iot_edge == query.edge)
            .filter(|t| !query.connected_only || t.is_connected())
            .count() as i64)
    }
}

#[async_trait]
impl CommandDispatcher for MemoryRegistry {
    async fn send_command(&self, device_id: &str, command: &DeviceModelCommand) -> PortalResult<()> {
        self.enter("send_command")?;
        self.check_device(device_id)?;
        self.dispatched.write().push(DispatchedCommand {
            device_id: device_id.to_string(),
            command_id: command.id.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::paging::collect_all_pages;
    use portal_model::twin::{CONCENTRATOR_DEVICE_TYPE, TAG_DEVICE_TYPE};

    fn registry_with(ids: &[&str]) -> MemoryRegistry {
        let registry = MemoryRegistry::new();
        for id in ids {
            registry.put_twin(DeviceTwin::new(*id, 1));
        }
        registry
    }

    #[tokio::test]
    async fn test_paging_in_id_order() {
        let registry = registry_with(&["c", "a", "e", "b", "d"]);

        let first = registry.list_device_twins(&TwinFilter::All, None, 2).await.unwrap();
        assert_eq!(first.total_items, Some(5));
        assert_eq!(first.continuation_token.as_deref(), Some("2"));

        let all = collect_all_pages(2, |token, size| {
            let registry = &registry;
            async move {
                registry
                    .list_device_twins(&TwinFilter::All, token.as_deref(), size)
                    .await
            }
        })
        .await
        .unwrap();
        let ids: Vec<_> = all.iter().map(|t| t.device_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(registry.call_count("list_device_twins"), 4);
    }

    #[tokio::test]
    async fn test_filters_edge_and_device_type() {
        let registry = registry_with(&["dev-1"]);
        registry.put_twin(DeviceTwin::new("edge-1", 1).as_edge());
        registry.put_twin(DeviceTwin::new("gw-1", 1).with_tag(TAG_DEVICE_TYPE, CONCENTRATOR_DEVICE_TYPE));

        let devices = registry
            .list_device_twins(
                &TwinFilter::ExcludeDeviceType(CONCENTRATOR_DEVICE_TYPE.into()),
                None,
                100,
            )
            .await
            .unwrap();
        assert_eq!(devices.items.len(), 1);
        assert_eq!(devices.items[0].device_id, "dev-1");

        let concentrators = registry
            .list_device_twins(&TwinFilter::DeviceType(CONCENTRATOR_DEVICE_TYPE.into()), None, 100)
            .await
            .unwrap();
        assert_eq!(concentrators.items[0].device_id, "gw-1");

        let edges = registry.list_edge_device_twins(None, 100).await.unwrap();
        assert_eq!(edges.items[0].device_id, "edge-1");
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let registry = registry_with(&["a", "b", "c"]);
        registry.fail_page(1, "page two lost");

        assert!(registry.list_device_twins(&TwinFilter::All, None, 2).await.is_ok());
        let err = registry
            .list_device_twins(&TwinFilter::All, Some("2"), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::InternalServerError(_)));

        registry.fail_operation("list_gateway_ids", "down");
        assert!(registry.list_gateway_ids().await.is_err());
        registry.clear_failures();
        assert!(registry.list_gateway_ids().await.is_ok());
    }

    #[tokio::test]
    async fn test_records_commands() {
        let registry = MemoryRegistry::new();
        registry.fail_device("broken", "unreachable");
        let command = DeviceModelCommand {
            id: "c1".into(),
            device_model_id: "m".into(),
            name: "on".into(),
            frame: "01".into(),
            port: 1,
            confirmed: false,
        };

        registry.send_command("ok", &command).await.unwrap();
        assert!(registry.send_command("broken", &command).await.is_err());
        assert_eq!(
            registry.dispatched(),
            vec![DispatchedCommand {
                device_id: "ok".into(),
                command_id: "c1".into()
            }]
        );
    }
}

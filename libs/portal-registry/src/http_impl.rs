//! IoT Hub REST implementation of the device registry

use crate::config::RegistryConfig;
use crate::paging::collect_all_pages;
use crate::sas::SasTokenProvider;
use crate::traits::{DeviceCountQuery, DeviceRegistry, TwinFilter};
use async_trait::async_trait;
use errors::{PortalError, PortalResult};
use portal_model::{DeviceTwin, TwinPage};
use reqwest::{header::HeaderMap, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};

const HEADER_MAX_ITEM_COUNT: &str = "x-ms-max-item-count";
const HEADER_CONTINUATION: &str = "x-ms-continuation";

/// Module deployed on every LoRaWAN gateway
pub const LORAWAN_NETWORK_MODULE: &str = "LoRaWanNetworkSrvModule";
pub const EDGE_AGENT_MODULE: &str = "$edgeAgent";
pub const EDGE_HUB_MODULE: &str = "$edgeHub";

/// Registry client over the IoT Hub service REST API
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
    page_size: usize,
    tokens: SasTokenProvider,
}

impl HttpRegistry {
    pub fn new(config: RegistryConfig) -> PortalResult<Self> {
        let config = config.resolve()?;
        if !config.has_credentials() {
            return Err(PortalError::MissingConfig(
                "registry host name and shared access key".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(common_connect_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            api_version: config.api_version.clone(),
            page_size: config.page_size,
            tokens: SasTokenProvider::new(
                config.host_name.clone(),
                config.shared_access_key_name.clone(),
                config.shared_access_key.clone(),
                config.sas_ttl_secs,
            ),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}?api-version={}", self.base_url, path, self.api_version)
    }

    /// Run a registry query, returning the rows of one page
    async fn query_page<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> PortalResult<(Vec<T>, Option<String>)> {
        let mut request = self
            .client
            .post(self.url("/devices/query"))
            .header("Authorization", self.tokens.token()?)
            .header(HEADER_MAX_ITEM_COUNT, page_size.to_string())
            .json(&json!({ "query": query }));

        if let Some(token) = continuation.filter(|t| !t.is_empty()) {
            request = request.header(HEADER_CONTINUATION, token);
        }

        debug!("Registry query ({}): {}", operation, query);
        let response = request.send().await.map_err(|e| map_transport_error(operation, e))?;
        let response = check_status(operation, response).await?;
        let next = continuation_header(response.headers());
        let rows = response.json::<Vec<T>>().await.map_err(|e| {
            PortalError::registry(operation, format!("invalid query response: {}", e))
        })?;
        Ok((rows, next))
    }

    async fn twin_page(
        &self,
        operation: &str,
        query: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> PortalResult<TwinPage> {
        let (items, continuation_token) = self
            .query_page::<DeviceTwin>(operation, query, continuation, page_size)
            .await?;
        Ok(TwinPage {
            items,
            total_items: None,
            continuation_token,
        })
    }

    async fn get_module_twin(&self, device_id: &str, module_id: &str) -> PortalResult<DeviceTwin> {
        let operation = "get_module_twin";
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| PortalError::Configuration(format!("Invalid registry endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| PortalError::Configuration("Registry endpoint cannot be a base".into()))?
            .pop_if_empty()
            .extend(["twins", device_id, "modules", module_id]);
        url.query_pairs_mut().append_pair("api-version", &self.api_version);

        let response = self
            .client
            .get(url)
            .header("Authorization", self.tokens.token()?)
            .send()
            .await
            .map_err(|e| map_transport_error(operation, e))?;
        let response = check_status(operation, response).await?;
        response
            .json::<DeviceTwin>()
            .await
            .map_err(|e| PortalError::invalid_twin(device_id, e.to_string()))
    }
}

#[async_trait]
impl DeviceRegistry for HttpRegistry {
    async fn list_device_twins(
        &self,
        filter: &TwinFilter,
        continuation: Option<&str>,
        page_size: usize,
    ) -> PortalResult<TwinPage> {
        self.twin_page("list_device_twins", &device_query(filter), continuation, page_size)
            .await
    }

    async fn list_edge_device_twins(
        &self,
        continuation: Option<&str>,
        page_size: usize,
    ) -> PortalResult<TwinPage> {
        self.twin_page(
            "list_edge_device_twins",
            "SELECT * FROM devices WHERE capabilities.iotEdge = true",
            continuation,
            page_size,
        )
        .await
    }

    async fn get_twin_with_modules(&self, device_id: &str) -> PortalResult<DeviceTwin> {
        self.get_module_twin(device_id, EDGE_AGENT_MODULE).await
    }

    async fn get_twin_with_edge_hub(&self, device_id: &str) -> PortalResult<DeviceTwin> {
        self.get_module_twin(device_id, EDGE_HUB_MODULE).await
    }

    async fn list_gateway_ids(&self) -> PortalResult<Vec<String>> {
        let query = format!(
            "SELECT deviceId FROM devices.modules WHERE devices.modules.moduleId = '{}'",
            LORAWAN_NETWORK_MODULE
        );

        // Rows only carry `deviceId`, which is all a twin needs to deserialize
        let twins = collect_all_pages(self.page_size, |token, size| {
            let query = query.clone();
            async move {
                self.twin_page("list_gateway_ids", &query, token.as_deref(), size)
                    .await
            }
        })
        .await?;

        let ids: BTreeSet<String> = twins.into_iter().map(|t| t.device_id).collect();
        Ok(ids.into_iter().collect())
    }

    async fn failed_deployments_count(&self) -> PortalResult<i64> {
        let operation = "failed_deployments_count";
        let response = self
            .client
            .get(format!("{}&top=100", self.url("/configurations")))
            .header("Authorization", self.tokens.token()?)
            .send()
            .await
            .map_err(|e| map_transport_error(operation, e))?;
        let response = check_status(operation, response).await?;
        let configurations: Vec<Value> = response
            .json()
            .await
            .map_err(|e| PortalError::registry(operation, e.to_string()))?;

        Ok(sum_failed_deployments(&configurations))
    }

    async fn count_devices(&self, query: DeviceCountQuery) -> PortalResult<i64> {
        let mut sql = format!(
            "SELECT COUNT() AS numberOfDevices FROM devices WHERE capabilities.iotEdge = {}",
            query.edge
        );
        if query.connected_only {
            sql.push_str(" AND connectionState = 'Connected'");
        }

        let (rows, _) = self.query_page::<Value>("count_devices", &sql, None, 1).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("numberOfDevices"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }
}

/// Registry query for non-edge devices
pub fn device_query(filter: &TwinFilter) -> String {
    let base = "SELECT * FROM devices WHERE capabilities.iotEdge = false";
    match filter {
        TwinFilter::All => base.to_string(),
        TwinFilter::DeviceType(t) => format!("{} AND tags.deviceType = '{}'", base, escape_literal(t)),
        TwinFilter::ExcludeDeviceType(t) => format!(
            "{} AND (NOT is_defined(tags.deviceType) OR tags.deviceType != '{}')",
            base,
            escape_literal(t)
        ),
    }
}

/// Sum `reportedFailedCount` over configurations that deploy modules
pub fn sum_failed_deployments(configurations: &[Value]) -> i64 {
    configurations
        .iter()
        .filter(|c| {
            c.pointer("/content/modulesContent")
                .and_then(Value::as_object)
                .is_some_and(|m| !m.is_empty())
        })
        .filter_map(|c| c.pointer("/systemMetrics/results/reportedFailedCount"))
        .filter_map(Value::as_i64)
        .sum()
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn continuation_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(HEADER_CONTINUATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn common_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn map_transport_error(operation: &str, err: reqwest::Error) -> PortalError {
    if err.is_timeout() {
        PortalError::Timeout(format!("registry {}", operation))
    } else {
        PortalError::registry(operation, err.to_string())
    }
}

/// Map non-success statuses onto the error taxonomy
async fn check_status(operation: &str, response: Response) -> PortalResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("Registry {} failed: {} {}", operation, status, body);
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PortalError::Authentication(format!("{}: {}", operation, status))
        },
        StatusCode::NOT_FOUND => PortalError::not_found(format!("{}: {}", operation, body)),
        s if s.is_server_error() => {
            PortalError::InternalServerError(format!("{}: {} {}", operation, s, body))
        },
        s => PortalError::registry(operation, format!("{} {}", s, body)),
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn registry(server: &MockServer) -> HttpRegistry {
        HttpRegistry::new(RegistryConfig {
            host_name: "portal-hub.azure-devices.net".into(),
            shared_access_key_name: "service".into(),
            shared_access_key: "c2VjcmV0LWtleS1mb3ItdGVzdHM=".into(),
            endpoint: Some(server.uri()),
            request_timeout_secs: 5,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_device_query_filters() {
        assert_eq!(
            device_query(&TwinFilter::DeviceType("LoRa Concentrator".into())),
            "SELECT * FROM devices WHERE capabilities.iotEdge = false AND tags.deviceType = 'LoRa Concentrator'"
        );
        assert!(device_query(&TwinFilter::ExcludeDeviceType("it's".into())).contains("'it''s'"));
    }

    #[test]
    fn test_sum_failed_deployments() {
        let configurations = vec![
            json!({
                "id": "edge-deploy",
                "content": { "modulesContent": { "$edgeAgent": {} } },
                "systemMetrics": { "results": { "reportedFailedCount": 2 } }
            }),
            json!({
                "id": "device-config",
                "content": { "deviceContent": { "properties.desired.x": 1 } },
                "systemMetrics": { "results": { "reportedFailedCount": 9 } }
            }),
            json!({
                "id": "other-deploy",
                "content": { "modulesContent": { "$edgeHub": {} } },
                "systemMetrics": { "results": { "reportedFailedCount": 3 } }
            }),
        ];
        assert_eq!(sum_failed_deployments(&configurations), 5);
    }

    #[test]
    fn test_missing_credentials() {
        let result = HttpRegistry::new(RegistryConfig::default());
        assert!(matches!(result, Err(PortalError::MissingConfig(_))));
    }

    #[tokio::test]
    async fn test_list_device_twins_pages() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/devices/query"))
            .and(header_exists("authorization"))
            .and(header(HEADER_MAX_ITEM_COUNT, "100"))
            .and(header(HEADER_CONTINUATION, "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "deviceId": "dev-3", "version": 1 }
            ])))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/devices/query"))
            .and(query_param("api-version", "2021-04-12"))
            .and(body_partial_json(json!({
                "query": "SELECT * FROM devices WHERE capabilities.iotEdge = false"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(HEADER_CONTINUATION, "page-2")
                    .set_body_json(json!([
                        { "deviceId": "dev-1", "version": 2, "tags": { "modelId": "m" } },
                        { "deviceId": "dev-2", "version": 5 }
                    ])),
            )
            .mount(&server)
            .await;

        let registry = registry(&server).await;
        let first = registry.list_device_twins(&TwinFilter::All, None, 100).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.continuation_token.as_deref(), Some("page-2"));
        assert_eq!(first.items[0].model_id().as_deref(), Some("m"));

        let second = registry
            .list_device_twins(&TwinFilter::All, Some("page-2"), 100)
            .await
            .unwrap();
        assert_eq!(second.items[0].device_id, "dev-3");
        assert!(second.is_last());
    }

    #[tokio::test]
    async fn test_server_error_maps_to_internal_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/devices/query"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = registry(&server)
            .await
            .list_edge_device_twins(None, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::InternalServerError(_)));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/twins/edge-1/modules/$edgeAgent"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = registry(&server)
            .await
            .get_twin_with_modules("edge-1")
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_module_twin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/twins/edge-1/modules/$edgeHub"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "deviceId": "edge-1",
                "moduleId": "$edgeHub",
                "properties": { "reported": { "clients": { "leaf": {} } } }
            })))
            .mount(&server)
            .await;

        let twin = registry(&server)
            .await
            .get_twin_with_edge_hub("edge-1")
            .await
            .unwrap();
        assert_eq!(twin.module_id.as_deref(), Some("$edgeHub"));
        assert!(twin.reported("clients").is_some());
    }

    #[tokio::test]
    async fn test_gateway_ids_are_distinct_and_sorted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/devices/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "deviceId": "gw-b" },
                { "deviceId": "gw-a" },
                { "deviceId": "gw-b" }
            ])))
            .mount(&server)
            .await;

        let ids = registry(&server).await.list_gateway_ids().await.unwrap();
        assert_eq!(ids, vec!["gw-a", "gw-b"]);
    }

    #[tokio::test]
    async fn test_count_devices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/devices/query"))
            .and(body_partial_json(json!({
                "query": "SELECT COUNT() AS numberOfDevices FROM devices WHERE capabilities.iotEdge = true AND connectionState = 'Connected'"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "numberOfDevices": 7 }])))
            .mount(&server)
            .await;

        let count = registry(&server)
            .await
            .count_devices(DeviceCountQuery {
                edge: true,
                connected_only: true,
            })
            .await
            .unwrap();
        assert_eq!(count, 7);
    }
}

//! LoRaWAN downlink commands through the network server management API

use crate::config::LorawanConfig;
use crate::traits::CommandDispatcher;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use errors::{PortalError, PortalResult};
use portal_model::DeviceModelCommand;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Body of a cloud-to-device message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudToDeviceMessage {
    /// Base64 encoded payload
    pub raw_payload: String,
    pub fport: i32,
    pub confirmed: bool,
}

impl CloudToDeviceMessage {
    pub fn from_command(command: &DeviceModelCommand) -> PortalResult<Self> {
        Ok(Self {
            raw_payload: general_purpose::STANDARD.encode(command.payload()?),
            fport: command.port,
            confirmed: command.confirmed,
        })
    }
}

pub struct LorawanCommandClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl LorawanCommandClient {
    pub fn new(config: &LorawanConfig) -> PortalResult<Self> {
        if config.api_url.trim().is_empty() {
            return Err(PortalError::MissingConfig("lorawan.api_url".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CommandDispatcher for LorawanCommandClient {
    async fn send_command(&self, device_id: &str, command: &DeviceModelCommand) -> PortalResult<()> {
        let message = CloudToDeviceMessage::from_command(command)?;
        let url = format!("{}/api/cloudtodevicemessage/{}", self.api_url, device_id);

        debug!("Downlink {} -> {} (port {})", command.name, device_id, command.port);
        let response = self
            .client
            .post(&url)
            .header("x-functions-key", &self.api_key)
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!("Downlink to {} rejected: {} {}", device_id, status, body);
        if status.is_server_error() {
            Err(PortalError::InternalServerError(format!(
                "send_command {}: {}",
                device_id, status
            )))
        } else {
            Err(PortalError::registry(
                "send_command",
                format!("{}: {} {}", device_id, status, body),
            ))
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn command() -> DeviceModelCommand {
        DeviceModelCommand {
            id: "cmd-on".into(),
            device_model_id: "valve".into(),
            name: "open".into(),
            frame: "0101".into(),
            port: 2,
            confirmed: true,
        }
    }

    fn client(url: String) -> LorawanCommandClient {
        LorawanCommandClient::new(&LorawanConfig {
            enabled: true,
            api_url: url,
            api_key: "function-key".into(),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_message_from_command() {
        let message = CloudToDeviceMessage::from_command(&command()).unwrap();
        assert_eq!(message.raw_payload, "AQE=");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({ "rawPayload": "AQE=", "fport": 2, "confirmed": true })
        );
    }

    #[test]
    fn test_missing_api_url() {
        let result = LorawanCommandClient::new(&LorawanConfig::default());
        assert!(matches!(result, Err(PortalError::MissingConfig(_))));
    }

    #[tokio::test]
    async fn test_send_command() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/cloudtodevicemessage/lora-1"))
            .and(header("x-functions-key", "function-key"))
            .and(body_json(json!({ "rawPayload": "AQE=", "fport": 2, "confirmed": true })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(server.uri()).send_command("lora-1", &command()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_command_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(server.uri())
            .send_command("lora-1", &command())
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::InternalServerError(_)));
    }
}

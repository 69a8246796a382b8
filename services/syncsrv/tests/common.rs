//! Shared test scaffolding
//!
//! In-memory SQLite with the real schema, an in-memory registry and a fixed
//! clock, plus builders for twins and seed rows.

#![allow(clippy::disallowed_methods)] // Integration test - unwrap is acceptable
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use common::sqlite::SqliteClient;
use portal_model::twin::{CONCENTRATOR_DEVICE_TYPE, TAG_DEVICE_NAME, TAG_DEVICE_TYPE, TAG_MODEL_ID};
use portal_model::{ConnectionState, DeviceModel, DeviceTwin, EdgeDeviceModel};
use portal_registry::MemoryRegistry;
use std::sync::Arc;
use syncsrv::clock::FixedClock;
use syncsrv::jobs::JobContext;
use syncsrv::metrics::PortalGauges;
use syncsrv::repository::models::{save_device_model, save_edge_device_model};
use syncsrv::schema::init_schema;
use syncsrv::state::{GatewayIdList, PortalMetrics};

pub const STANDARD_MODEL: &str = "thermometer";
pub const LORA_MODEL: &str = "lora-valve";
pub const EDGE_MODEL: &str = "edge-gateway";

/// Wednesday 2026-10-14, 10:30 local time
pub fn now() -> NaiveDateTime {
    today().and_hms_opt(10, 30, 0).unwrap()
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
}

pub struct TestEnv {
    pub client: SqliteClient,
    pub registry: Arc<MemoryRegistry>,
    pub ctx: JobContext,
}

impl TestEnv {
    /// Database with one standard, one LoRaWAN and one edge model
    pub async fn create() -> Self {
        let client = SqliteClient::in_memory().await.unwrap();
        init_schema(client.pool()).await.unwrap();

        let registry = Arc::new(MemoryRegistry::new());
        let ctx = JobContext {
            pool: client.pool().clone(),
            registry: registry.clone(),
            dispatcher: Some(registry.clone()),
            gateway_ids: Arc::new(GatewayIdList::new()),
            metrics: Arc::new(PortalMetrics::new()),
            gauges: Arc::new(PortalGauges::new().unwrap()),
            clock: Arc::new(FixedClock(now())),
            page_size: 2,
        };

        let env = Self {
            client,
            registry,
            ctx,
        };
        env.seed_models().await;
        env
    }

    async fn seed_models(&self) {
        let mut conn = self.client.pool().acquire().await.unwrap();
        save_device_model(
            &mut conn,
            &DeviceModel {
                id: STANDARD_MODEL.into(),
                name: "Thermometer".into(),
                description: None,
                supports_lora_features: false,
            },
        )
        .await
        .unwrap();
        save_device_model(
            &mut conn,
            &DeviceModel {
                id: LORA_MODEL.into(),
                name: "LoRa valve".into(),
                description: Some("Class A irrigation valve".into()),
                supports_lora_features: true,
            },
        )
        .await
        .unwrap();
        save_edge_device_model(
            &mut conn,
            &EdgeDeviceModel {
                id: EDGE_MODEL.into(),
                name: "Edge gateway".into(),
                description: None,
            },
        )
        .await
        .unwrap();
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        self.client.pool()
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(self.pool())
            .await
            .unwrap()
    }

    /// Tag values stored for a device as `(name, value)`, sorted by name
    pub async fn device_tags(&self, device_id: &str) -> Vec<(String, String)> {
        sqlx::query_as("SELECT name, value FROM device_tag_values WHERE device_id = ? ORDER BY name")
            .bind(device_id)
            .fetch_all(self.pool())
            .await
            .unwrap()
    }

    pub async fn device_version(&self, device_id: &str) -> Option<i64> {
        sqlx::query_scalar("SELECT version FROM devices WHERE id = ?")
            .bind(device_id)
            .fetch_optional(self.pool())
            .await
            .unwrap()
    }
}

/// Connected device twin with a model, a display name and one custom tag
pub fn device_twin(id: &str, version: i64, model: &str) -> DeviceTwin {
    DeviceTwin::new(id, version)
        .with_tag(TAG_MODEL_ID, model)
        .with_tag(TAG_DEVICE_NAME, format!("Device {}", id))
        .with_tag("site", "north")
        .with_connection(ConnectionState::Connected)
}

pub fn concentrator_twin(id: &str, version: i64) -> DeviceTwin {
    DeviceTwin::new(id, version)
        .with_tag(TAG_DEVICE_TYPE, CONCENTRATOR_DEVICE_TYPE)
        .with_tag(TAG_DEVICE_NAME, format!("Gateway {}", id))
        .with_tag("loraRegion", "EU863")
        .with_desired("clientThumbprint", "A1B2C3")
}

pub fn edge_twin(id: &str, version: i64) -> DeviceTwin {
    DeviceTwin::new(id, version)
        .as_edge()
        .with_tag(TAG_MODEL_ID, EDGE_MODEL)
        .with_tag(TAG_DEVICE_NAME, format!("Edge {}", id))
        .with_connection(ConnectionState::Connected)
}

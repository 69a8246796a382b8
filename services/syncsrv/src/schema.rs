//! Database schema for the mirrored registry
//!
//! Tables are created idempotently at startup. Tag rows and LoRaWAN settings
//! cascade with their owning device.

use errors::PortalResult;
use sqlx::SqlitePool;
use tracing::debug;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS device_models (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        supports_lora_features INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS edge_device_models (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS layers (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        father TEXT,
        planning TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS devices (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        device_model_id TEXT NOT NULL,
        is_connected INTEGER NOT NULL DEFAULT 0,
        is_enabled INTEGER NOT NULL DEFAULT 1,
        status_updated_time TEXT,
        version INTEGER NOT NULL,
        layer_id TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS lorawan_devices (
        id TEXT PRIMARY KEY REFERENCES devices(id) ON DELETE CASCADE,
        use_otaa INTEGER NOT NULL DEFAULT 0,
        app_eui TEXT,
        app_key TEXT,
        app_s_key TEXT,
        nwk_s_key TEXT,
        dev_addr TEXT,
        gateway_id TEXT,
        sensor_decoder TEXT,
        class_type TEXT,
        downlink INTEGER,
        keep_alive_timeout INTEGER,
        already_logged_in_once INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS device_tag_values (
        id TEXT PRIMARY KEY,
        device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        value TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_device_tag_values_device ON device_tag_values(device_id)",
    r#"
    CREATE TABLE IF NOT EXISTS edge_devices (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        device_model_id TEXT NOT NULL,
        version INTEGER NOT NULL,
        connection_state TEXT NOT NULL,
        is_enabled INTEGER NOT NULL DEFAULT 1,
        nb_devices INTEGER NOT NULL DEFAULT 0,
        nb_modules INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS edge_device_tag_values (
        id TEXT PRIMARY KEY,
        edge_device_id TEXT NOT NULL REFERENCES edge_devices(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        value TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_edge_device_tag_values_device ON edge_device_tag_values(edge_device_id)",
    r#"
    CREATE TABLE IF NOT EXISTS concentrators (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        lora_region TEXT,
        device_type TEXT NOT NULL,
        client_thumbprint TEXT,
        is_connected INTEGER NOT NULL DEFAULT 0,
        is_enabled INTEGER NOT NULL DEFAULT 1,
        version INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS plannings (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        day_off INTEGER NOT NULL DEFAULT 0,
        command_id TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS schedules (
        id TEXT PRIMARY KEY,
        planning_id TEXT NOT NULL REFERENCES plannings(id) ON DELETE CASCADE,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        command_id TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS device_model_commands (
        id TEXT PRIMARY KEY,
        device_model_id TEXT NOT NULL,
        name TEXT NOT NULL,
        frame TEXT NOT NULL,
        port INTEGER NOT NULL DEFAULT 1,
        confirmed INTEGER NOT NULL DEFAULT 0
    )
    "#,
];

/// Create every table and index that does not exist yet
pub async fn init_schema(pool: &SqlitePool) -> PortalResult<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    debug!("Schema ready ({} statements)", STATEMENTS.len());
    Ok(())
}

//! Devices and their LoRaWAN specialization
//!
//! Both repositories share the `devices` table. A LoRaWAN device is a
//! `devices` row plus a `lorawan_devices` row with the same identifier, so
//! switching the model of a device moves it between the two repositories
//! without losing its layer assignment.

use super::tags::{delete_tags, insert_tags, load_tags, TagTable};
use super::{CountFilter, VersionedRepository};
use async_trait::async_trait;
use errors::PortalResult;
use portal_model::{Device, LorawanDevice, LorawanSettings};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

const DEVICE_COLUMNS: &str =
    "d.id, d.name, d.device_model_id, d.is_connected, d.is_enabled, d.status_updated_time, d.version, d.layer_id";

const SETTINGS_COLUMNS: &str = "l.use_otaa, l.app_eui, l.app_key, l.app_s_key, l.nwk_s_key, l.dev_addr, \
     l.gateway_id, l.sensor_decoder, l.class_type, l.downlink, l.keep_alive_timeout, l.already_logged_in_once";

fn device_from_row(row: &SqliteRow) -> PortalResult<Device> {
    Ok(Device {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        device_model_id: row.try_get("device_model_id")?,
        is_connected: row.try_get("is_connected")?,
        is_enabled: row.try_get("is_enabled")?,
        status_updated_time: row.try_get("status_updated_time")?,
        version: row.try_get("version")?,
        layer_id: row.try_get("layer_id")?,
        tags: Vec::new(),
    })
}

fn settings_from_row(row: &SqliteRow) -> PortalResult<LorawanSettings> {
    Ok(LorawanSettings {
        use_otaa: row.try_get("use_otaa")?,
        app_eui: row.try_get("app_eui")?,
        app_key: row.try_get("app_key")?,
        app_s_key: row.try_get("app_s_key")?,
        nwk_s_key: row.try_get("nwk_s_key")?,
        dev_addr: row.try_get("dev_addr")?,
        gateway_id: row.try_get("gateway_id")?,
        sensor_decoder: row.try_get("sensor_decoder")?,
        class_type: row.try_get("class_type")?,
        downlink: row.try_get("downlink")?,
        keep_alive_timeout: row.try_get("keep_alive_timeout")?,
        already_logged_in_once: row.try_get("already_logged_in_once")?,
    })
}

/// Insert or refresh the base row; `layer_id` is only written on insert
async fn upsert_device_row(conn: &mut SqliteConnection, device: &Device) -> PortalResult<()> {
    sqlx::query(
        r#"
        INSERT INTO devices
            (id, name, device_model_id, is_connected, is_enabled, status_updated_time, version, layer_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            device_model_id = excluded.device_model_id,
            is_connected = excluded.is_connected,
            is_enabled = excluded.is_enabled,
            status_updated_time = excluded.status_updated_time,
            version = excluded.version
        "#,
    )
    .bind(&device.id)
    .bind(&device.name)
    .bind(&device.device_model_id)
    .bind(device.is_connected)
    .bind(device.is_enabled)
    .bind(device.status_updated_time)
    .bind(device.version)
    .bind(&device.layer_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_settings_row(
    conn: &mut SqliteConnection,
    id: &str,
    settings: &LorawanSettings,
) -> PortalResult<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO lorawan_devices
            (id, use_otaa, app_eui, app_key, app_s_key, nwk_s_key, dev_addr, gateway_id,
             sensor_decoder, class_type, downlink, keep_alive_timeout, already_logged_in_once)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(settings.use_otaa)
    .bind(&settings.app_eui)
    .bind(&settings.app_key)
    .bind(&settings.app_s_key)
    .bind(&settings.nwk_s_key)
    .bind(&settings.dev_addr)
    .bind(&settings.gateway_id)
    .bind(&settings.sensor_decoder)
    .bind(&settings.class_type)
    .bind(settings.downlink)
    .bind(settings.keep_alive_timeout)
    .bind(settings.already_logged_in_once)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn count_devices(
    conn: &mut SqliteConnection,
    from: &str,
    filter: CountFilter,
) -> PortalResult<i64> {
    let sql = match filter {
        CountFilter::All => format!("SELECT COUNT(*) FROM {}", from),
        CountFilter::Connected => format!("SELECT COUNT(*) FROM {} WHERE d.is_connected = 1", from),
    };
    Ok(sqlx::query_scalar(&sql).fetch_one(&mut *conn).await?)
}

// ============================================================================
// Standard devices
// ============================================================================

/// Devices without LoRaWAN settings
///
/// Lookups see every `devices` row so a device whose model lost its LoRaWAN
/// features is updated in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceRepository;

#[async_trait]
impl VersionedRepository for DeviceRepository {
    type Entity = Device;

    fn name(&self) -> &'static str {
        "devices"
    }

    async fn get_by_id(&self, conn: &mut SqliteConnection, id: &str) -> PortalResult<Option<Device>> {
        let sql = format!("SELECT {} FROM devices d WHERE d.id = ?", DEVICE_COLUMNS);
        let Some(row) = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await? else {
            return Ok(None);
        };
        let mut device = device_from_row(&row)?;
        device.tags = load_tags(conn, TagTable::Device, id).await?;
        Ok(Some(device))
    }

    async fn insert(&self, conn: &mut SqliteConnection, device: &Device) -> PortalResult<()> {
        upsert_device_row(conn, device).await?;
        insert_tags(conn, TagTable::Device, &device.id, &device.tags).await
    }

    async fn update(&self, conn: &mut SqliteConnection, device: &Device) -> PortalResult<()> {
        upsert_device_row(conn, device).await?;
        sqlx::query("DELETE FROM lorawan_devices WHERE id = ?")
            .bind(&device.id)
            .execute(&mut *conn)
            .await?;
        insert_tags(conn, TagTable::Device, &device.id, &device.tags).await
    }

    async fn delete(&self, conn: &mut SqliteConnection, id: &str) -> PortalResult<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_ids(&self, conn: &mut SqliteConnection) -> PortalResult<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT d.id FROM devices d LEFT JOIN lorawan_devices l ON l.id = d.id WHERE l.id IS NULL ORDER BY d.id",
        )
        .fetch_all(&mut *conn)
        .await?)
    }

    /// Counts every device, LoRaWAN ones included
    async fn count(&self, conn: &mut SqliteConnection, filter: CountFilter) -> PortalResult<i64> {
        count_devices(conn, "devices d", filter).await
    }

    async fn delete_owned(&self, conn: &mut SqliteConnection, id: &str) -> PortalResult<u64> {
        delete_tags(conn, TagTable::Device, id).await
    }
}

// ============================================================================
// LoRaWAN devices
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct LorawanDeviceRepository;

#[async_trait]
impl VersionedRepository for LorawanDeviceRepository {
    type Entity = LorawanDevice;

    fn name(&self) -> &'static str {
        "lorawan_devices"
    }

    /// Also finds standard rows (with default settings) so a device moving to
    /// a LoRaWAN model is still compared against its stored version
    async fn get_by_id(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> PortalResult<Option<LorawanDevice>> {
        let sql = format!(
            "SELECT {}, l.id AS lorawan_id, {} FROM devices d LEFT JOIN lorawan_devices l ON l.id = d.id WHERE d.id = ?",
            DEVICE_COLUMNS, SETTINGS_COLUMNS
        );
        let Some(row) = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await? else {
            return Ok(None);
        };
        let mut device = device_from_row(&row)?;
        let lorawan_id: Option<String> = row.try_get("lorawan_id")?;
        let settings = match lorawan_id {
            Some(_) => settings_from_row(&row)?,
            None => LorawanSettings::default(),
        };
        device.tags = load_tags(conn, TagTable::Device, id).await?;
        Ok(Some(LorawanDevice { device, settings }))
    }

    async fn insert(&self, conn: &mut SqliteConnection, entity: &LorawanDevice) -> PortalResult<()> {
        delete_tags(conn, TagTable::Device, &entity.device.id).await?;
        upsert_device_row(conn, &entity.device).await?;
        upsert_settings_row(conn, &entity.device.id, &entity.settings).await?;
        insert_tags(conn, TagTable::Device, &entity.device.id, &entity.device.tags).await
    }

    async fn update(&self, conn: &mut SqliteConnection, entity: &LorawanDevice) -> PortalResult<()> {
        upsert_device_row(conn, &entity.device).await?;
        upsert_settings_row(conn, &entity.device.id, &entity.settings).await?;
        insert_tags(conn, TagTable::Device, &entity.device.id, &entity.device.tags).await
    }

    async fn delete(&self, conn: &mut SqliteConnection, id: &str) -> PortalResult<bool> {
        let result = sqlx::query(
            "DELETE FROM devices WHERE id = ? AND EXISTS (SELECT 1 FROM lorawan_devices l WHERE l.id = devices.id)",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_ids(&self, conn: &mut SqliteConnection) -> PortalResult<Vec<String>> {
        Ok(sqlx::query_scalar("SELECT id FROM lorawan_devices ORDER BY id")
            .fetch_all(&mut *conn)
            .await?)
    }

    async fn count(&self, conn: &mut SqliteConnection, filter: CountFilter) -> PortalResult<i64> {
        count_devices(conn, "devices d JOIN lorawan_devices l ON l.id = d.id", filter).await
    }

    async fn delete_owned(&self, conn: &mut SqliteConnection, id: &str) -> PortalResult<u64> {
        delete_tags(conn, TagTable::Device, id).await
    }
}

/// Assign a device to a layer
pub async fn set_layer(
    conn: &mut SqliteConnection,
    device_id: &str,
    layer_id: Option<&str>,
) -> PortalResult<bool> {
    let result = sqlx::query("UPDATE devices SET layer_id = ? WHERE id = ?")
        .bind(layer_id)
        .bind(device_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

//! Device models, edge device models and model commands
//!
//! These tables are managed by the portal; sync jobs only read them.

use errors::PortalResult;
use portal_model::{DeviceModel, DeviceModelCommand, EdgeDeviceModel};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

fn device_model_from_row(row: &SqliteRow) -> PortalResult<DeviceModel> {
    Ok(DeviceModel {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        supports_lora_features: row.try_get("supports_lora_features")?,
    })
}

fn command_from_row(row: &SqliteRow) -> PortalResult<DeviceModelCommand> {
    Ok(DeviceModelCommand {
        id: row.try_get("id")?,
        device_model_id: row.try_get("device_model_id")?,
        name: row.try_get("name")?,
        frame: row.try_get("frame")?,
        port: row.try_get("port")?,
        confirmed: row.try_get("confirmed")?,
    })
}

pub async fn get_device_model(conn: &mut SqliteConnection, id: &str) -> PortalResult<Option<DeviceModel>> {
    sqlx::query("SELECT id, name, description, supports_lora_features FROM device_models WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| device_model_from_row(&row))
        .transpose()
}

pub async fn save_device_model(conn: &mut SqliteConnection, model: &DeviceModel) -> PortalResult<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO device_models (id, name, description, supports_lora_features) VALUES (?, ?, ?, ?)",
    )
    .bind(&model.id)
    .bind(&model.name)
    .bind(&model.description)
    .bind(model.supports_lora_features)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_edge_device_model(
    conn: &mut SqliteConnection,
    id: &str,
) -> PortalResult<Option<EdgeDeviceModel>> {
    let row = sqlx::query("SELECT id, name, description FROM edge_device_models WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(Some(EdgeDeviceModel {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
        })),
        None => Ok(None),
    }
}

pub async fn save_edge_device_model(conn: &mut SqliteConnection, model: &EdgeDeviceModel) -> PortalResult<()> {
    sqlx::query("INSERT OR REPLACE INTO edge_device_models (id, name, description) VALUES (?, ?, ?)")
        .bind(&model.id)
        .bind(&model.name)
        .bind(&model.description)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn list_commands(conn: &mut SqliteConnection) -> PortalResult<Vec<DeviceModelCommand>> {
    let rows = sqlx::query(
        "SELECT id, device_model_id, name, frame, port, confirmed FROM device_model_commands ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(command_from_row).collect()
}

pub async fn save_command(conn: &mut SqliteConnection, command: &DeviceModelCommand) -> PortalResult<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO device_model_commands (id, device_model_id, name, frame, port, confirmed)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&command.id)
    .bind(&command.device_model_id)
    .bind(&command.name)
    .bind(&command.frame)
    .bind(command.port)
    .bind(command.confirmed)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::schema::init_schema;
    use common::sqlite::SqliteClient;

    #[tokio::test]
    async fn test_models_and_commands() {
        let client = SqliteClient::in_memory().await.unwrap();
        init_schema(client.pool()).await.unwrap();
        let mut conn = client.pool().acquire().await.unwrap();

        let model = DeviceModel {
            id: "lora-model".into(),
            name: "Valve".into(),
            description: Some("Irrigation valve".into()),
            supports_lora_features: true,
        };
        save_device_model(&mut conn, &model).await.unwrap();
        assert_eq!(get_device_model(&mut conn, "lora-model").await.unwrap(), Some(model));
        assert!(get_device_model(&mut conn, "missing").await.unwrap().is_none());

        let edge = EdgeDeviceModel {
            id: "edge-model".into(),
            name: "Gateway box".into(),
            description: None,
        };
        save_edge_device_model(&mut conn, &edge).await.unwrap();
        assert_eq!(get_edge_device_model(&mut conn, "edge-model").await.unwrap(), Some(edge));

        let command = DeviceModelCommand {
            id: "open".into(),
            device_model_id: "lora-model".into(),
            name: "Open valve".into(),
            frame: "01".into(),
            port: 2,
            confirmed: true,
        };
        save_command(&mut conn, &command).await.unwrap();
        assert_eq!(list_commands(&mut conn).await.unwrap(), vec![command]);
    }
}

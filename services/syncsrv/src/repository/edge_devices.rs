//! Edge devices mirrored from IoT Edge twins

use super::tags::{delete_tags, insert_tags, load_tags, TagTable};
use super::{CountFilter, VersionedRepository};
use async_trait::async_trait;
use errors::PortalResult;
use portal_model::EdgeDevice;
use sqlx::{Row, SqliteConnection};

#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeDeviceRepository;

#[async_trait]
impl VersionedRepository for EdgeDeviceRepository {
    type Entity = EdgeDevice;

    fn name(&self) -> &'static str {
        "edge_devices"
    }

    async fn get_by_id(&self, conn: &mut SqliteConnection, id: &str) -> PortalResult<Option<EdgeDevice>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, device_model_id, version, connection_state, is_enabled, nb_devices, nb_modules
            FROM edge_devices WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(EdgeDevice {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            device_model_id: row.try_get("device_model_id")?,
            version: row.try_get("version")?,
            connection_state: row.try_get("connection_state")?,
            is_enabled: row.try_get("is_enabled")?,
            nb_devices: row.try_get("nb_devices")?,
            nb_modules: row.try_get("nb_modules")?,
            tags: load_tags(conn, TagTable::EdgeDevice, id).await?,
        }))
    }

    async fn insert(&self, conn: &mut SqliteConnection, edge: &EdgeDevice) -> PortalResult<()> {
        sqlx::query(
            r#"
            INSERT INTO edge_devices
                (id, name, device_model_id, version, connection_state, is_enabled, nb_devices, nb_modules)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&edge.id)
        .bind(&edge.name)
        .bind(&edge.device_model_id)
        .bind(edge.version)
        .bind(&edge.connection_state)
        .bind(edge.is_enabled)
        .bind(edge.nb_devices)
        .bind(edge.nb_modules)
        .execute(&mut *conn)
        .await?;

        insert_tags(conn, TagTable::EdgeDevice, &edge.id, &edge.tags).await
    }

    async fn update(&self, conn: &mut SqliteConnection, edge: &EdgeDevice) -> PortalResult<()> {
        sqlx::query(
            r#"
            UPDATE edge_devices SET
                name = ?, device_model_id = ?, version = ?, connection_state = ?,
                is_enabled = ?, nb_devices = ?, nb_modules = ?
            WHERE id = ?
            "#,
        )
        .bind(&edge.name)
        .bind(&edge.device_model_id)
        .bind(edge.version)
        .bind(&edge.connection_state)
        .bind(edge.is_enabled)
        .bind(edge.nb_devices)
        .bind(edge.nb_modules)
        .bind(&edge.id)
        .execute(&mut *conn)
        .await?;

        insert_tags(conn, TagTable::EdgeDevice, &edge.id, &edge.tags).await
    }

    async fn delete(&self, conn: &mut SqliteConnection, id: &str) -> PortalResult<bool> {
        let result = sqlx::query("DELETE FROM edge_devices WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_ids(&self, conn: &mut SqliteConnection) -> PortalResult<Vec<String>> {
        Ok(sqlx::query_scalar("SELECT id FROM edge_devices ORDER BY id")
            .fetch_all(&mut *conn)
            .await?)
    }

    async fn count(&self, conn: &mut SqliteConnection, filter: CountFilter) -> PortalResult<i64> {
        let sql = match filter {
            CountFilter::All => "SELECT COUNT(*) FROM edge_devices",
            CountFilter::Connected => "SELECT COUNT(*) FROM edge_devices WHERE connection_state = 'Connected'",
        };
        Ok(sqlx::query_scalar(sql).fetch_one(&mut *conn).await?)
    }

    async fn delete_owned(&self, conn: &mut SqliteConnection, id: &str) -> PortalResult<u64> {
        delete_tags(conn, TagTable::EdgeDevice, id).await
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::schema::init_schema;
    use common::sqlite::SqliteClient;
    use portal_model::DeviceTagValue;

    fn edge(id: &str, state: &str) -> EdgeDevice {
        EdgeDevice {
            id: id.to_string(),
            name: id.to_uppercase(),
            device_model_id: "edge-model".to_string(),
            version: 1,
            connection_state: state.to_string(),
            is_enabled: true,
            nb_devices: 3,
            nb_modules: 2,
            tags: vec![DeviceTagValue::new("site", "plant-a")],
        }
    }

    #[tokio::test]
    async fn test_edge_device_crud_and_counts() {
        let client = SqliteClient::in_memory().await.unwrap();
        init_schema(client.pool()).await.unwrap();
        let mut conn = client.pool().acquire().await.unwrap();
        let repo = EdgeDeviceRepository;

        repo.insert(&mut conn, &edge("edge-1", "Connected")).await.unwrap();
        repo.insert(&mut conn, &edge("edge-2", "Disconnected")).await.unwrap();

        let stored = repo.get_by_id(&mut conn, "edge-1").await.unwrap().unwrap();
        assert_eq!(stored.nb_devices, 3);
        assert_eq!(stored.nb_modules, 2);
        assert_eq!(stored.tags[0].name, "site");

        assert_eq!(repo.count(&mut conn, CountFilter::All).await.unwrap(), 2);
        assert_eq!(repo.count(&mut conn, CountFilter::Connected).await.unwrap(), 1);

        let mut changed = edge("edge-2", "Connected");
        changed.version = 4;
        changed.nb_modules = 5;
        changed.tags = vec![DeviceTagValue::new("site", "plant-b")];
        repo.delete_owned(&mut conn, "edge-2").await.unwrap();
        repo.update(&mut conn, &changed).await.unwrap();

        let stored = repo.get_by_id(&mut conn, "edge-2").await.unwrap().unwrap();
        assert_eq!(stored.version, 4);
        assert_eq!(stored.nb_modules, 5);
        assert_eq!(stored.tags.len(), 1);
        assert_eq!(stored.tags[0].value, "plant-b");
        assert_eq!(repo.count(&mut conn, CountFilter::Connected).await.unwrap(), 2);

        assert!(repo.delete(&mut conn, "edge-1").await.unwrap());
        assert_eq!(repo.list_ids(&mut conn).await.unwrap(), vec!["edge-2"]);
    }
}

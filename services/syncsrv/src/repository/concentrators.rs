//! LoRa concentrators (gateways)

use super::{CountFilter, VersionedRepository};
use async_trait::async_trait;
use errors::PortalResult;
use portal_model::Concentrator;
use sqlx::{Row, SqliteConnection};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConcentratorRepository;

#[async_trait]
impl VersionedRepository for ConcentratorRepository {
    type Entity = Concentrator;

    fn name(&self) -> &'static str {
        "concentrators"
    }

    async fn get_by_id(&self, conn: &mut SqliteConnection, id: &str) -> PortalResult<Option<Concentrator>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, lora_region, device_type, client_thumbprint, is_connected, is_enabled, version
            FROM concentrators WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(|row| -> PortalResult<Concentrator> {
            Ok(Concentrator {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                lora_region: row.try_get("lora_region")?,
                device_type: row.try_get("device_type")?,
                client_thumbprint: row.try_get("client_thumbprint")?,
                is_connected: row.try_get("is_connected")?,
                is_enabled: row.try_get("is_enabled")?,
                version: row.try_get("version")?,
            })
        })
        .transpose()
    }

    async fn insert(&self, conn: &mut SqliteConnection, concentrator: &Concentrator) -> PortalResult<()> {
        sqlx::query(
            r#"
            INSERT INTO concentrators
                (id, name, lora_region, device_type, client_thumbprint, is_connected, is_enabled, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&concentrator.id)
        .bind(&concentrator.name)
        .bind(&concentrator.lora_region)
        .bind(&concentrator.device_type)
        .bind(&concentrator.client_thumbprint)
        .bind(concentrator.is_connected)
        .bind(concentrator.is_enabled)
        .bind(concentrator.version)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn update(&self, conn: &mut SqliteConnection, concentrator: &Concentrator) -> PortalResult<()> {
        sqlx::query(
            r#"
            UPDATE concentrators SET
                name = ?, lora_region = ?, device_type = ?, client_thumbprint = ?,
                is_connected = ?, is_enabled = ?, version = ?
            WHERE id = ?
            "#,
        )
        .bind(&concentrator.name)
        .bind(&concentrator.lora_region)
        .bind(&concentrator.device_type)
        .bind(&concentrator.client_thumbprint)
        .bind(concentrator.is_connected)
        .bind(concentrator.is_enabled)
        .bind(concentrator.version)
        .bind(&concentrator.id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn delete(&self, conn: &mut SqliteConnection, id: &str) -> PortalResult<bool> {
        let result = sqlx::query("DELETE FROM concentrators WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_ids(&self, conn: &mut SqliteConnection) -> PortalResult<Vec<String>> {
        Ok(sqlx::query_scalar("SELECT id FROM concentrators ORDER BY id")
            .fetch_all(&mut *conn)
            .await?)
    }

    async fn count(&self, conn: &mut SqliteConnection, filter: CountFilter) -> PortalResult<i64> {
        let sql = match filter {
            CountFilter::All => "SELECT COUNT(*) FROM concentrators",
            CountFilter::Connected => "SELECT COUNT(*) FROM concentrators WHERE is_connected = 1",
        };
        Ok(sqlx::query_scalar(sql).fetch_one(&mut *conn).await?)
    }
}

//! Tag rows owned by devices and edge devices

use errors::PortalResult;
use portal_model::DeviceTagValue;
use sqlx::{Row, SqliteConnection};

/// Table holding the tags of one kind of owner
#[derive(Debug, Clone, Copy)]
pub(crate) enum TagTable {
    Device,
    EdgeDevice,
}

impl TagTable {
    fn table(self) -> &'static str {
        match self {
            TagTable::Device => "device_tag_values",
            TagTable::EdgeDevice => "edge_device_tag_values",
        }
    }

    fn owner_column(self) -> &'static str {
        match self {
            TagTable::Device => "device_id",
            TagTable::EdgeDevice => "edge_device_id",
        }
    }
}

pub(crate) async fn insert_tags(
    conn: &mut SqliteConnection,
    table: TagTable,
    owner_id: &str,
    tags: &[DeviceTagValue],
) -> PortalResult<()> {
    let sql = format!(
        "INSERT INTO {} (id, {}, name, value) VALUES (?, ?, ?, ?)",
        table.table(),
        table.owner_column()
    );
    for tag in tags {
        sqlx::query(&sql)
            .bind(&tag.id)
            .bind(owner_id)
            .bind(&tag.name)
            .bind(&tag.value)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub(crate) async fn load_tags(
    conn: &mut SqliteConnection,
    table: TagTable,
    owner_id: &str,
) -> PortalResult<Vec<DeviceTagValue>> {
    let sql = format!(
        "SELECT id, name, value FROM {} WHERE {} = ? ORDER BY name",
        table.table(),
        table.owner_column()
    );
    let rows = sqlx::query(&sql).bind(owner_id).fetch_all(&mut *conn).await?;

    let mut tags = Vec::with_capacity(rows.len());
    for row in rows {
        tags.push(DeviceTagValue {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            value: row.try_get("value")?,
        });
    }
    Ok(tags)
}

pub(crate) async fn delete_tags(
    conn: &mut SqliteConnection,
    table: TagTable,
    owner_id: &str,
) -> PortalResult<u64> {
    let sql = format!("DELETE FROM {} WHERE {} = ?", table.table(), table.owner_column());
    let result = sqlx::query(&sql).bind(owner_id).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

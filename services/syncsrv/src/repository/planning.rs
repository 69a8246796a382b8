//! Layers, plannings and schedules

use errors::{PortalError, PortalResult};
use portal_model::{DaysOff, Layer, Planning, Schedule, TimeOfDay};
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;

/// Device assigned to a layer, as needed to send it a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayeredDevice {
    pub id: String,
    pub device_model_id: String,
    pub layer_id: String,
}

pub async fn list_layers(conn: &mut SqliteConnection) -> PortalResult<HashMap<String, Layer>> {
    let rows = sqlx::query("SELECT id, name, father, planning FROM layers")
        .fetch_all(&mut *conn)
        .await?;

    let mut layers = HashMap::with_capacity(rows.len());
    for row in rows {
        let layer = Layer {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            father: row.try_get("father")?,
            planning: row.try_get("planning")?,
        };
        layers.insert(layer.id.clone(), layer);
    }
    Ok(layers)
}

pub async fn save_layer(conn: &mut SqliteConnection, layer: &Layer) -> PortalResult<()> {
    sqlx::query("INSERT OR REPLACE INTO layers (id, name, father, planning) VALUES (?, ?, ?, ?)")
        .bind(&layer.id)
        .bind(&layer.name)
        .bind(&layer.father)
        .bind(&layer.planning)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn list_plannings(conn: &mut SqliteConnection) -> PortalResult<HashMap<String, Planning>> {
    let rows = sqlx::query("SELECT id, name, start_date, end_date, day_off, command_id FROM plannings")
        .fetch_all(&mut *conn)
        .await?;

    let mut plannings = HashMap::with_capacity(rows.len());
    for row in rows {
        let day_off: i64 = row.try_get("day_off")?;
        let planning = Planning {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            start: row.try_get("start_date")?,
            end: row.try_get("end_date")?,
            day_off: DaysOff::from_bits_truncate(day_off as u8),
            command_id: row.try_get("command_id")?,
        };
        plannings.insert(planning.id.clone(), planning);
    }
    Ok(plannings)
}

/// Upsert in place; a delete-and-insert would cascade to the schedules
pub async fn save_planning(conn: &mut SqliteConnection, planning: &Planning) -> PortalResult<()> {
    sqlx::query(
        r#"
        INSERT INTO plannings (id, name, start_date, end_date, day_off, command_id)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name, start_date = excluded.start_date, end_date = excluded.end_date,
            day_off = excluded.day_off, command_id = excluded.command_id
        "#,
    )
    .bind(&planning.id)
    .bind(&planning.name)
    .bind(planning.start)
    .bind(planning.end)
    .bind(i64::from(planning.day_off.bits()))
    .bind(&planning.command_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Schedules grouped by planning
pub async fn list_schedules(conn: &mut SqliteConnection) -> PortalResult<HashMap<String, Vec<Schedule>>> {
    let rows = sqlx::query(
        "SELECT id, planning_id, start_time, end_time, command_id FROM schedules ORDER BY start_time",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut schedules: HashMap<String, Vec<Schedule>> = HashMap::new();
    for row in rows {
        let id: String = row.try_get("id")?;
        let start: String = row.try_get("start_time")?;
        let end: String = row.try_get("end_time")?;
        let schedule = Schedule {
            planning_id: row.try_get("planning_id")?,
            start: parse_time(&id, &start)?,
            end: parse_time(&id, &end)?,
            command_id: row.try_get("command_id")?,
            id,
        };
        schedules
            .entry(schedule.planning_id.clone())
            .or_default()
            .push(schedule);
    }
    Ok(schedules)
}

fn parse_time(schedule_id: &str, value: &str) -> PortalResult<TimeOfDay> {
    TimeOfDay::parse(value)
        .map_err(|e| PortalError::Database(format!("Schedule {} has a bad time: {}", schedule_id, e)))
}

pub async fn save_schedule(conn: &mut SqliteConnection, schedule: &Schedule) -> PortalResult<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO schedules (id, planning_id, start_time, end_time, command_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&schedule.id)
    .bind(&schedule.planning_id)
    .bind(schedule.start.to_string())
    .bind(schedule.end.to_string())
    .bind(&schedule.command_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Every device that belongs to a layer
pub async fn list_layered_devices(conn: &mut SqliteConnection) -> PortalResult<Vec<LayeredDevice>> {
    let rows = sqlx::query(
        "SELECT id, device_model_id, layer_id FROM devices WHERE layer_id IS NOT NULL AND layer_id != '' ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut devices = Vec::with_capacity(rows.len());
    for row in rows {
        devices.push(LayeredDevice {
            id: row.try_get("id")?,
            device_model_id: row.try_get("device_model_id")?,
            layer_id: row.try_get("layer_id")?,
        });
    }
    Ok(devices)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::schema::init_schema;
    use chrono::NaiveDate;
    use common::sqlite::SqliteClient;

    #[tokio::test]
    async fn test_planning_round_trip() {
        let client = SqliteClient::in_memory().await.unwrap();
        init_schema(client.pool()).await.unwrap();
        let mut conn = client.pool().acquire().await.unwrap();

        let planning = Planning {
            id: "p1".into(),
            name: "Summer".into(),
            start: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
            day_off: DaysOff::SATURDAY | DaysOff::SUNDAY,
            command_id: Some("close".into()),
        };
        save_planning(&mut conn, &planning).await.unwrap();

        let schedule = Schedule {
            id: "s1".into(),
            planning_id: "p1".into(),
            start: TimeOfDay::parse("06:00").unwrap(),
            end: TimeOfDay::parse("24:00").unwrap(),
            command_id: "open".into(),
        };
        save_schedule(&mut conn, &schedule).await.unwrap();

        let layer = Layer {
            id: "root".into(),
            name: "Site".into(),
            father: None,
            planning: Some("p1".into()),
        };
        save_layer(&mut conn, &layer).await.unwrap();

        assert_eq!(list_plannings(&mut conn).await.unwrap()["p1"], planning);
        assert_eq!(list_schedules(&mut conn).await.unwrap()["p1"], vec![schedule]);
        assert_eq!(list_layers(&mut conn).await.unwrap()["root"], layer);
    }

    #[tokio::test]
    async fn test_layered_devices_skip_unassigned() {
        let client = SqliteClient::in_memory().await.unwrap();
        init_schema(client.pool()).await.unwrap();
        let mut conn = client.pool().acquire().await.unwrap();

        sqlx::query(
            r#"
            INSERT INTO devices (id, name, device_model_id, version, layer_id) VALUES
                ('a', 'A', 'm', 1, 'root'),
                ('b', 'B', 'm', 1, NULL),
                ('c', 'C', 'm', 1, '')
            "#,
        )
        .execute(&mut *conn)
        .await
        .unwrap();

        let devices = list_layered_devices(&mut conn).await.unwrap();
        assert_eq!(
            devices,
            vec![LayeredDevice {
                id: "a".into(),
                device_model_id: "m".into(),
                layer_id: "root".into(),
            }]
        );
    }
}

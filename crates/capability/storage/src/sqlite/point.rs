//! SQLite 点表存储

use crate::error::StorageError;
use crate::traits::PointStore;
use domain::DataPoint;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub struct SqlitePointStore {
    pub pool: SqlitePool,
}

impl SqlitePointStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_point(row: &SqliteRow) -> Result<DataPoint, StorageError> {
    let address: String = row.try_get("address")?;
    let frequency: Option<i64> = row.try_get("frequency")?;
    Ok(DataPoint {
        uuid: row.try_get("uuid")?,
        device_uuid: row.try_get("device_uuid")?,
        tag: row.try_get("tag")?,
        alias: row.try_get("alias")?,
        frequency: frequency.map(|f| f.max(0) as u64),
        address: serde_json::from_str(&address)?,
        data_type: row.try_get("data_type")?,
        data_order: row.try_get("data_order")?,
        weight: row.try_get("weight")?,
    })
}

#[async_trait::async_trait]
impl PointStore for SqlitePointStore {
    async fn list_points(&self, device_uuid: &str) -> Result<Vec<DataPoint>, StorageError> {
        let rows = sqlx::query(
            "select uuid, device_uuid, tag, alias, frequency, address, data_type, data_order, weight \
             from m_data_points where device_uuid = ? order by id asc",
        )
        .bind(device_uuid)
        .fetch_all(&self.pool)
        .await?;
        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            points.push(row_to_point(&row)?);
        }
        Ok(points)
    }

    async fn save_points(
        &self,
        device_uuid: &str,
        points: Vec<DataPoint>,
    ) -> Result<Vec<DataPoint>, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(points.len());
        for mut point in points {
            point.device_uuid = device_uuid.to_string();
            if point.is_new() {
                point.uuid = domain::make_uuid("POINT");
            }
            let address = serde_json::to_string(&point.address)?;
            let frequency = point.frequency.map(|f| f as i64);
            let updated = sqlx::query(
                "update m_data_points set tag = ?, alias = ?, frequency = ?, address = ?, \
                 data_type = ?, data_order = ?, weight = ? where uuid = ? and device_uuid = ?",
            )
            .bind(&point.tag)
            .bind(&point.alias)
            .bind(frequency)
            .bind(&address)
            .bind(&point.data_type)
            .bind(&point.data_order)
            .bind(point.weight)
            .bind(&point.uuid)
            .bind(device_uuid)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() == 0 {
                sqlx::query(
                    "insert into m_data_points \
                     (uuid, device_uuid, tag, alias, frequency, address, data_type, data_order, weight) \
                     values (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&point.uuid)
                .bind(device_uuid)
                .bind(&point.tag)
                .bind(&point.alias)
                .bind(frequency)
                .bind(&address)
                .bind(&point.data_type)
                .bind(&point.data_order)
                .bind(point.weight)
                .execute(&mut *tx)
                .await?;
            }
            saved.push(point);
        }
        tx.commit().await?;
        Ok(saved)
    }

    async fn delete_points(
        &self,
        device_uuid: &str,
        uuids: &[String],
    ) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for uuid in uuids {
            let result = sqlx::query("delete from m_data_points where uuid = ? and device_uuid = ?")
                .bind(uuid)
                .bind(device_uuid)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn delete_device_points(&self, device_uuid: &str) -> Result<u64, StorageError> {
        let result = sqlx::query("delete from m_data_points where device_uuid = ?")
            .bind(device_uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

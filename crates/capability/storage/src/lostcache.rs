//! 丢失数据缓存
//!
//! 每个北向目标一张 `lost_cache_<uuid>` 表，位于独立的 lostcache 库：
//! - 目标创建时建表（幂等），目标删除时随之删表；
//! - 引擎侧只追加，由目标驱动在重连后按最旧优先回放并逐行删除；
//! - 与投影表一样受 10000 / 100 滚动窗口触发器约束。

use crate::connection::rolling_window_trigger;
use crate::error::StorageError;
use crate::models::LostRecord;
use crate::validation::lost_cache_table;
use sqlx::{Row, SqlitePool};
use tracing::info;

#[derive(Clone)]
pub struct LostDataCache {
    pub pool: SqlitePool,
}

impl LostDataCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 建表与触发器（幂等）
    pub async fn create_table(&self, outend_uuid: &str) -> Result<(), StorageError> {
        let table = lost_cache_table(outend_uuid)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\
             id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
             target_id TEXT NOT NULL, \
             data TEXT NOT NULL, \
             create_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP)",
            table
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&rolling_window_trigger(&format!("{}_window", table), &table))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// 追加一条投递失败的载荷，返回行 id
    pub async fn append(&self, outend_uuid: &str, data: &str) -> Result<i64, StorageError> {
        let table = lost_cache_table(outend_uuid)?;
        let result = sqlx::query(&format!(
            "INSERT INTO \"{}\" (target_id, data) VALUES (?, ?)",
            table
        ))
        .bind(outend_uuid)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// 待回放数据，最旧优先
    pub async fn pending(&self, outend_uuid: &str, limit: i64) -> Result<Vec<LostRecord>, StorageError> {
        let table = lost_cache_table(outend_uuid)?;
        let rows = sqlx::query(&format!(
            "SELECT id, target_id, data, CAST(create_at AS TEXT) AS create_at \
             FROM \"{}\" ORDER BY id ASC LIMIT ?",
            table
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(LostRecord {
                id: row.try_get("id")?,
                target_id: row.try_get("target_id")?,
                data: row.try_get("data")?,
                create_at: row.try_get("create_at")?,
            });
        }
        Ok(records)
    }

    pub async fn delete(&self, outend_uuid: &str, id: i64) -> Result<bool, StorageError> {
        let table = lost_cache_table(outend_uuid)?;
        let result = sqlx::query(&format!("DELETE FROM \"{}\" WHERE id = ?", table))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self, outend_uuid: &str) -> Result<i64, StorageError> {
        let table = lost_cache_table(outend_uuid)?;
        let row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM \"{}\"", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    pub async fn table_exists(&self, outend_uuid: &str) -> Result<bool, StorageError> {
        let table = lost_cache_table(outend_uuid)?;
        let row = sqlx::query("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(&table)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// 删表（触发器随表删除）
    pub async fn drop_table(&self, outend_uuid: &str) -> Result<(), StorageError> {
        let table = lost_cache_table(outend_uuid)?;
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", table))
            .execute(&self.pool)
            .await?;
        info!(target: "gateway.storage", outend = %outend_uuid, "lost_cache_dropped");
        Ok(())
    }
}

//! SQLite 内部通知存储

use crate::error::StorageError;
use crate::models::NotifyRecord;
use crate::traits::NotifyStore;
use sqlx::{Row, SqlitePool};

pub struct SqliteNotifyStore {
    pub pool: SqlitePool,
}

impl SqliteNotifyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl NotifyStore for SqliteNotifyStore {
    async fn insert_notify(&self, record: NotifyRecord) -> Result<(), StorageError> {
        sqlx::query(
            "insert into m_internal_notifies (uuid, type, status, event, ts, summary, info) \
             values (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.uuid)
        .bind(&record.kind)
        .bind(record.status)
        .bind(&record.event)
        .bind(record.ts)
        .bind(&record.summary)
        .bind(&record.info)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_notifies(&self, limit: i64) -> Result<Vec<NotifyRecord>, StorageError> {
        let rows = sqlx::query(
            "select id, uuid, type, status, event, ts, summary, info, \
             cast(created_at as text) as created_at \
             from m_internal_notifies order by id desc limit ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(NotifyRecord {
                id: row.try_get("id")?,
                uuid: row.try_get("uuid")?,
                kind: row.try_get("type")?,
                status: row.try_get("status")?,
                event: row.try_get("event")?,
                ts: row.try_get("ts")?,
                summary: row.try_get("summary")?,
                info: row.try_get("info")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(records)
    }

    async fn purge_notifies(&self, retention: &str) -> Result<u64, StorageError> {
        let result =
            sqlx::query("delete from m_internal_notifies where created_at < date('now', ?)")
                .bind(retention)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

//! SQLite 规则存储

use crate::error::StorageError;
use crate::traits::RuleStore;
use domain::RuleConfig;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub struct SqliteRuleStore {
    pub pool: SqlitePool,
}

impl SqliteRuleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_rule(row: &SqliteRow) -> Result<RuleConfig, StorageError> {
    let from_source: String = row.try_get("from_source")?;
    let from_device: String = row.try_get("from_device")?;
    let actions: String = row.try_get("actions")?;
    Ok(RuleConfig {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        from_source: serde_json::from_str(&from_source)?,
        from_device: serde_json::from_str(&from_device)?,
        actions: serde_json::from_str(&actions)?,
    })
}

#[async_trait::async_trait]
impl RuleStore for SqliteRuleStore {
    async fn list_rules(&self) -> Result<Vec<RuleConfig>, StorageError> {
        let rows = sqlx::query(
            "select uuid, name, description, from_source, from_device, actions \
             from m_rules order by id asc",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            rules.push(row_to_rule(&row)?);
        }
        Ok(rules)
    }

    async fn find_rule(&self, uuid: &str) -> Result<Option<RuleConfig>, StorageError> {
        let row = sqlx::query(
            "select uuid, name, description, from_source, from_device, actions \
             from m_rules where uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(row_to_rule(&row)?))
    }

    async fn create_rule(&self, record: RuleConfig) -> Result<RuleConfig, StorageError> {
        sqlx::query(
            "insert into m_rules (uuid, name, description, from_source, from_device, actions) \
             values (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.uuid)
        .bind(&record.name)
        .bind(&record.description)
        .bind(serde_json::to_string(&record.from_source)?)
        .bind(serde_json::to_string(&record.from_device)?)
        .bind(serde_json::to_string(&record.actions)?)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn update_rule(&self, record: RuleConfig) -> Result<Option<RuleConfig>, StorageError> {
        let result = sqlx::query(
            "update m_rules set name = ?, description = ?, from_source = ?, from_device = ?, \
             actions = ? where uuid = ?",
        )
        .bind(&record.name)
        .bind(&record.description)
        .bind(serde_json::to_string(&record.from_source)?)
        .bind(serde_json::to_string(&record.from_device)?)
        .bind(serde_json::to_string(&record.actions)?)
        .bind(&record.uuid)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn delete_rule(&self, uuid: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from m_rules where uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

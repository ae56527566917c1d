//! SQLite 端点配置存储

use crate::error::StorageError;
use crate::traits::EndpointStore;
use domain::{EndpointConfig, EndpointKind};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub struct SqliteEndpointStore {
    pub pool: SqlitePool,
}

impl SqliteEndpointStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// 端点种类对应的配置表
pub fn endpoint_table(kind: EndpointKind) -> &'static str {
    match kind {
        EndpointKind::InEnd => "m_in_ends",
        EndpointKind::OutEnd => "m_out_ends",
        EndpointKind::Device => "m_devices",
        EndpointKind::Cecolla => "m_cecollas",
    }
}

fn row_to_endpoint(kind: EndpointKind, row: &SqliteRow) -> Result<EndpointConfig, StorageError> {
    let config: String = row.try_get("config")?;
    Ok(EndpointConfig {
        uuid: row.try_get("uuid")?,
        kind,
        type_name: row.try_get("type")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        config: serde_json::from_str(&config)?,
    })
}

#[async_trait::async_trait]
impl EndpointStore for SqliteEndpointStore {
    async fn list_endpoints(
        &self,
        kind: EndpointKind,
    ) -> Result<Vec<EndpointConfig>, StorageError> {
        let sql = format!(
            "select uuid, type, name, description, config from {} order by id asc",
            endpoint_table(kind)
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(row_to_endpoint(kind, &row)?);
        }
        Ok(items)
    }

    async fn find_endpoint(
        &self,
        kind: EndpointKind,
        uuid: &str,
    ) -> Result<Option<EndpointConfig>, StorageError> {
        let sql = format!(
            "select uuid, type, name, description, config from {} where uuid = ?",
            endpoint_table(kind)
        );
        let row = sqlx::query(&sql)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(row_to_endpoint(kind, &row)?))
    }

    async fn create_endpoint(
        &self,
        record: EndpointConfig,
    ) -> Result<EndpointConfig, StorageError> {
        let sql = format!(
            "insert into {} (uuid, type, name, description, config) values (?, ?, ?, ?, ?)",
            endpoint_table(record.kind)
        );
        sqlx::query(&sql)
            .bind(&record.uuid)
            .bind(&record.type_name)
            .bind(&record.name)
            .bind(&record.description)
            .bind(serde_json::to_string(&record.config)?)
            .execute(&self.pool)
            .await?;
        Ok(record)
    }

    async fn update_endpoint(
        &self,
        record: EndpointConfig,
    ) -> Result<Option<EndpointConfig>, StorageError> {
        let sql = format!(
            "update {} set type = ?, name = ?, description = ?, config = ? where uuid = ?",
            endpoint_table(record.kind)
        );
        let result = sqlx::query(&sql)
            .bind(&record.type_name)
            .bind(&record.name)
            .bind(&record.description)
            .bind(serde_json::to_string(&record.config)?)
            .bind(&record.uuid)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn delete_endpoint(&self, kind: EndpointKind, uuid: &str) -> Result<bool, StorageError> {
        let sql = format!("delete from {} where uuid = ?", endpoint_table(kind));
        let result = sqlx::query(&sql).bind(uuid).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

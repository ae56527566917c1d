//! 数据中心库：`data_center_<schema>` 投影表的读写
//!
//! 建表 DDL 由数据模型发布方生成，经 `SchemaStore::publish` 执行；
//! 这里负责行写入、回读、结构查询与按保留期清理。

use crate::error::StorageError;
use crate::models::{DatacenterRow, SqlValue};
use crate::validation::{ensure_identifier, projection_table};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct DatacenterStore {
    pub pool: SqlitePool,
}

impl DatacenterStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 写入一行，返回自增 id。列名必须是合法标识符。
    pub async fn insert_row(
        &self,
        schema_uuid: &str,
        row: &[(String, SqlValue)],
    ) -> Result<i64, StorageError> {
        let table = projection_table(schema_uuid)?;
        let sql = if row.is_empty() {
            format!("INSERT INTO \"{}\" DEFAULT VALUES", table)
        } else {
            let mut columns = Vec::with_capacity(row.len());
            for (name, _) in row {
                ensure_identifier(name)?;
                columns.push(format!("\"{}\"", name));
            }
            let placeholders = vec!["?"; row.len()].join(", ");
            format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders
            )
        };
        let mut query = sqlx::query(&sql);
        for (_, value) in row {
            query = match value {
                SqlValue::Null => query.bind(None::<String>),
                SqlValue::Integer(v) => query.bind(*v),
                SqlValue::Real(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.as_str()),
                SqlValue::Bool(v) => query.bind(*v),
            };
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    /// 最新的若干行（id 倒序）
    pub async fn latest_rows(
        &self,
        schema_uuid: &str,
        limit: i64,
    ) -> Result<Vec<DatacenterRow>, StorageError> {
        let table = projection_table(schema_uuid)?;
        let sql = format!("SELECT * FROM \"{}\" ORDER BY id DESC LIMIT ?", table);
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(decode_row(&row)?);
        }
        Ok(out)
    }

    /// 表结构中的列名（定义顺序）
    pub async fn table_columns(&self, schema_uuid: &str) -> Result<Vec<String>, StorageError> {
        let table = projection_table(schema_uuid)?;
        let rows = sqlx::query("SELECT name FROM pragma_table_info(?) ORDER BY cid")
            .bind(&table)
            .fetch_all(&self.pool)
            .await?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(row.try_get("name")?);
        }
        Ok(columns)
    }

    pub async fn table_exists(&self, schema_uuid: &str) -> Result<bool, StorageError> {
        let table = projection_table(schema_uuid)?;
        let row = sqlx::query("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(&table)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// 表上的索引与触发器名称（`type` 取 `index` 或 `trigger`）
    pub async fn table_objects(
        &self,
        schema_uuid: &str,
        object_type: &str,
    ) -> Result<Vec<String>, StorageError> {
        let table = projection_table(schema_uuid)?;
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = ? AND tbl_name = ? \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .bind(object_type)
        .bind(&table)
        .fetch_all(&self.pool)
        .await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get("name")?);
        }
        Ok(names)
    }

    pub async fn count_rows(&self, schema_uuid: &str) -> Result<i64, StorageError> {
        let table = projection_table(schema_uuid)?;
        let row = sqlx::query(&format!("SELECT COUNT(*) AS total FROM \"{}\"", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    /// 所有投影表名
    pub async fn projection_tables(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'data_center_%'",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get("name")?);
        }
        Ok(names)
    }

    /// 删除所有投影表中早于保留期的行。单表失败只记录日志，不影响其他表。
    pub async fn purge_expired(&self, retention: &str) -> Result<u64, StorageError> {
        let mut total = 0;
        for table in self.projection_tables().await? {
            if table.contains('"') {
                continue;
            }
            let sql = format!("DELETE FROM \"{}\" WHERE create_at < date('now', ?)", table);
            match sqlx::query(&sql).bind(retention).execute(&self.pool).await {
                Ok(result) => {
                    debug!(target: "gateway.storage", table = %table, deleted = result.rows_affected(), "datacenter_purged");
                    total += result.rows_affected();
                }
                Err(err) => {
                    warn!(target: "gateway.storage", table = %table, error = %err, "datacenter_purge_failed");
                }
            }
        }
        Ok(total)
    }
}

fn decode_row(row: &SqliteRow) -> Result<DatacenterRow, StorageError> {
    let mut out = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => SqlValue::Integer(row.try_get_unchecked::<i64, _>(index)?),
                "REAL" => SqlValue::Real(row.try_get_unchecked::<f64, _>(index)?),
                _ => SqlValue::Text(row.try_get_unchecked::<String, _>(index)?),
            }
        };
        out.push((sqlx::Column::name(column).to_string(), value));
    }
    Ok(out)
}

//! SQLite 数据模型存储
//!
//! 发布 / 撤销 / 级联删除同时涉及配置库与数据中心库：
//! 外层事务开在配置库，内层事务开在数据中心库，内层失败则外层回滚。
//! 两库之间不是分布式事务；DDL 全部 `IF NOT EXISTS`，崩溃后重新发布即可自愈。

use crate::error::StorageError;
use crate::traits::SchemaStore;
use crate::validation::projection_table;
use domain::{IotProperty, IotSchema, PropertyType, ReadWrite};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

pub struct SqliteSchemaStore {
    pub config: SqlitePool,
    pub datacenter: SqlitePool,
}

impl SqliteSchemaStore {
    pub fn new(config: SqlitePool, datacenter: SqlitePool) -> Self {
        Self { config, datacenter }
    }
}

const PROPERTY_COLUMNS: &str =
    "uuid, schema_id, name, label, type, rw, unit, description, rule";

fn row_to_schema(row: &SqliteRow) -> Result<IotSchema, StorageError> {
    let published: i64 = row.try_get("published")?;
    Ok(IotSchema {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        published: published != 0,
        description: row.try_get("description")?,
    })
}

fn row_to_property(row: &SqliteRow) -> Result<IotProperty, StorageError> {
    let kind: String = row.try_get("type")?;
    let rw: String = row.try_get("rw")?;
    let rule: String = row.try_get("rule")?;
    Ok(IotProperty {
        uuid: row.try_get("uuid")?,
        schema_id: row.try_get("schema_id")?,
        name: row.try_get("name")?,
        label: row.try_get("label")?,
        kind: kind.parse::<PropertyType>().map_err(StorageError::new)?,
        rw: rw.parse::<ReadWrite>().map_err(StorageError::new)?,
        unit: row.try_get("unit")?,
        description: row.try_get("description")?,
        rule: serde_json::from_str(&rule)?,
    })
}

fn rows_to_properties(rows: Vec<SqliteRow>) -> Result<Vec<IotProperty>, StorageError> {
    let mut properties = Vec::with_capacity(rows.len());
    for row in rows {
        properties.push(row_to_property(&row)?);
    }
    Ok(properties)
}

#[async_trait::async_trait]
impl SchemaStore for SqliteSchemaStore {
    async fn list_schemas(&self) -> Result<Vec<IotSchema>, StorageError> {
        let rows = sqlx::query(
            "select uuid, name, published, description from m_iot_schemas order by id asc",
        )
        .fetch_all(&self.config)
        .await?;
        let mut schemas = Vec::with_capacity(rows.len());
        for row in rows {
            schemas.push(row_to_schema(&row)?);
        }
        Ok(schemas)
    }

    async fn find_schema(&self, uuid: &str) -> Result<Option<IotSchema>, StorageError> {
        let row = sqlx::query(
            "select uuid, name, published, description from m_iot_schemas where uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&self.config)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(row_to_schema(&row)?))
    }

    async fn create_schema(&self, record: IotSchema) -> Result<IotSchema, StorageError> {
        sqlx::query(
            "insert into m_iot_schemas (uuid, name, published, description) values (?, ?, ?, ?)",
        )
        .bind(&record.uuid)
        .bind(&record.name)
        .bind(record.published)
        .bind(&record.description)
        .execute(&self.config)
        .await?;
        Ok(record)
    }

    async fn update_schema(&self, record: IotSchema) -> Result<Option<IotSchema>, StorageError> {
        let result =
            sqlx::query("update m_iot_schemas set name = ?, description = ? where uuid = ?")
                .bind(&record.name)
                .bind(&record.description)
                .bind(&record.uuid)
                .execute(&self.config)
                .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_schema(&record.uuid).await
    }

    async fn list_properties(&self, schema_uuid: &str) -> Result<Vec<IotProperty>, StorageError> {
        let sql = format!(
            "select {PROPERTY_COLUMNS} from m_iot_properties where schema_id = ? \
             order by created_at desc, id desc"
        );
        let rows = sqlx::query(&sql)
            .bind(schema_uuid)
            .fetch_all(&self.config)
            .await?;
        rows_to_properties(rows)
    }

    async fn find_property(&self, uuid: &str) -> Result<Option<IotProperty>, StorageError> {
        let sql = format!("select {PROPERTY_COLUMNS} from m_iot_properties where uuid = ?");
        let row = sqlx::query(&sql)
            .bind(uuid)
            .fetch_optional(&self.config)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(row_to_property(&row)?))
    }

    async fn create_property(&self, record: IotProperty) -> Result<IotProperty, StorageError> {
        sqlx::query(
            "insert into m_iot_properties \
             (uuid, schema_id, name, label, type, rw, unit, description, rule) \
             values (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.uuid)
        .bind(&record.schema_id)
        .bind(&record.name)
        .bind(&record.label)
        .bind(record.kind.as_str())
        .bind(record.rw.as_str())
        .bind(&record.unit)
        .bind(&record.description)
        .bind(serde_json::to_string(&record.rule)?)
        .execute(&self.config)
        .await?;
        Ok(record)
    }

    async fn update_property(
        &self,
        record: IotProperty,
    ) -> Result<Option<IotProperty>, StorageError> {
        let result = sqlx::query(
            "update m_iot_properties set name = ?, label = ?, type = ?, rw = ?, unit = ?, \
             description = ?, rule = ? where uuid = ?",
        )
        .bind(&record.name)
        .bind(&record.label)
        .bind(record.kind.as_str())
        .bind(record.rw.as_str())
        .bind(&record.unit)
        .bind(&record.description)
        .bind(serde_json::to_string(&record.rule)?)
        .bind(&record.uuid)
        .execute(&self.config)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn delete_property(&self, uuid: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from m_iot_properties where uuid = ?")
            .bind(uuid)
            .execute(&self.config)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn published_properties(&self) -> Result<Vec<IotProperty>, StorageError> {
        let rows = sqlx::query(
            "select p.uuid, p.schema_id, p.name, p.label, p.type, p.rw, p.unit, p.description, p.rule \
             from m_iot_properties p join m_iot_schemas s on s.uuid = p.schema_id \
             where s.published = 1 order by p.created_at desc, p.id desc",
        )
        .fetch_all(&self.config)
        .await?;
        rows_to_properties(rows)
    }

    async fn publish(&self, schema_uuid: &str, ddl: &[String]) -> Result<bool, StorageError> {
        let mut tx = self.config.begin().await?;
        let row = sqlx::query("select published from m_iot_schemas where uuid = ?")
            .bind(schema_uuid)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(StorageError::new(format!("schema not found: {}", schema_uuid)));
        };
        let published: i64 = row.try_get("published")?;
        if published != 0 {
            return Ok(false);
        }
        sqlx::query("update m_iot_schemas set published = 1 where uuid = ?")
            .bind(schema_uuid)
            .execute(&mut *tx)
            .await?;

        let mut dc = self.datacenter.begin().await?;
        for statement in ddl {
            sqlx::query(statement).execute(&mut *dc).await?;
        }
        dc.commit().await?;
        tx.commit().await?;
        info!(target: "gateway.storage", schema = %schema_uuid, statements = ddl.len(), "schema_published");
        Ok(true)
    }

    async fn reset(&self, schema_uuid: &str) -> Result<bool, StorageError> {
        let table = projection_table(schema_uuid)?;
        let mut tx = self.config.begin().await?;
        let result = sqlx::query("update m_iot_schemas set published = 0 where uuid = ?")
            .bind(schema_uuid)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        let mut dc = self.datacenter.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", table))
            .execute(&mut *dc)
            .await?;
        dc.commit().await?;
        tx.commit().await?;
        info!(target: "gateway.storage", schema = %schema_uuid, "schema_reset");
        Ok(true)
    }

    async fn delete_schema(&self, schema_uuid: &str) -> Result<bool, StorageError> {
        let table = projection_table(schema_uuid)?;
        let mut tx = self.config.begin().await?;
        let row = sqlx::query("select published from m_iot_schemas where uuid = ?")
            .bind(schema_uuid)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let published: i64 = row.try_get("published")?;
        sqlx::query("delete from m_iot_properties where schema_id = ?")
            .bind(schema_uuid)
            .execute(&mut *tx)
            .await?;
        sqlx::query("delete from m_iot_schemas where uuid = ?")
            .bind(schema_uuid)
            .execute(&mut *tx)
            .await?;
        if published != 0 {
            let mut dc = self.datacenter.begin().await?;
            sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", table))
                .execute(&mut *dc)
                .await?;
            dc.commit().await?;
        }
        tx.commit().await?;
        info!(target: "gateway.storage", schema = %schema_uuid, published = published != 0, "schema_deleted");
        Ok(true)
    }
}

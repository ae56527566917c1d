//! SchemaPublisher：数据模型管理、发布与校验写入
//!
//! 发布后属性集合不可变；任何属性变更都要先撤销发布（fix）。
//! 发布、撤销、删除完成后重建 DataSchemaCache。

use crate::cache::{DataSchemaCache, RESERVED_COLUMNS};
use crate::ddl::{build_ddl, ensure_column_name};
use crate::error::SchemaError;
use domain::{
    IotProperty, IotSchema, PropertyRule, PropertyType, ReadWrite, Value, make_uuid,
};
use edge_storage::{DatacenterStore, SchemaStore, SqlValue};
use edge_telemetry::{record_schema_row_rejected, record_schema_row_written};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// 新增 / 编辑属性的输入；类型与读写以文本给出，在这里解析
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyInput {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub rw: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rule: PropertyRule,
}

fn ensure_name_length(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.len() > 64 {
        return Err(SchemaError::validation(
            "'name' length must be in the range of 1-64",
        ));
    }
    Ok(())
}

pub struct SchemaPublisher {
    store: Arc<dyn SchemaStore>,
    datacenter: DatacenterStore,
    cache: Arc<DataSchemaCache>,
}

impl SchemaPublisher {
    pub fn new(
        store: Arc<dyn SchemaStore>,
        datacenter: DatacenterStore,
        cache: Arc<DataSchemaCache>,
    ) -> Self {
        Self {
            store,
            datacenter,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<DataSchemaCache> {
        &self.cache
    }

    pub fn datacenter(&self) -> &DatacenterStore {
        &self.datacenter
    }

    /// 启动时构建校验缓存
    pub async fn rebuild_cache(&self) -> Result<usize, SchemaError> {
        self.cache.rebuild(self.store.as_ref()).await
    }

    async fn require_schema(&self, uuid: &str) -> Result<IotSchema, SchemaError> {
        self.store
            .find_schema(uuid)
            .await?
            .ok_or_else(|| SchemaError::NotFound(format!("schema not exists:{}", uuid)))
    }

    async fn require_draft(&self, uuid: &str) -> Result<IotSchema, SchemaError> {
        let schema = self.require_schema(uuid).await?;
        if schema.published {
            return Err(SchemaError::validation("Data Schema Already published"));
        }
        Ok(schema)
    }

    pub async fn create_schema(
        &self,
        name: &str,
        description: &str,
    ) -> Result<IotSchema, SchemaError> {
        ensure_name_length(name)?;
        let mut schema = IotSchema::new(name);
        schema.description = description.to_string();
        Ok(self.store.create_schema(schema).await?)
    }

    pub async fn update_schema(
        &self,
        uuid: &str,
        name: &str,
        description: &str,
    ) -> Result<IotSchema, SchemaError> {
        ensure_name_length(name)?;
        let mut schema = self.require_schema(uuid).await?;
        schema.name = name.to_string();
        schema.description = description.to_string();
        self.store
            .update_schema(schema)
            .await?
            .ok_or_else(|| SchemaError::NotFound(format!("schema not exists:{}", uuid)))
    }

    pub async fn list_schemas(&self) -> Result<Vec<IotSchema>, SchemaError> {
        Ok(self.store.list_schemas().await?)
    }

    pub async fn get_schema(&self, uuid: &str) -> Result<IotSchema, SchemaError> {
        self.require_schema(uuid).await
    }

    /// 属性列表，按创建时间倒序
    pub async fn list_properties(&self, schema_uuid: &str) -> Result<Vec<IotProperty>, SchemaError> {
        Ok(self.store.list_properties(schema_uuid).await?)
    }

    fn parse_input(
        schema_uuid: &str,
        uuid: String,
        input: PropertyInput,
    ) -> Result<IotProperty, SchemaError> {
        ensure_column_name(&input.name)?;
        let kind = input
            .kind
            .parse::<PropertyType>()
            .map_err(SchemaError::Validation)?;
        let rw = input.rw.parse::<ReadWrite>().map_err(SchemaError::Validation)?;
        Ok(IotProperty {
            uuid,
            schema_id: schema_uuid.to_string(),
            name: input.name,
            label: input.label,
            kind,
            rw,
            unit: input.unit,
            description: input.description,
            rule: input.rule,
        })
    }

    pub async fn add_property(
        &self,
        schema_uuid: &str,
        input: PropertyInput,
    ) -> Result<IotProperty, SchemaError> {
        self.require_draft(schema_uuid).await?;
        let property = Self::parse_input(schema_uuid, make_uuid("PROPERTY"), input)?;
        let existing = self.store.list_properties(schema_uuid).await?;
        if existing.iter().any(|p| p.name == property.name) {
            return Err(SchemaError::validation(format!(
                "Already Exists Property:{}",
                property.name
            )));
        }
        Ok(self.store.create_property(property).await?)
    }

    pub async fn update_property(
        &self,
        property_uuid: &str,
        input: PropertyInput,
    ) -> Result<IotProperty, SchemaError> {
        let current = self
            .store
            .find_property(property_uuid)
            .await?
            .ok_or_else(|| {
                SchemaError::NotFound(format!("property not exists:{}", property_uuid))
            })?;
        self.require_draft(&current.schema_id).await?;
        let property = Self::parse_input(&current.schema_id, current.uuid.clone(), input)?;
        let existing = self.store.list_properties(&current.schema_id).await?;
        if existing
            .iter()
            .any(|p| p.name == property.name && p.uuid != property.uuid)
        {
            return Err(SchemaError::validation(format!(
                "Already Exists Property:{}",
                property.name
            )));
        }
        self.store
            .update_property(property)
            .await?
            .ok_or_else(|| SchemaError::NotFound(format!("property not exists:{}", property_uuid)))
    }

    pub async fn delete_property(&self, property_uuid: &str) -> Result<(), SchemaError> {
        let current = self
            .store
            .find_property(property_uuid)
            .await?
            .ok_or_else(|| {
                SchemaError::NotFound(format!("property not exists:{}", property_uuid))
            })?;
        self.require_draft(&current.schema_id).await?;
        self.store.delete_property(property_uuid).await?;
        Ok(())
    }

    /// 发布：生成 DDL，两库事务内建表并置位 published，随后重建缓存
    pub async fn publish(&self, schema_uuid: &str) -> Result<(), SchemaError> {
        self.require_draft(schema_uuid).await?;
        let properties = self.store.list_properties(schema_uuid).await?;
        let ddl = build_ddl(schema_uuid, &properties)?;
        if !self.store.publish(schema_uuid, &ddl).await? {
            return Err(SchemaError::validation("Data Schema Already published"));
        }
        info!(target: "gateway.schema", schema = %schema_uuid, columns = properties.len(), "schema_published");
        self.rebuild_cache().await?;
        Ok(())
    }

    /// 撤销发布：删除投影表，模型回到草稿，属性保留
    pub async fn fix(&self, schema_uuid: &str) -> Result<(), SchemaError> {
        self.require_schema(schema_uuid).await?;
        self.store.reset(schema_uuid).await?;
        info!(target: "gateway.schema", schema = %schema_uuid, "schema_fixed");
        self.rebuild_cache().await?;
        Ok(())
    }

    /// 删除模型与属性；已发布时一并删除投影表
    pub async fn delete_schema(&self, schema_uuid: &str) -> Result<(), SchemaError> {
        let schema = self.require_schema(schema_uuid).await?;
        self.store.delete_schema(schema_uuid).await?;
        info!(target: "gateway.schema", schema = %schema_uuid, published = schema.published, "schema_deleted");
        if schema.published {
            self.rebuild_cache().await?;
        }
        Ok(())
    }

    /// 校验后写入一行，返回行 id。
    ///
    /// `id` / `create_at` 由数据库生成，传入时忽略。
    pub async fn write(
        &self,
        schema_uuid: &str,
        row: &BTreeMap<String, Value>,
    ) -> Result<i64, SchemaError> {
        match self.validate_row(schema_uuid, row) {
            Ok(columns) => {
                let id = self.datacenter.insert_row(schema_uuid, &columns).await?;
                record_schema_row_written();
                Ok(id)
            }
            Err(err) => {
                record_schema_row_rejected();
                warn!(target: "gateway.schema", schema = %schema_uuid, error = %err, "schema_row_rejected");
                Err(err)
            }
        }
    }

    fn validate_row(
        &self,
        schema_uuid: &str,
        row: &BTreeMap<String, Value>,
    ) -> Result<Vec<(String, SqlValue)>, SchemaError> {
        if !self.cache.contains_schema(schema_uuid) {
            return Err(SchemaError::validation(format!(
                "schema not published:{}",
                schema_uuid
            )));
        }
        let mut columns = Vec::with_capacity(row.len());
        for (name, value) in row {
            if RESERVED_COLUMNS.contains(&name.as_str()) {
                continue;
            }
            let cached = self.cache.get(schema_uuid, name).ok_or_else(|| {
                SchemaError::validation(format!("unknown property: {}", name))
            })?;
            cached
                .validator
                .validate(value)
                .map_err(|message| SchemaError::InvalidValue {
                    property: name.clone(),
                    message,
                })?;
            columns.push((name.clone(), to_sql_value(value)));
        }
        Ok(columns)
    }

    /// 最新的若干行，id 倒序
    pub async fn query_latest(
        &self,
        schema_uuid: &str,
        limit: i64,
    ) -> Result<Vec<serde_json::Map<String, serde_json::Value>>, SchemaError> {
        self.require_schema(schema_uuid).await?;
        let rows = self.datacenter.latest_rows(schema_uuid, limit).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(name, value)| (name, value.to_json()))
                    .collect()
            })
            .collect())
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Geo { .. } | Value::Raw(_) => SqlValue::Text(value.to_string()),
    }
}

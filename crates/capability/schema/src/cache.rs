//! DataSchemaCache：已发布模型的属性校验器常驻缓存
//!
//! 只收录已发布模型的属性，`id` / `create_at` 两个系统列不进缓存。
//! 每次发布、撤销、删除后整体重建；同时镜像到 InterCache 的
//! `__DataSchema` 插槽（属性名 -> 属性 JSON），供观测接口读取。

use crate::error::SchemaError;
use crate::validator::PropertyValidator;
use domain::{CacheValue, IotProperty, Value};
use edge_cache::{DATA_SCHEMA_SLOT, InterCache};
use edge_storage::SchemaStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// 系统列，不允许作为属性名
pub const RESERVED_COLUMNS: [&str; 2] = ["id", "create_at"];

#[derive(Debug, Clone)]
pub struct CachedProperty {
    pub property: IotProperty,
    pub validator: PropertyValidator,
}

pub struct DataSchemaCache {
    schemas: RwLock<HashMap<String, HashMap<String, CachedProperty>>>,
    inter: Arc<InterCache>,
}

impl DataSchemaCache {
    pub fn new(inter: Arc<InterCache>) -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
            inter,
        }
    }

    /// 从配置库重建
    pub async fn rebuild(&self, store: &dyn SchemaStore) -> Result<usize, SchemaError> {
        let properties = store.published_properties().await?;
        let mut schemas: HashMap<String, HashMap<String, CachedProperty>> = HashMap::new();
        for property in properties {
            if RESERVED_COLUMNS.contains(&property.name.as_str()) {
                continue;
            }
            let validator = PropertyValidator::from_property(&property);
            schemas
                .entry(property.schema_id.clone())
                .or_default()
                .insert(
                    property.name.clone(),
                    CachedProperty {
                        property,
                        validator,
                    },
                );
        }
        let total = schemas.values().map(|props| props.len()).sum();

        self.inter.unregister_slot(DATA_SCHEMA_SLOT);
        self.inter.register_slot(DATA_SCHEMA_SLOT);
        for cached in schemas.values().flat_map(|props| props.values()) {
            let json = match serde_json::to_string(&cached.property) {
                Ok(json) => json,
                Err(err) => {
                    warn!(target: "gateway.schema", property = %cached.property.uuid, error = %err, "property_encode_failed");
                    continue;
                }
            };
            let value = CacheValue::ok(cached.property.uuid.clone(), Value::String(json));
            if let Err(err) = self
                .inter
                .set_value(DATA_SCHEMA_SLOT, &cached.property.name, value)
            {
                warn!(target: "gateway.schema", error = %err, "schema_slot_write_failed");
            }
        }

        let mut guard = self
            .schemas
            .write()
            .map_err(|_| SchemaError::validation("schema cache lock failed"))?;
        *guard = schemas;
        info!(target: "gateway.schema", properties = total, "data_schema_cache_rebuilt");
        Ok(total)
    }

    pub fn contains_schema(&self, schema_uuid: &str) -> bool {
        self.schemas
            .read()
            .map(|schemas| schemas.contains_key(schema_uuid))
            .unwrap_or(false)
    }

    pub fn get(&self, schema_uuid: &str, name: &str) -> Option<CachedProperty> {
        self.schemas
            .read()
            .ok()?
            .get(schema_uuid)?
            .get(name)
            .cloned()
    }

    /// 按属性名跨模型查找（与 `__DataSchema` 插槽同键）
    pub fn get_by_name(&self, name: &str) -> Option<CachedProperty> {
        let schemas = self.schemas.read().ok()?;
        schemas.values().find_map(|props| props.get(name).cloned())
    }

    pub fn properties(&self, schema_uuid: &str) -> Vec<CachedProperty> {
        self.schemas
            .read()
            .ok()
            .and_then(|schemas| schemas.get(schema_uuid).map(|p| p.values().cloned().collect()))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.schemas
            .read()
            .map(|schemas| schemas.values().map(|p| p.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

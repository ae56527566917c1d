//! 属性列表到投影表 DDL 的降级

use crate::cache::RESERVED_COLUMNS;
use crate::error::SchemaError;
use crate::validator::is_valid_geo;
use domain::{IotProperty, PropertyType};
use edge_storage::{is_identifier, projection_table, rolling_window_trigger};

/// 属性类型到 SQLite 列类型
pub fn sql_type(type_name: &str) -> &'static str {
    match type_name {
        "STRING" => "TEXT",
        "INTEGER" => "INTEGER",
        "FLOAT" => "REAL",
        "BOOL" => "BOOLEAN",
        "DATETIME" => "DATETIME",
        _ => "TEXT",
    }
}

fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// 列默认值字面量，取自 `rule.defaultValue`
pub fn default_literal(property: &IotProperty) -> String {
    let default = property.rule.default_value.as_ref();
    match property.kind {
        PropertyType::String => match default {
            Some(serde_json::Value::String(s)) => quote_text(s),
            Some(serde_json::Value::Null) | None => "''".to_string(),
            Some(other) => quote_text(&other.to_string()),
        },
        PropertyType::Integer => default
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .unwrap_or(0)
            .to_string(),
        PropertyType::Float => default
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
            .to_string(),
        PropertyType::Bool => {
            let truthy = match default {
                Some(serde_json::Value::Bool(b)) => *b,
                Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
                _ => false,
            };
            let literal = if truthy { "1" } else { "0" };
            literal.to_string()
        }
        PropertyType::Geo => match default {
            Some(serde_json::Value::String(s)) if is_valid_geo(s) => quote_text(s),
            _ => "'0,0'".to_string(),
        },
    }
}

/// 属性名能否作为投影表列名
pub fn ensure_column_name(name: &str) -> Result<(), SchemaError> {
    if is_identifier(name) && !RESERVED_COLUMNS.contains(&name) {
        Ok(())
    } else {
        Err(SchemaError::validation(format!(
            "invalid property name: {}",
            name
        )))
    }
}

/// 生成建表、两个索引与滚动窗口触发器，按执行顺序返回。
///
/// 列顺序与传入的属性顺序一致（调用方按创建时间倒序传入）。
/// SQLite 的索引名在库内全局唯一，因此索引名带上模型 UUID。
pub fn build_ddl(schema_uuid: &str, properties: &[IotProperty]) -> Result<Vec<String>, SchemaError> {
    if properties.is_empty() {
        return Err(SchemaError::validation("Must contain at least one property"));
    }
    let table = projection_table(schema_uuid)?;
    let mut columns = vec![
        "id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT".to_string(),
        "create_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP".to_string(),
    ];
    for property in properties {
        ensure_column_name(&property.name)?;
        columns.push(format!(
            "\"{}\" {} NOT NULL DEFAULT {}",
            property.name,
            sql_type(property.kind.as_str()),
            default_literal(property)
        ));
    }
    Ok(vec![
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            table,
            columns.join(", ")
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS \"idx_id_{uuid}\" ON \"{table}\" (id DESC)",
            uuid = schema_uuid,
            table = table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS \"idx_create_at_{uuid}\" ON \"{table}\" (create_at DESC)",
            uuid = schema_uuid,
            table = table
        ),
        rolling_window_trigger(schema_uuid, &table),
    ])
}

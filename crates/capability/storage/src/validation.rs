//! 标识符校验
//!
//! 投影表名、列名、丢失数据表名都会直接拼进 SQL，
//! 只有通过这里校验的名字才允许进入语句。

use crate::error::StorageError;

/// 是否为合法列名：`[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// 校验列名
pub fn ensure_identifier(name: &str) -> Result<(), StorageError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(StorageError::new(format!("invalid identifier: {}", name)))
    }
}

/// 校验实体 UUID 可安全地作为表名后缀 / 触发器名
pub fn ensure_table_suffix(uuid: &str) -> Result<(), StorageError> {
    if !uuid.is_empty() && uuid.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        Ok(())
    } else {
        Err(StorageError::new(format!("invalid table suffix: {}", uuid)))
    }
}

/// 数据中心投影表名
pub fn projection_table(schema_uuid: &str) -> Result<String, StorageError> {
    ensure_table_suffix(schema_uuid)?;
    Ok(format!("data_center_{}", schema_uuid))
}

/// 丢失数据缓存表名
pub fn lost_cache_table(outend_uuid: &str) -> Result<String, StorageError> {
    ensure_table_suffix(outend_uuid)?;
    Ok(format!("lost_cache_{}", outend_uuid))
}

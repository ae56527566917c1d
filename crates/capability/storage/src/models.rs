//! 存储层专用数据结构
//!
//! 端点、规则、点位、数据模型直接复用 `domain` 中的类型；
//! 这里只放只在持久化边界出现的形状。

use serde::Serialize;

/// 内部通知行（`m_internal_notifies`）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotifyRecord {
    pub id: i64,
    pub uuid: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// 1 未读 / 2 已读
    pub status: i64,
    pub event: String,
    pub ts: i64,
    pub summary: String,
    pub info: String,
    pub created_at: String,
}

/// 丢失数据缓存中的一行
#[derive(Debug, Clone, PartialEq)]
pub struct LostRecord {
    pub id: i64,
    pub target_id: String,
    pub data: String,
    pub create_at: String,
}

/// 投影表单元格的值
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl SqlValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SqlValue::Null => serde_json::Value::Null,
            SqlValue::Integer(v) => serde_json::Value::from(*v),
            SqlValue::Real(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            SqlValue::Text(v) => serde_json::Value::String(v.clone()),
            SqlValue::Bool(v) => serde_json::Value::Bool(*v),
        }
    }
}

/// 投影表中的一行：列名 -> 值，按表定义顺序
pub type DatacenterRow = Vec<(String, SqlValue)>;

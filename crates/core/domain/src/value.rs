//! 标签化的值类型，替代缓存中的任意类型值。

use serde::{Serialize, Serializer};
use std::fmt;

/// 值的声明类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Int,
    Float,
    Bool,
    Geo,
    Raw,
}

impl ValueKind {
    /// 按点位 / 属性声明的类型名映射
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "STRING" | "UTF8" => Some(ValueKind::String),
            "INTEGER" | "INT" | "INT16" | "UINT16" | "INT32" | "UINT32" | "UINT" | "BYTE" => {
                Some(ValueKind::Int)
            }
            "FLOAT" | "FLOAT32" | "UFLOAT32" | "DOUBLE" => Some(ValueKind::Float),
            "BOOL" | "I" | "Q" => Some(ValueKind::Bool),
            "GEO" => Some(ValueKind::Geo),
            "RAW" => Some(ValueKind::Raw),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "STRING",
            ValueKind::Int => "INTEGER",
            ValueKind::Float => "FLOAT",
            ValueKind::Bool => "BOOL",
            ValueKind::Geo => "GEO",
            ValueKind::Raw => "RAW",
        }
    }
}

/// 值解析错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("can not scan '{raw}' as {kind}")]
pub struct ValueError {
    pub kind: &'static str,
    pub raw: String,
}

/// 缓存与规则之间流转的值
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Geo { lat: f64, lon: f64 },
    Raw(Vec<u8>),
}

impl Value {
    /// 按声明类型解析表格 / 文本表示
    pub fn scan(kind: ValueKind, raw: &str) -> Result<Self, ValueError> {
        let text = raw.trim();
        let error = || ValueError {
            kind: kind.as_str(),
            raw: raw.to_string(),
        };
        match kind {
            ValueKind::String => Ok(Value::String(raw.to_string())),
            ValueKind::Int => text.parse::<i64>().map(Value::Int).map_err(|_| error()),
            ValueKind::Float => text.parse::<f64>().map(Value::Float).map_err(|_| error()),
            ValueKind::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(error()),
            },
            ValueKind::Geo => {
                let (lat, lon) = text.split_once(',').ok_or_else(error)?;
                let lat = lat.trim().parse::<f64>().map_err(|_| error())?;
                let lon = lon.trim().parse::<f64>().map_err(|_| error())?;
                Ok(Value::Geo { lat, lon })
            }
            ValueKind::Raw => Ok(Value::Raw(raw.as_bytes().to_vec())),
        }
    }

    /// 从 JSON 表示构造（规则输出、驱动载荷）
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::String(String::new()),
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Geo { .. } => serde_json::Value::String(self.to_string()),
            Value::Raw(bytes) => serde_json::Value::from(bytes.clone()),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Geo { .. } => ValueKind::Geo,
            Value::Raw(_) => ValueKind::Raw,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Geo { lat, lon } => write!(f, "{},{}", lat, lon),
            Value::Raw(bytes) => {
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

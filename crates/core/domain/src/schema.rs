//! 数据模型（IotSchema）与属性（IotProperty）。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IotSchema {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub description: String,
}

impl IotSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: crate::make_uuid("SCHEMA"),
            name: name.into(),
            published: false,
            description: String::new(),
        }
    }
}

/// 属性类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PropertyType {
    String,
    Integer,
    Float,
    Bool,
    Geo,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "STRING",
            PropertyType::Integer => "INTEGER",
            PropertyType::Float => "FLOAT",
            PropertyType::Bool => "BOOL",
            PropertyType::Geo => "GEO",
        }
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STRING" => Ok(PropertyType::String),
            "INTEGER" => Ok(PropertyType::Integer),
            "FLOAT" => Ok(PropertyType::Float),
            "BOOL" => Ok(PropertyType::Bool),
            "GEO" => Ok(PropertyType::Geo),
            other => Err(format!("invalid property type: {}", other)),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 读写属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadWrite {
    R,
    W,
    RW,
}

impl ReadWrite {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadWrite::R => "R",
            ReadWrite::W => "W",
            ReadWrite::RW => "RW",
        }
    }
}

impl FromStr for ReadWrite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "R" => Ok(ReadWrite::R),
            "W" => Ok(ReadWrite::W),
            "RW" => Ok(ReadWrite::RW),
            _ => Err("RW Value Only Support 'R' or 'W' or 'RW'".to_string()),
        }
    }
}

/// 属性规则（JSON 存储）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_label: Option<String>,
    /// 小数位，仅元数据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IotProperty {
    pub uuid: String,
    pub schema_id: String,
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    pub rw: ReadWrite,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rule: PropertyRule,
}

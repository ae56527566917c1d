//! 规则模型
//!
//! 规则与端点之间只通过 UUID 互相引用，分发时再解析。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 规则动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// 把样本载荷投递到北向目标
    DataToTarget { target: String },
    /// 把样本按映射写入已发布的数据模型，`mapping` 为 属性名 -> 点位 tag
    DataToSchema {
        schema: String,
        #[serde(default)]
        mapping: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub from_source: Vec<String>,
    #[serde(default)]
    pub from_device: Vec<String>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
}

impl RuleConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: crate::make_uuid("RULE"),
            name: name.into(),
            description: String::new(),
            from_source: Vec::new(),
            from_device: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// 规则是否以任一方式引用该端点
    pub fn references(&self, uuid: &str) -> bool {
        self.from_source.iter().any(|id| id == uuid)
            || self.from_device.iter().any(|id| id == uuid)
            || self.actions.iter().any(|action| match action {
                RuleAction::DataToTarget { target } => target == uuid,
                RuleAction::DataToSchema { .. } => false,
            })
    }

    /// 规则是否订阅该采集源 / 设备
    pub fn listens_to(&self, uuid: &str) -> bool {
        self.from_source.iter().any(|id| id == uuid)
            || self.from_device.iter().any(|id| id == uuid)
    }
}

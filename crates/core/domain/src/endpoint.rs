//! 端点模型
//!
//! InEnd / OutEnd / Device / Cecolla 共用同一形状：
//! `{uuid, type, name, description, config}`，运行态另行维护 `state`。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 端点种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// 南向采集源
    InEnd,
    /// 北向目标
    OutEnd,
    /// 带点表的南向设备
    Device,
    /// 云平台上行通道
    Cecolla,
}

impl EndpointKind {
    pub const ALL: [EndpointKind; 4] = [
        EndpointKind::InEnd,
        EndpointKind::OutEnd,
        EndpointKind::Device,
        EndpointKind::Cecolla,
    ];

    /// 事件名与日志中使用的小写标识
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::InEnd => "inend",
            EndpointKind::OutEnd => "outend",
            EndpointKind::Device => "device",
            EndpointKind::Cecolla => "cecolla",
        }
    }

    /// 面向用户的名称（错误信息、通知文本）
    pub fn label(&self) -> &'static str {
        match self {
            EndpointKind::InEnd => "InEnd",
            EndpointKind::OutEnd => "OutEnd",
            EndpointKind::Device => "Device",
            EndpointKind::Cecolla => "Cecolla",
        }
    }

    /// 新建实体时的 UUID 前缀
    pub fn uuid_prefix(&self) -> &'static str {
        match self {
            EndpointKind::InEnd => "INEND",
            EndpointKind::OutEnd => "OUTEND",
            EndpointKind::Device => "DEVICE",
            EndpointKind::Cecolla => "CECOLLA",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 端点运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointState {
    #[default]
    Stop,
    Up,
    Down,
    Pause,
}

impl EndpointState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointState::Stop => "STOP",
            EndpointState::Up => "UP",
            EndpointState::Down => "DOWN",
            EndpointState::Pause => "PAUSE",
        }
    }

    /// 原子存储用编码
    pub fn as_u8(&self) -> u8 {
        match self {
            EndpointState::Stop => 0,
            EndpointState::Up => 1,
            EndpointState::Down => 2,
            EndpointState::Pause => 3,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => EndpointState::Up,
            2 => EndpointState::Down,
            3 => EndpointState::Pause,
            _ => EndpointState::Stop,
        }
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 持久化的端点配置行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub uuid: String,
    pub kind: EndpointKind,
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 驱动私有配置（不透明）
    #[serde(default)]
    pub config: serde_json::Value,
}

impl EndpointConfig {
    /// 以新 UUID 构造一行配置
    pub fn new(
        kind: EndpointKind,
        type_name: impl Into<String>,
        name: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        Self {
            uuid: crate::make_uuid(kind.uuid_prefix()),
            kind,
            type_name: type_name.into(),
            name: name.into(),
            description: String::new(),
            config,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

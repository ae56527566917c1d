//! 内部通知事件。

use crate::endpoint::EndpointKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 事件级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Info,
    Warning,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Info => "INFO",
            EventType::Warning => "WARNING",
            EventType::Error => "ERROR",
        }
    }
}

/// 内部总线上的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseEvent {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub event: String,
    pub ts: i64,
    pub summary: String,
    pub info: String,
}

impl BaseEvent {
    pub fn new(
        kind: EventType,
        event: impl Into<String>,
        summary: impl Into<String>,
        info: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            event: event.into(),
            ts: crate::now_epoch_ms(),
            summary: summary.into(),
            info: info.into(),
        }
    }

    /// 看门狗观察到端点 DOWN 时推送的告警
    pub fn endpoint_down(kind: EndpointKind, uuid: &str, name: &str, err_msg: &str) -> Self {
        Self::new(
            EventType::Warning,
            format!("event.{}.down", kind),
            format!("{} DOWN", kind.label()),
            format!(
                "{}:({},{}) DOWN, supervisor try to Restart, error message: {}",
                kind.label(),
                uuid,
                name,
                err_msg
            ),
        )
    }

    pub fn endpoint_start(kind: EndpointKind, uuid: &str, name: &str) -> Self {
        Self::new(
            EventType::Info,
            format!("event.{}.start", kind),
            format!("{} START", kind.label()),
            format!("{}:({},{}) started", kind.label(), uuid, name),
        )
    }

    pub fn endpoint_stop(kind: EndpointKind, uuid: &str, name: &str) -> Self {
        Self::new(
            EventType::Info,
            format!("event.{}.stop", kind),
            format!("{} STOP", kind.label()),
            format!("{}:({},{}) stopped", kind.label(), uuid, name),
        )
    }
}

impl fmt::Display for BaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event: [{}], [{}], {}",
            self.kind.as_str(),
            self.event,
            self.info
        )
    }
}

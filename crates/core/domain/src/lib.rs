//! 网关核心领域模型。
//!
//! 所有跨组件身份均为不透明的 UUID 字符串；本 crate 只定义数据形状，
//! 不做任何 I/O。

pub mod cache;
pub mod endpoint;
pub mod event;
pub mod point;
pub mod rule;
pub mod schema;
pub mod value;

pub use cache::{CacheStatus, CacheValue};
pub use endpoint::{EndpointConfig, EndpointKind, EndpointState};
pub use event::{BaseEvent, EventType};
pub use point::{DataPoint, PointAddress};
pub use rule::{RuleAction, RuleConfig};
pub use schema::{IotProperty, IotSchema, PropertyRule, PropertyType, ReadWrite};
pub use value::{Value, ValueError, ValueKind};

/// 获取当前时间戳（毫秒）
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// 生成带前缀的实体 UUID，例如 `DEVICE3F2A91C0`。
pub fn make_uuid(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, id[..8].to_ascii_uppercase())
}

//! 缓存条目。

use crate::value::Value;
use serde::{Serialize, Serializer};

/// 条目状态（0 异常 / 1 正常）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Error = 0,
    Normal = 1,
}

impl Serialize for CacheStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// 插槽中的一条值。生产者每次写入新的结构体，读者拿到的是快照。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheValue {
    pub uuid: String,
    pub status: CacheStatus,
    pub last_fetch_time: i64,
    pub value: Value,
    pub err_msg: String,
}

impl CacheValue {
    pub fn ok(uuid: impl Into<String>, value: Value) -> Self {
        Self {
            uuid: uuid.into(),
            status: CacheStatus::Normal,
            last_fetch_time: crate::now_epoch_ms(),
            value,
            err_msg: String::new(),
        }
    }

    pub fn error(uuid: impl Into<String>, err_msg: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            status: CacheStatus::Error,
            last_fetch_time: crate::now_epoch_ms(),
            value: Value::String(String::new()),
            err_msg: err_msg.into(),
        }
    }
}

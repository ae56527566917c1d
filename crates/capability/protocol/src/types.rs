//! 驱动与引擎之间流转的类型

use async_trait::async_trait;
use domain::{CacheValue, EndpointKind, EndpointState, Value, now_epoch_ms};
use edge_cache::{DEFAULT_RULE_ENGINE_SLOT, InterCache};
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// 单个点位的一次读数
#[derive(Debug, Clone)]
pub struct PointReading {
    pub tag: String,
    /// `uuid` 为点位 UUID；读取失败时为错误条目
    pub value: CacheValue,
}

/// 驱动上报的一次样本
#[derive(Debug, Clone)]
pub struct Sample {
    pub endpoint_uuid: String,
    pub kind: EndpointKind,
    /// 设备类驱动的逐点读数，写入设备插槽
    pub readings: Vec<PointReading>,
    /// 规则输入
    pub payload: serde_json::Value,
    pub received_at_ms: i64,
}

impl Sample {
    pub fn new(endpoint_uuid: &str, kind: EndpointKind, payload: serde_json::Value) -> Self {
        Self {
            endpoint_uuid: endpoint_uuid.to_string(),
            kind,
            readings: Vec::new(),
            payload,
            received_at_ms: now_epoch_ms(),
        }
    }

    /// 由逐点读数构造，载荷为 `{tag: value}`，失败的点位不进入载荷
    pub fn from_readings(endpoint_uuid: &str, kind: EndpointKind, readings: Vec<PointReading>) -> Self {
        let mut payload = serde_json::Map::new();
        for reading in &readings {
            if reading.value.err_msg.is_empty() {
                payload.insert(reading.tag.clone(), reading.value.value.to_json());
            }
        }
        Self {
            endpoint_uuid: endpoint_uuid.to_string(),
            kind,
            readings,
            payload: serde_json::Value::Object(payload),
            received_at_ms: now_epoch_ms(),
        }
    }
}

/// 样本回调，由规则引擎实现
#[async_trait]
pub trait SampleHandler: Send + Sync {
    async fn on_sample(&self, sample: Sample);
}

/// 端点运行状态句柄
///
/// 驱动、加载器、看门狗共享同一原子状态。转为 DOWN 时把错误写进
/// `__DefaultRuleEngine` 插槽，供看门狗通知与观测接口读取。
#[derive(Clone)]
pub struct StateHandle {
    uuid: String,
    state: Arc<AtomicU8>,
    cache: Arc<InterCache>,
}

impl StateHandle {
    pub fn new(uuid: &str, cache: Arc<InterCache>) -> Self {
        Self {
            uuid: uuid.to_string(),
            state: Arc::new(AtomicU8::new(EndpointState::Stop.as_u8())),
            cache,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn get(&self) -> EndpointState {
        EndpointState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set(&self, state: EndpointState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn set_up(&self) {
        self.set(EndpointState::Up);
        let _ = self.cache.set_value(
            DEFAULT_RULE_ENGINE_SLOT,
            &self.uuid,
            CacheValue::ok(self.uuid.clone(), Value::String(EndpointState::Up.to_string())),
        );
    }

    pub fn set_down(&self, err: impl Display) {
        self.set(EndpointState::Down);
        let _ = self.cache.set_value(
            DEFAULT_RULE_ENGINE_SLOT,
            &self.uuid,
            CacheValue::error(self.uuid.clone(), err.to_string()),
        );
    }

    /// 最近一次 DOWN 时记录的错误
    pub fn last_error(&self) -> Option<String> {
        self.cache
            .get_value(DEFAULT_RULE_ENGINE_SLOT, &self.uuid)
            .map(|value| value.err_msg.clone())
            .filter(|msg| !msg.is_empty())
    }

    /// 清除健康条目（端点卸载时）
    pub fn clear(&self) {
        let _ = self.cache.delete_value(DEFAULT_RULE_ENGINE_SLOT, &self.uuid);
    }
}

//! 引擎运行参数

use std::time::Duration;

/// 看门狗节拍与退避；测试中可缩短
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub supervisor_tick: Duration,
    pub supervisor_backoff: Duration,
    pub event_queue_size: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            supervisor_tick: Duration::from_secs(5),
            supervisor_backoff: Duration::from_secs(4),
            event_queue_size: edge_notify::DEFAULT_QUEUE_SIZE,
        }
    }
}

impl EngineOptions {
    pub fn with_timing(mut self, tick: Duration, backoff: Duration) -> Self {
        self.supervisor_tick = tick;
        self.supervisor_backoff = backoff;
        self
    }
}

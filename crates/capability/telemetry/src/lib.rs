//! 追踪初始化、请求 ID 与进程级计数器。

use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    pub samples_received: u64,
    pub rule_outputs: u64,
    pub schema_rows_written: u64,
    pub schema_rows_rejected: u64,
    pub sink_delivery_success: u64,
    pub sink_delivery_failure: u64,
    pub lost_rows_appended: u64,
    pub lost_rows_drained: u64,
    pub supervisor_restarts: u64,
    pub events_pushed: u64,
    pub events_dropped: u64,
}

/// 进程级计数器。
pub struct TelemetryMetrics {
    samples_received: AtomicU64,
    rule_outputs: AtomicU64,
    schema_rows_written: AtomicU64,
    schema_rows_rejected: AtomicU64,
    sink_delivery_success: AtomicU64,
    sink_delivery_failure: AtomicU64,
    lost_rows_appended: AtomicU64,
    lost_rows_drained: AtomicU64,
    supervisor_restarts: AtomicU64,
    events_pushed: AtomicU64,
    events_dropped: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            samples_received: AtomicU64::new(0),
            rule_outputs: AtomicU64::new(0),
            schema_rows_written: AtomicU64::new(0),
            schema_rows_rejected: AtomicU64::new(0),
            sink_delivery_success: AtomicU64::new(0),
            sink_delivery_failure: AtomicU64::new(0),
            lost_rows_appended: AtomicU64::new(0),
            lost_rows_drained: AtomicU64::new(0),
            supervisor_restarts: AtomicU64::new(0),
            events_pushed: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            samples_received: self.samples_received.load(Ordering::Relaxed),
            rule_outputs: self.rule_outputs.load(Ordering::Relaxed),
            schema_rows_written: self.schema_rows_written.load(Ordering::Relaxed),
            schema_rows_rejected: self.schema_rows_rejected.load(Ordering::Relaxed),
            sink_delivery_success: self.sink_delivery_success.load(Ordering::Relaxed),
            sink_delivery_failure: self.sink_delivery_failure.load(Ordering::Relaxed),
            lost_rows_appended: self.lost_rows_appended.load(Ordering::Relaxed),
            lost_rows_drained: self.lost_rows_drained.load(Ordering::Relaxed),
            supervisor_restarts: self.supervisor_restarts.load(Ordering::Relaxed),
            events_pushed: self.events_pushed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录驱动上报的样本数。
pub fn record_sample_received() {
    metrics().samples_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录规则产出的动作数。
pub fn record_rule_output() {
    metrics().rule_outputs.fetch_add(1, Ordering::Relaxed);
}

/// 记录数据中心写入成功行数。
pub fn record_schema_row_written() {
    metrics().schema_rows_written.fetch_add(1, Ordering::Relaxed);
}

/// 记录数据中心写入校验失败次数。
pub fn record_schema_row_rejected() {
    metrics().schema_rows_rejected.fetch_add(1, Ordering::Relaxed);
}

pub fn record_sink_delivery_success() {
    metrics()
        .sink_delivery_success
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_sink_delivery_failure() {
    metrics()
        .sink_delivery_failure
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录写入丢失数据缓存的行数。
pub fn record_lost_row_appended() {
    metrics().lost_rows_appended.fetch_add(1, Ordering::Relaxed);
}

/// 记录重放成功并删除的丢失数据行数。
pub fn record_lost_row_drained() {
    metrics().lost_rows_drained.fetch_add(1, Ordering::Relaxed);
}

/// 记录看门狗触发的重载次数。
pub fn record_supervisor_restart() {
    metrics().supervisor_restarts.fetch_add(1, Ordering::Relaxed);
}

pub fn record_event_pushed() {
    metrics().events_pushed.fetch_add(1, Ordering::Relaxed);
}

/// 记录因队列已满被拒绝的事件数。
pub fn record_event_dropped() {
    metrics().events_dropped.fetch_add(1, Ordering::Relaxed);
}

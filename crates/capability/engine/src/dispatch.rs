//! 样本分发：驱动产出的样本写入端点插槽，再交给订阅它的规则

use crate::engine::RuleEngine;
use crate::error::EngineError;
use crate::evaluator::RuleOutput;
use async_trait::async_trait;
use edge_protocol::{Sample, SampleHandler};
use std::sync::Weak;
use tracing::{debug, warn};

/// 驱动持有的回调；只持有引擎的弱引用
pub(crate) struct EngineSink {
    engine: Weak<RuleEngine>,
}

impl EngineSink {
    pub(crate) fn new(engine: Weak<RuleEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl SampleHandler for EngineSink {
    async fn on_sample(&self, sample: Sample) {
        if let Some(engine) = self.engine.upgrade() {
            engine.dispatch(sample).await;
        }
    }
}

impl RuleEngine {
    /// 处理一个样本
    ///
    /// 端点插槽已注销（端点已卸载）时丢弃样本，不写缓存也不触发规则。
    pub async fn dispatch(&self, sample: Sample) {
        edge_telemetry::record_sample_received();
        let uuid = sample.endpoint_uuid.as_str();
        if !self.cache.has_slot(uuid) {
            debug!(target: "gateway.engine", uuid = %uuid, "stale_sample_dropped");
            return;
        }
        // 插槽内按点位 uuid 存放，点位改名不影响已缓存的值
        for reading in &sample.readings {
            if let Err(err) = self
                .cache
                .set_value(uuid, &reading.value.uuid, reading.value.clone())
            {
                debug!(target: "gateway.engine", uuid = %uuid, error = %err, "stale_sample_dropped");
                return;
            }
        }

        for rule in self.registry.rules_listening(uuid) {
            for output in self.evaluator.evaluate(&rule, &sample) {
                edge_telemetry::record_rule_output();
                match output {
                    RuleOutput::ToTarget { target, payload } => {
                        self.deliver_or_keep(&target, &payload).await;
                    }
                    RuleOutput::ToSchema { schema, row } => {
                        if let Err(err) = self.schemas.write(&schema, &row).await {
                            warn!(
                                target: "gateway.engine",
                                rule = %rule.uuid,
                                schema = %schema,
                                error = %err,
                                "schema_write_failed"
                            );
                        }
                    }
                }
            }
        }
    }

    /// 投递到北向目标；失败时写入该目标的丢失数据缓存
    pub async fn deliver_or_keep(&self, target: &str, payload: &str) {
        match self.deliver(target, payload).await {
            Ok(()) => edge_telemetry::record_sink_delivery_success(),
            Err(err) => {
                edge_telemetry::record_sink_delivery_failure();
                warn!(target: "gateway.engine", outend = %target, error = %err, "delivery_failed");
                match self.lost.append(target, payload).await {
                    Ok(_) => edge_telemetry::record_lost_row_appended(),
                    Err(err) => warn!(
                        target: "gateway.engine",
                        outend = %target,
                        error = %err,
                        "lost_data_append_failed"
                    ),
                }
            }
        }
    }

    async fn deliver(&self, target: &str, payload: &str) -> Result<(), EngineError> {
        let endpoint = self
            .get_outend(target)
            .ok_or_else(|| EngineError::NotFound(format!("outend not exists:{}", target)))?;
        endpoint.driver.deliver(payload).await?;
        Ok(())
    }
}

//! 看门狗
//!
//! 每个端点一个看门狗任务，按节拍检查状态。发现 DOWN 后推送
//! 端点下线事件，等待退避时间，再从配置库重新加载端点。
//! 端点已被卸载或令牌被取消时退出；重新加载会派生新的看门狗，
//! 重新加载失败且旧实例仍在注册表中时，下一个节拍继续重试。

use crate::engine::RuleEngine;
use domain::{BaseEvent, EndpointKind, EndpointState};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub(crate) fn spawn_supervisor(
    engine: Arc<RuleEngine>,
    kind: EndpointKind,
    uuid: String,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let tick = engine.options.supervisor_tick;
    let backoff = engine.options.supervisor_backoff;
    let global = engine.global.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {}
            }

            let Some(endpoint) = engine.registry.get(kind, &uuid) else {
                return;
            };
            // 注册表里可能已经是新实例，只看自己的令牌
            if cancel.is_cancelled() {
                return;
            }
            if endpoint.state() != EndpointState::Down {
                continue;
            }

            let err_msg = endpoint.err_msg();
            warn!(
                target: "gateway.supervisor",
                kind = %kind,
                uuid = %uuid,
                error = %err_msg,
                "endpoint_down"
            );
            engine.push_event(BaseEvent::endpoint_down(
                kind,
                &uuid,
                &endpoint.config.name,
                &err_msg,
            ));
            drop(endpoint);

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = global.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }

            edge_telemetry::record_supervisor_restart();
            match engine.restart(kind, &uuid).await {
                // 新实例带着自己的看门狗
                Ok(()) => return,
                Err(err) => error!(
                    target: "gateway.supervisor",
                    kind = %kind,
                    uuid = %uuid,
                    error = %err,
                    "endpoint_reload_failed"
                ),
            }
        }
    })
}

//! 端点加载与卸载
//!
//! `load_newest` 总是从配置库读取最新配置，因此重启、配置变更、看门狗重载
//! 走的是同一条路径。同一端点的加载与卸载由每个 UUID 一把的异步锁串行化；
//! 新驱动与点表都准备好之后才卸载旧实例，准备失败时旧实例保持 DOWN 留在注册表。

use crate::dispatch::EngineSink;
use crate::engine::RuleEngine;
use crate::error::EngineError;
use crate::registry::Endpoint;
use crate::supervisor::spawn_supervisor;
use domain::{BaseEvent, CacheValue, DataPoint, EndpointConfig, EndpointKind, EndpointState};
use edge_cache::DEFAULT_RULE_ENGINE_SLOT;
use edge_protocol::{Driver, DriverContext, StateHandle};
use edge_storage::LostDataCache;
use std::sync::Arc;
use tracing::{info, warn};

/// 新实例启动前需要的全部资源
struct Prepared {
    driver: Arc<dyn Driver>,
    points: Vec<DataPoint>,
    lost: Option<LostDataCache>,
}

impl RuleEngine {
    /// 按最新持久化配置（重新）加载端点
    ///
    /// 驱动启动失败不算加载失败：端点以 DOWN 状态留在注册表，由看门狗重试。
    pub async fn load_newest(&self, kind: EndpointKind, uuid: &str) -> Result<(), EngineError> {
        let lock = self.reload_lock(uuid);
        let _guard = lock.lock().await;
        self.load_newest_locked(kind, uuid).await
    }

    async fn load_newest_locked(&self, kind: EndpointKind, uuid: &str) -> Result<(), EngineError> {
        let config = self
            .stores
            .endpoints
            .find_endpoint(kind, uuid)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("{} not exists:{}", kind.as_str(), uuid)))?;
        if self.global.is_cancelled() {
            return Err(EngineError::validation("rule engine stopped"));
        }

        let prepared = match self.prepare(kind, &config).await {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(
                    target: "gateway.engine",
                    kind = %kind,
                    uuid = %uuid,
                    error = %err,
                    "endpoint_prepare_failed"
                );
                match self.registry.get(kind, uuid) {
                    Some(current) => current.state.set_down(&err),
                    None => self.record_health_error(uuid, &err.to_string()),
                }
                return Err(err);
            }
        };

        self.teardown(kind, uuid).await;

        let supervisor_cancel = self.global.child_token();
        let driver_cancel = supervisor_cancel.child_token();
        let state = StateHandle::new(uuid, self.cache.clone());
        let endpoint = Arc::new(Endpoint {
            config: config.clone(),
            state: state.clone(),
            driver: prepared.driver.clone(),
            supervisor_cancel: supervisor_cancel.clone(),
            driver_cancel: driver_cancel.clone(),
        });

        self.cache.register_slot(uuid);
        let inserted = if self.catalogue.is_singleton(kind, &config.type_name) {
            self.registry.insert_singleton(endpoint)
        } else {
            self.registry.insert(endpoint)
        };
        match inserted {
            Ok(None) => {}
            Ok(Some(replaced)) => {
                warn!(target: "gateway.engine", kind = %kind, uuid = %uuid, "endpoint_replaced");
                replaced.supervisor_cancel.cancel();
                replaced.driver.stop().await;
            }
            Err(err) => {
                self.cache.unregister_slot(uuid);
                self.record_health_error(uuid, &err.to_string());
                return Err(err);
            }
        }

        let ctx = DriverContext {
            config: config.clone(),
            points: prepared.points,
            state: state.clone(),
            cancel: driver_cancel,
            handler: Arc::new(EngineSink::new(self.me.clone())),
            lost: prepared.lost,
            events: Some(self.events.clone()),
        };
        match prepared.driver.start(ctx).await {
            Ok(()) => {
                info!(
                    target: "gateway.engine",
                    kind = %kind,
                    uuid = %uuid,
                    r#type = %config.type_name,
                    "endpoint_started"
                );
                self.push_event(BaseEvent::endpoint_start(kind, uuid, &config.name));
            }
            Err(err) => {
                warn!(
                    target: "gateway.engine",
                    kind = %kind,
                    uuid = %uuid,
                    error = %err,
                    "endpoint_start_failed"
                );
                state.set_down(&err);
            }
        }

        if let Some(engine) = self.me.upgrade() {
            spawn_supervisor(engine, kind, uuid.to_string(), supervisor_cancel);
        }
        Ok(())
    }

    /// 构造驱动并读取点表、确保丢失数据缓存表存在；不触碰运行中的实例
    async fn prepare(
        &self,
        kind: EndpointKind,
        config: &EndpointConfig,
    ) -> Result<Prepared, EngineError> {
        let driver = self.catalogue.build(config)?;
        let points = if kind == EndpointKind::Device {
            self.stores.points.list_points(&config.uuid).await?
        } else {
            Vec::new()
        };
        let lost = if kind == EndpointKind::OutEnd {
            self.lost.create_table(&config.uuid).await?;
            Some(self.lost.clone())
        } else {
            None
        };
        Ok(Prepared {
            driver,
            points,
            lost,
        })
    }

    pub async fn load_newest_inend(&self, uuid: &str) -> Result<(), EngineError> {
        self.load_newest(EndpointKind::InEnd, uuid).await
    }

    pub async fn load_newest_outend(&self, uuid: &str) -> Result<(), EngineError> {
        self.load_newest(EndpointKind::OutEnd, uuid).await
    }

    pub async fn load_newest_device(&self, uuid: &str) -> Result<(), EngineError> {
        self.load_newest(EndpointKind::Device, uuid).await
    }

    pub async fn load_newest_cecolla(&self, uuid: &str) -> Result<(), EngineError> {
        self.load_newest(EndpointKind::Cecolla, uuid).await
    }

    /// 停止并卸载运行中的实例；不存在时返回 false
    ///
    /// 调用方需持有该端点的加载锁。
    pub(crate) async fn teardown(&self, kind: EndpointKind, uuid: &str) -> bool {
        let Some(endpoint) = self.registry.get(kind, uuid) else {
            return false;
        };
        endpoint.supervisor_cancel.cancel();
        endpoint.driver.stop().await;
        endpoint.state.set(EndpointState::Stop);
        self.cache.unregister_slot(uuid);
        self.registry.remove(kind, uuid);
        info!(target: "gateway.engine", kind = %kind, uuid = %uuid, "endpoint_stopped");
        self.push_event(BaseEvent::endpoint_stop(kind, uuid, &endpoint.config.name));
        true
    }

    /// 停止后按最新配置重新加载
    pub async fn restart(&self, kind: EndpointKind, uuid: &str) -> Result<(), EngineError> {
        self.count_restart(uuid);
        info!(target: "gateway.engine", kind = %kind, uuid = %uuid, "endpoint_restarting");
        self.load_newest(kind, uuid).await
    }

    pub(crate) fn record_health_error(&self, uuid: &str, err_msg: &str) {
        let _ = self.cache.set_value(
            DEFAULT_RULE_ENGINE_SLOT,
            uuid,
            CacheValue::error(uuid.to_string(), err_msg.to_string()),
        );
    }
}

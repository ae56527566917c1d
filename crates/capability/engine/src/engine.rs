//! RuleEngine 门面
//!
//! 持有资源注册表、缓存、驱动目录与三类存储，对外提供
//! `All* / Get* / Restart* / Remove* / LoadNewest* / CheckTargetType / SnapshotDump`。
//! 配置变更一律走 “校验 -> 持久化 -> 重启”，驱动从不在运行中修改配置。

use crate::error::EngineError;
use crate::evaluator::RuleEvaluator;
use crate::options::EngineOptions;
use crate::registry::{Endpoint, ResourceRegistry, singleton_error};
use domain::{BaseEvent, EndpointConfig, EndpointKind, RuleAction, RuleConfig};
use edge_cache::InterCache;
use edge_notify::EventBus;
use edge_protocol::DriverCatalogue;
use edge_schema::SchemaPublisher;
use edge_storage::{EndpointStore, LostDataCache, PointStore, RuleStore};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 引擎依赖的配置库存储
#[derive(Clone)]
pub struct EngineStores {
    pub endpoints: Arc<dyn EndpointStore>,
    pub rules: Arc<dyn RuleStore>,
    pub points: Arc<dyn PointStore>,
}

/// 构造引擎所需的全部部件
pub struct EngineParts {
    pub stores: EngineStores,
    pub cache: Arc<InterCache>,
    pub catalogue: DriverCatalogue,
    pub lost: LostDataCache,
    pub schemas: Arc<SchemaPublisher>,
    pub events: Arc<EventBus>,
    pub evaluator: Arc<dyn RuleEvaluator>,
    pub options: EngineOptions,
    /// 全局取消令牌（进程关闭）
    pub shutdown: CancellationToken,
}

pub struct RuleEngine {
    pub(crate) registry: ResourceRegistry,
    pub(crate) cache: Arc<InterCache>,
    pub(crate) catalogue: DriverCatalogue,
    pub(crate) stores: EngineStores,
    pub(crate) lost: LostDataCache,
    pub(crate) schemas: Arc<SchemaPublisher>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) evaluator: Arc<dyn RuleEvaluator>,
    pub(crate) options: EngineOptions,
    pub(crate) global: CancellationToken,
    pub(crate) me: Weak<RuleEngine>,
    create_lock: tokio::sync::Mutex<()>,
    reload_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    restarts: Mutex<HashMap<String, u64>>,
    started_at_ms: i64,
}

fn check_name(name: &str) -> Result<(), EngineError> {
    if name.is_empty() || name.len() > 64 {
        return Err(EngineError::validation(
            "'name' length must be in the range of 1-64",
        ));
    }
    Ok(())
}

impl RuleEngine {
    pub fn new(parts: EngineParts) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            registry: ResourceRegistry::new(),
            cache: parts.cache,
            catalogue: parts.catalogue,
            stores: parts.stores,
            lost: parts.lost,
            schemas: parts.schemas,
            events: parts.events,
            evaluator: parts.evaluator,
            options: parts.options,
            global: parts.shutdown,
            me: me.clone(),
            create_lock: tokio::sync::Mutex::new(()),
            reload_locks: Mutex::new(HashMap::new()),
            restarts: Mutex::new(HashMap::new()),
            started_at_ms: domain::now_epoch_ms(),
        })
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<InterCache> {
        &self.cache
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn schemas(&self) -> &Arc<SchemaPublisher> {
        &self.schemas
    }

    pub fn lost_cache(&self) -> &LostDataCache {
        &self.lost
    }

    pub fn catalogue(&self) -> &DriverCatalogue {
        &self.catalogue
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.global.clone()
    }

    pub(crate) fn push_event(&self, event: BaseEvent) {
        if let Err(err) = self.events.push(event) {
            warn!(target: "gateway.engine", error = %err, "event_push_failed");
        }
    }

    /// 端点的加载锁：同一 UUID 的加载、卸载、删除依次执行
    pub(crate) fn reload_lock(&self, uuid: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.reload_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(uuid.to_string())
            .or_default()
            .clone()
    }

    pub(crate) fn count_restart(&self, uuid: &str) {
        if let Ok(mut restarts) = self.restarts.lock() {
            *restarts.entry(uuid.to_string()).or_insert(0) += 1;
        }
    }

    /// 端点被重启的次数（看门狗重载与配置变更都计入）
    pub fn restart_count(&self, uuid: &str) -> u64 {
        self.restarts
            .lock()
            .ok()
            .and_then(|restarts| restarts.get(uuid).copied())
            .unwrap_or(0)
    }

    // ---- 查询 ----

    pub fn all(&self, kind: EndpointKind) -> Vec<Arc<Endpoint>> {
        self.registry.all(kind)
    }

    pub fn get(&self, kind: EndpointKind, uuid: &str) -> Option<Arc<Endpoint>> {
        self.registry.get(kind, uuid)
    }

    pub fn all_inends(&self) -> Vec<Arc<Endpoint>> {
        self.all(EndpointKind::InEnd)
    }

    pub fn all_outends(&self) -> Vec<Arc<Endpoint>> {
        self.all(EndpointKind::OutEnd)
    }

    pub fn all_devices(&self) -> Vec<Arc<Endpoint>> {
        self.all(EndpointKind::Device)
    }

    pub fn all_cecollas(&self) -> Vec<Arc<Endpoint>> {
        self.all(EndpointKind::Cecolla)
    }

    pub fn all_rules(&self) -> Vec<Arc<RuleConfig>> {
        self.registry.all_rules()
    }

    pub fn get_inend(&self, uuid: &str) -> Option<Arc<Endpoint>> {
        self.get(EndpointKind::InEnd, uuid)
    }

    pub fn get_outend(&self, uuid: &str) -> Option<Arc<Endpoint>> {
        self.get(EndpointKind::OutEnd, uuid)
    }

    pub fn get_device(&self, uuid: &str) -> Option<Arc<Endpoint>> {
        self.get(EndpointKind::Device, uuid)
    }

    pub fn get_cecolla(&self, uuid: &str) -> Option<Arc<Endpoint>> {
        self.get(EndpointKind::Cecolla, uuid)
    }

    pub fn get_rule(&self, uuid: &str) -> Option<Arc<RuleConfig>> {
        self.registry.get_rule(uuid)
    }

    /// 驱动类型是否已在目录中注册
    pub fn check_target_type(&self, kind: EndpointKind, type_name: &str) -> Result<(), EngineError> {
        if self.catalogue.contains(kind, type_name) {
            Ok(())
        } else {
            Err(EngineError::validation(format!(
                "unsupported {} type:{}",
                kind.label(),
                type_name
            )))
        }
    }

    // ---- 重启 / 移除 ----

    pub async fn restart_inend(&self, uuid: &str) -> Result<(), EngineError> {
        self.restart(EndpointKind::InEnd, uuid).await
    }

    pub async fn restart_outend(&self, uuid: &str) -> Result<(), EngineError> {
        self.restart(EndpointKind::OutEnd, uuid).await
    }

    pub async fn restart_device(&self, uuid: &str) -> Result<(), EngineError> {
        self.restart(EndpointKind::Device, uuid).await
    }

    pub async fn restart_cecolla(&self, uuid: &str) -> Result<(), EngineError> {
        self.restart(EndpointKind::Cecolla, uuid).await
    }

    /// 从运行时移除端点：停止、注销插槽、清除健康条目。不删除持久化配置。
    pub async fn remove(&self, kind: EndpointKind, uuid: &str) -> bool {
        let lock = self.reload_lock(uuid);
        let _guard = lock.lock().await;
        self.remove_locked(kind, uuid).await
    }

    async fn remove_locked(&self, kind: EndpointKind, uuid: &str) -> bool {
        let existed = self.teardown(kind, uuid).await;
        let _ = self
            .cache
            .delete_value(edge_cache::DEFAULT_RULE_ENGINE_SLOT, uuid);
        existed
    }

    pub async fn remove_inend(&self, uuid: &str) -> bool {
        self.remove(EndpointKind::InEnd, uuid).await
    }

    pub async fn remove_outend(&self, uuid: &str) -> bool {
        self.remove(EndpointKind::OutEnd, uuid).await
    }

    pub async fn remove_device(&self, uuid: &str) -> bool {
        self.remove(EndpointKind::Device, uuid).await
    }

    pub async fn remove_cecolla(&self, uuid: &str) -> bool {
        self.remove(EndpointKind::Cecolla, uuid).await
    }

    // ---- 端点增删改 ----

    /// 新建端点：校验类型与名称、单例保护、持久化，
    /// 北向目标先建丢失数据缓存表，最后加载。
    pub async fn create_endpoint(
        &self,
        kind: EndpointKind,
        type_name: &str,
        name: &str,
        description: &str,
        config: serde_json::Value,
    ) -> Result<EndpointConfig, EngineError> {
        self.check_target_type(kind, type_name)?;
        check_name(name)?;

        let record = {
            let _guard = self.create_lock.lock().await;
            if self.catalogue.is_singleton(kind, type_name)
                && self.singleton_taken(kind, type_name, None).await?
            {
                return Err(singleton_error(kind));
            }
            self.check_name_free(kind, name, None).await?;
            let record =
                EndpointConfig::new(kind, type_name, name, config).with_description(description);
            self.stores.endpoints.create_endpoint(record).await?
        };
        info!(
            target: "gateway.engine",
            kind = %kind,
            uuid = %record.uuid,
            r#type = %record.type_name,
            "endpoint_created"
        );

        if kind == EndpointKind::OutEnd {
            self.lost.create_table(&record.uuid).await?;
        }
        self.load_newest(kind, &record.uuid).await?;
        Ok(record)
    }

    pub async fn create_inend(
        &self,
        type_name: &str,
        name: &str,
        description: &str,
        config: serde_json::Value,
    ) -> Result<EndpointConfig, EngineError> {
        self.create_endpoint(EndpointKind::InEnd, type_name, name, description, config)
            .await
    }

    pub async fn create_outend(
        &self,
        type_name: &str,
        name: &str,
        description: &str,
        config: serde_json::Value,
    ) -> Result<EndpointConfig, EngineError> {
        self.create_endpoint(EndpointKind::OutEnd, type_name, name, description, config)
            .await
    }

    pub async fn create_device(
        &self,
        type_name: &str,
        name: &str,
        description: &str,
        config: serde_json::Value,
    ) -> Result<EndpointConfig, EngineError> {
        self.create_endpoint(EndpointKind::Device, type_name, name, description, config)
            .await
    }

    pub async fn create_cecolla(
        &self,
        type_name: &str,
        name: &str,
        description: &str,
        config: serde_json::Value,
    ) -> Result<EndpointConfig, EngineError> {
        self.create_endpoint(EndpointKind::Cecolla, type_name, name, description, config)
            .await
    }

    /// 更新端点配置后整体重启
    pub async fn update_endpoint(&self, record: EndpointConfig) -> Result<EndpointConfig, EngineError> {
        self.check_target_type(record.kind, &record.type_name)?;
        check_name(&record.name)?;
        let kind = record.kind;
        let updated = {
            let _guard = self.create_lock.lock().await;
            if self.catalogue.is_singleton(kind, &record.type_name)
                && self
                    .singleton_taken(kind, &record.type_name, Some(&record.uuid))
                    .await?
            {
                return Err(singleton_error(kind));
            }
            self.check_name_free(kind, &record.name, Some(&record.uuid))
                .await?;
            self.stores
                .endpoints
                .update_endpoint(record)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("{} not exists", kind.as_str())))?
        };
        self.restart(kind, &updated.uuid).await?;
        Ok(updated)
    }

    /// 删除端点：被规则引用时拒绝；北向目标连带删除丢失数据缓存表，设备连带删除点表
    pub async fn delete_endpoint(&self, kind: EndpointKind, uuid: &str) -> Result<(), EngineError> {
        let rules = self.stores.rules.list_rules().await?;
        if let Some(rule) = rules.iter().find(|rule| rule.references(uuid)) {
            return Err(EngineError::validation(format!(
                "{} is bound to rule: {}",
                kind.label(),
                rule.name
            )));
        }

        // 卸载与删除配置在同一把加载锁内完成，期间的重启只能读到已删除的配置
        let lock = self.reload_lock(uuid);
        let guard = lock.lock().await;
        let was_running = self.remove_locked(kind, uuid).await;
        let deleted = self.stores.endpoints.delete_endpoint(kind, uuid).await?;
        drop(guard);
        if let Ok(mut locks) = self.reload_locks.lock() {
            locks.remove(uuid);
        }
        if !deleted && !was_running {
            return Err(EngineError::NotFound(format!(
                "{} not exists:{}",
                kind.as_str(),
                uuid
            )));
        }
        match kind {
            EndpointKind::OutEnd => self.lost.drop_table(uuid).await?,
            EndpointKind::Device => {
                self.stores.points.delete_device_points(uuid).await?;
            }
            _ => {}
        }
        info!(target: "gateway.engine", kind = %kind, uuid = %uuid, "endpoint_deleted");
        Ok(())
    }

    async fn singleton_taken(
        &self,
        kind: EndpointKind,
        type_name: &str,
        except: Option<&str>,
    ) -> Result<bool, EngineError> {
        let mut taken = false;
        self.registry.range(kind, |endpoint| {
            if endpoint.config.type_name == type_name && Some(endpoint.uuid()) != except {
                taken = true;
            }
            !taken
        });
        if taken {
            return Ok(true);
        }
        Ok(self
            .stores
            .endpoints
            .list_endpoints(kind)
            .await?
            .iter()
            .any(|record| record.type_name == type_name && Some(record.uuid.as_str()) != except))
    }

    /// 同一种类内名称不可重复
    async fn check_name_free(
        &self,
        kind: EndpointKind,
        name: &str,
        except: Option<&str>,
    ) -> Result<(), EngineError> {
        let taken = self
            .stores
            .endpoints
            .list_endpoints(kind)
            .await?
            .iter()
            .any(|record| record.name == name && Some(record.uuid.as_str()) != except);
        if taken {
            return Err(EngineError::validation(format!(
                "{} name already exists: {}",
                kind.label(),
                name
            )));
        }
        Ok(())
    }

    // ---- 规则 ----

    /// 启动时把全部规则载入注册表
    pub async fn load_rules(&self) -> Result<usize, EngineError> {
        let rules = self.stores.rules.list_rules().await?;
        let count = rules.len();
        for rule in rules {
            self.registry.insert_rule(rule);
        }
        Ok(count)
    }

    pub async fn create_rule(&self, rule: RuleConfig) -> Result<RuleConfig, EngineError> {
        self.validate_rule(&rule).await?;
        let saved = self.stores.rules.create_rule(rule).await?;
        self.registry.insert_rule(saved.clone());
        info!(target: "gateway.engine", rule = %saved.uuid, "rule_created");
        Ok(saved)
    }

    pub async fn update_rule(&self, rule: RuleConfig) -> Result<RuleConfig, EngineError> {
        self.validate_rule(&rule).await?;
        let uuid = rule.uuid.clone();
        let saved = self
            .stores
            .rules
            .update_rule(rule)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("rule not exists:{}", uuid)))?;
        self.registry.insert_rule(saved.clone());
        Ok(saved)
    }

    /// 从配置库重新载入规则
    pub async fn restart_rule(&self, uuid: &str) -> Result<(), EngineError> {
        let rule = self
            .stores
            .rules
            .find_rule(uuid)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("rule not exists:{}", uuid)))?;
        self.registry.insert_rule(rule);
        Ok(())
    }

    pub fn remove_rule(&self, uuid: &str) -> bool {
        self.registry.remove_rule(uuid).is_some()
    }

    pub async fn delete_rule(&self, uuid: &str) -> Result<(), EngineError> {
        let deleted = self.stores.rules.delete_rule(uuid).await?;
        let removed = self.remove_rule(uuid);
        if !deleted && !removed {
            return Err(EngineError::NotFound(format!("rule not exists:{}", uuid)));
        }
        Ok(())
    }

    async fn validate_rule(&self, rule: &RuleConfig) -> Result<(), EngineError> {
        check_name(&rule.name)?;
        for uuid in &rule.from_source {
            self.require_endpoint(EndpointKind::InEnd, uuid).await?;
        }
        for uuid in &rule.from_device {
            self.require_endpoint(EndpointKind::Device, uuid).await?;
        }
        for action in &rule.actions {
            match action {
                RuleAction::DataToTarget { target } => {
                    self.require_endpoint(EndpointKind::OutEnd, target).await?;
                }
                RuleAction::DataToSchema { schema, .. } => {
                    self.schemas.get_schema(schema).await?;
                }
            }
        }
        Ok(())
    }

    async fn require_endpoint(&self, kind: EndpointKind, uuid: &str) -> Result<(), EngineError> {
        self.stores
            .endpoints
            .find_endpoint(kind, uuid)
            .await?
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(format!("{} not exists:{}", kind.as_str(), uuid)))
    }

    // ---- 启动 / 快照 / 停止 ----

    /// 载入全部规则与端点；单个端点失败只记录日志
    pub async fn load_all(&self) -> Result<(), EngineError> {
        let rules = self.load_rules().await?;
        let mut loaded = 0usize;
        for kind in [
            EndpointKind::OutEnd,
            EndpointKind::Device,
            EndpointKind::InEnd,
            EndpointKind::Cecolla,
        ] {
            for record in self.stores.endpoints.list_endpoints(kind).await? {
                match self.load_newest(kind, &record.uuid).await {
                    Ok(()) => loaded += 1,
                    Err(err) => warn!(
                        target: "gateway.engine",
                        kind = %kind,
                        uuid = %record.uuid,
                        error = %err,
                        "endpoint_load_failed"
                    ),
                }
            }
        }
        info!(target: "gateway.engine", rules, endpoints = loaded, "engine_loaded");
        Ok(())
    }

    /// 当前状态的 JSON 快照
    pub fn snapshot_dump(&self) -> serde_json::Value {
        let endpoints = |kind: EndpointKind| -> Vec<serde_json::Value> {
            self.all(kind).iter().map(|endpoint| endpoint.to_json()).collect()
        };
        let rules: Vec<serde_json::Value> = self
            .all_rules()
            .iter()
            .map(|rule| serde_json::to_value(rule.as_ref()).unwrap_or_default())
            .collect();
        let restarts: BTreeMap<String, u64> = self
            .restarts
            .lock()
            .map(|restarts| restarts.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();
        let driver_types: BTreeMap<&str, Vec<String>> = EndpointKind::ALL
            .iter()
            .map(|kind| (kind.as_str(), self.catalogue.types(*kind)))
            .collect();
        let now = domain::now_epoch_ms();

        serde_json::json!({
            "rules": rules,
            "inends": endpoints(EndpointKind::InEnd),
            "outends": endpoints(EndpointKind::OutEnd),
            "devices": endpoints(EndpointKind::Device),
            "cecollas": endpoints(EndpointKind::Cecolla),
            "statistics": {
                "counters": edge_telemetry::metrics().snapshot(),
                "restarts": restarts,
            },
            "system": {
                "startedAtMs": self.started_at_ms,
                "uptimeMs": now - self.started_at_ms,
                "slots": self.cache.slot_names(),
                "cacheSize": self.cache.size(),
                "publishedProperties": self.schemas.cache().len(),
                "eventQueueCapacity": self.events.capacity(),
                "eventSubscribers": self.events.subscriber_count(),
            },
            "config": {
                "supervisorTickMs": self.options.supervisor_tick.as_millis() as u64,
                "supervisorBackoffMs": self.options.supervisor_backoff.as_millis() as u64,
                "eventQueueSize": self.options.event_queue_size,
                "driverTypes": driver_types,
            },
        })
    }

    /// 停止引擎：取消全局令牌、停止全部端点、清空注册表与缓存
    pub async fn stop(&self) {
        self.global.cancel();
        for kind in EndpointKind::ALL {
            for endpoint in self.registry.all(kind) {
                let lock = self.reload_lock(endpoint.uuid());
                let _guard = lock.lock().await;
                self.teardown(kind, endpoint.uuid()).await;
            }
        }
        self.registry.clear();
        for slot in self.cache.slot_names() {
            self.cache.unregister_slot(&slot);
        }
        self.cache.flush();
        info!(target: "gateway.engine", "engine_stopped");
    }
}

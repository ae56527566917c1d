//! ResourceRegistry：按 UUID 保存运行中的端点与已加载的规则
//!
//! 每类端点一把读写锁，读者之间互不阻塞。移除不会停止端点，
//! 调用方需要先停止再移除。

use crate::error::EngineError;
use domain::{EndpointConfig, EndpointKind, EndpointState, RuleConfig};
use edge_protocol::{Driver, StateHandle};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

/// 运行中的端点实例
pub struct Endpoint {
    pub config: EndpointConfig,
    pub state: StateHandle,
    pub driver: Arc<dyn Driver>,
    /// 看门狗级令牌；驱动级令牌是它的子令牌
    pub supervisor_cancel: CancellationToken,
    pub driver_cancel: CancellationToken,
}

impl Endpoint {
    pub fn uuid(&self) -> &str {
        &self.config.uuid
    }

    pub fn kind(&self) -> EndpointKind {
        self.config.kind
    }

    pub fn state(&self) -> EndpointState {
        self.state.get()
    }

    /// 最近一次 DOWN 的错误，正常时为空串
    pub fn err_msg(&self) -> String {
        self.state.last_error().unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uuid": self.config.uuid,
            "type": self.config.type_name,
            "name": self.config.name,
            "description": self.config.description,
            "state": self.state().as_str(),
            "errMsg": self.err_msg(),
            "config": self.config.config,
        })
    }
}

type EndpointMap = RwLock<HashMap<String, Arc<Endpoint>>>;

#[derive(Default)]
pub struct ResourceRegistry {
    inends: EndpointMap,
    outends: EndpointMap,
    devices: EndpointMap,
    cecollas: EndpointMap,
    rules: RwLock<HashMap<String, Arc<RuleConfig>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: EndpointKind) -> &EndpointMap {
        match kind {
            EndpointKind::InEnd => &self.inends,
            EndpointKind::OutEnd => &self.outends,
            EndpointKind::Device => &self.devices,
            EndpointKind::Cecolla => &self.cecollas,
        }
    }

    pub fn get(&self, kind: EndpointKind, uuid: &str) -> Option<Arc<Endpoint>> {
        self.map(kind).read().ok()?.get(uuid).cloned()
    }

    pub fn contains(&self, kind: EndpointKind, uuid: &str) -> bool {
        self.get(kind, uuid).is_some()
    }

    /// 插入端点，返回被替换的旧实例
    pub fn insert(&self, endpoint: Arc<Endpoint>) -> Result<Option<Arc<Endpoint>>, EngineError> {
        let mut map = self
            .map(endpoint.kind())
            .write()
            .map_err(|_| EngineError::validation("registry lock failed"))?;
        Ok(map.insert(endpoint.uuid().to_string(), endpoint))
    }

    /// 单例插入：在同一把写锁内检查同类型是否已存在，返回被替换的同 UUID 旧实例
    pub fn insert_singleton(
        &self,
        endpoint: Arc<Endpoint>,
    ) -> Result<Option<Arc<Endpoint>>, EngineError> {
        let mut map = self
            .map(endpoint.kind())
            .write()
            .map_err(|_| EngineError::validation("registry lock failed"))?;
        let taken = map.values().any(|other| {
            other.config.type_name == endpoint.config.type_name && other.uuid() != endpoint.uuid()
        });
        if taken {
            return Err(singleton_error(endpoint.kind()));
        }
        Ok(map.insert(endpoint.uuid().to_string(), endpoint))
    }

    pub fn remove(&self, kind: EndpointKind, uuid: &str) -> Option<Arc<Endpoint>> {
        self.map(kind).write().ok()?.remove(uuid)
    }

    /// 快照，按名称排序
    pub fn all(&self, kind: EndpointKind) -> Vec<Arc<Endpoint>> {
        let mut endpoints: Vec<Arc<Endpoint>> = self
            .map(kind)
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default();
        endpoints.sort_by(|a, b| a.config.name.cmp(&b.config.name).then(a.uuid().cmp(b.uuid())));
        endpoints
    }

    /// 在读锁内遍历，回调返回 false 时停止
    pub fn range<F>(&self, kind: EndpointKind, mut f: F)
    where
        F: FnMut(&Endpoint) -> bool,
    {
        if let Ok(map) = self.map(kind).read() {
            for endpoint in map.values() {
                if !f(endpoint) {
                    break;
                }
            }
        }
    }

    pub fn count(&self, kind: EndpointKind) -> usize {
        self.map(kind).read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn get_rule(&self, uuid: &str) -> Option<Arc<RuleConfig>> {
        self.rules.read().ok()?.get(uuid).cloned()
    }

    pub fn insert_rule(&self, rule: RuleConfig) {
        if let Ok(mut rules) = self.rules.write() {
            rules.insert(rule.uuid.clone(), Arc::new(rule));
        }
    }

    pub fn remove_rule(&self, uuid: &str) -> Option<Arc<RuleConfig>> {
        self.rules.write().ok()?.remove(uuid)
    }

    pub fn all_rules(&self) -> Vec<Arc<RuleConfig>> {
        let mut rules: Vec<Arc<RuleConfig>> = self
            .rules
            .read()
            .map(|rules| rules.values().cloned().collect())
            .unwrap_or_default();
        rules.sort_by(|a, b| a.name.cmp(&b.name).then(a.uuid.cmp(&b.uuid)));
        rules
    }

    /// 订阅该采集源 / 设备的规则
    pub fn rules_listening(&self, uuid: &str) -> Vec<Arc<RuleConfig>> {
        self.rules
            .read()
            .map(|rules| {
                rules
                    .values()
                    .filter(|rule| rule.listens_to(uuid))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 以任一方式引用该端点的第一条规则
    pub fn rule_referencing(&self, uuid: &str) -> Option<Arc<RuleConfig>> {
        self.rules
            .read()
            .ok()?
            .values()
            .find(|rule| rule.references(uuid))
            .cloned()
    }

    pub fn clear(&self) {
        for kind in EndpointKind::ALL {
            if let Ok(mut map) = self.map(kind).write() {
                map.clear();
            }
        }
        if let Ok(mut rules) = self.rules.write() {
            rules.clear();
        }
    }
}

pub(crate) fn singleton_error(kind: EndpointKind) -> EngineError {
    EngineError::validation(format!("singleton {}, can not create again", kind.label()))
}

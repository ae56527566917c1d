//! 驱动抽象与驱动目录
//!
//! 驱动只做三件事：按配置建立会话、把样本交给 [`SampleHandler`]、
//! 在失败时把状态置为 DOWN。重连、重载全部由引擎的看门狗负责，
//! 任何驱动都不支持运行中修改配置，配置变更一律停止后重新加载。

use crate::error::ProtocolError;
use crate::types::{SampleHandler, StateHandle};
use async_trait::async_trait;
use domain::{DataPoint, EndpointConfig, EndpointKind};
use edge_notify::EventBus;
use edge_storage::LostDataCache;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 驱动启动时获得的上下文
#[derive(Clone)]
pub struct DriverContext {
    pub config: EndpointConfig,
    /// 设备点表（非设备类端点为空）
    pub points: Vec<DataPoint>,
    pub state: StateHandle,
    /// 驱动级取消令牌，父令牌为看门狗级令牌
    pub cancel: CancellationToken,
    pub handler: Arc<dyn SampleHandler>,
    /// 北向目标的丢失数据缓存
    pub lost: Option<LostDataCache>,
    pub events: Option<Arc<EventBus>>,
}

impl DriverContext {
    pub fn uuid(&self) -> &str {
        &self.config.uuid
    }

    pub fn kind(&self) -> EndpointKind {
        self.config.kind
    }
}

/// 端点驱动
#[async_trait]
pub trait Driver: Send + Sync {
    /// 目录中注册的类型名
    fn type_name(&self) -> &'static str;

    /// 建立会话并派生采集任务；返回错误时端点保持 DOWN，等待看门狗重试
    async fn start(&self, ctx: DriverContext) -> Result<(), ProtocolError>;

    /// 终止会话，幂等
    async fn stop(&self);

    /// 北向投递一条载荷
    async fn deliver(&self, payload: &str) -> Result<(), ProtocolError> {
        let _ = payload;
        Err(ProtocolError::Unsupported(format!(
            "{} can not deliver data",
            self.type_name()
        )))
    }
}

/// 驱动工厂：解析配置并构造驱动实例
pub type DriverFactory =
    Arc<dyn Fn(&EndpointConfig) -> Result<Arc<dyn Driver>, ProtocolError> + Send + Sync>;

/// 驱动目录
///
/// 以 `(端点种类, 类型名)` 为键；标记为单例的类型在整个进程中最多存在一个实例。
#[derive(Clone, Default)]
pub struct DriverCatalogue {
    factories: HashMap<(EndpointKind, String), DriverFactory>,
    singletons: HashSet<(EndpointKind, String)>,
}

impl DriverCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置内置驱动的目录
    pub fn with_builtin() -> Self {
        let mut catalogue = Self::new();
        catalogue.register(
            EndpointKind::Device,
            crate::modbus_master::TYPE_NAME,
            |config| Ok(Arc::new(crate::modbus_master::ModbusMasterDriver::from_config(config)?)),
        );
        catalogue.register_singleton(
            EndpointKind::Device,
            crate::internal_event::TYPE_NAME,
            |_| Ok(Arc::new(crate::internal_event::InternalEventDriver::new())),
        );
        catalogue.register(EndpointKind::InEnd, crate::mqtt::SOURCE_TYPE_NAME, |config| {
            Ok(Arc::new(crate::mqtt::MqttSourceDriver::from_config(config)?))
        });
        catalogue.register(EndpointKind::OutEnd, crate::mqtt::TARGET_TYPE_NAME, |config| {
            Ok(Arc::new(crate::mqtt::MqttTargetDriver::from_config(config)?))
        });
        catalogue.register(
            EndpointKind::OutEnd,
            crate::tcp_transport::TYPE_NAME,
            |config| Ok(Arc::new(crate::tcp_transport::TcpTransportDriver::from_config(config)?)),
        );
        catalogue
    }

    pub fn register<F>(&mut self, kind: EndpointKind, type_name: &str, factory: F)
    where
        F: Fn(&EndpointConfig) -> Result<Arc<dyn Driver>, ProtocolError> + Send + Sync + 'static,
    {
        self.factories
            .insert((kind, type_name.to_string()), Arc::new(factory));
    }

    pub fn register_singleton<F>(&mut self, kind: EndpointKind, type_name: &str, factory: F)
    where
        F: Fn(&EndpointConfig) -> Result<Arc<dyn Driver>, ProtocolError> + Send + Sync + 'static,
    {
        self.register(kind, type_name, factory);
        self.singletons.insert((kind, type_name.to_string()));
    }

    pub fn contains(&self, kind: EndpointKind, type_name: &str) -> bool {
        self.factories.contains_key(&(kind, type_name.to_string()))
    }

    pub fn is_singleton(&self, kind: EndpointKind, type_name: &str) -> bool {
        self.singletons.contains(&(kind, type_name.to_string()))
    }

    /// 某种端点下已注册的类型名（排序）
    pub fn types(&self, kind: EndpointKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn build(&self, config: &EndpointConfig) -> Result<Arc<dyn Driver>, ProtocolError> {
        let factory = self
            .factories
            .get(&(config.kind, config.type_name.clone()))
            .ok_or_else(|| {
                ProtocolError::UnknownType(format!("{}/{}", config.kind, config.type_name))
            })?;
        factory(config)
    }
}

/// 把端点配置包解析为驱动私有配置
pub(crate) fn parse_config<T: serde::de::DeserializeOwned>(
    config: &EndpointConfig,
) -> Result<T, ProtocolError> {
    serde_json::from_value(config.config.clone())
        .map_err(|e| ProtocolError::ConfigParse(format!("{}: {}", config.type_name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalogue_covers_every_kind_but_cecolla() {
        let catalogue = DriverCatalogue::with_builtin();
        assert_eq!(
            catalogue.types(EndpointKind::Device),
            vec!["GENERIC_MODBUS_MASTER", "INTERNAL_EVENT"]
        );
        assert_eq!(catalogue.types(EndpointKind::InEnd), vec!["GENERIC_MQTT"]);
        assert_eq!(
            catalogue.types(EndpointKind::OutEnd),
            vec!["MQTT", "TCP_TRANSPORT"]
        );
        assert!(catalogue.types(EndpointKind::Cecolla).is_empty());
        assert!(catalogue.is_singleton(EndpointKind::Device, "INTERNAL_EVENT"));
        assert!(!catalogue.is_singleton(EndpointKind::Device, "GENERIC_MODBUS_MASTER"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let catalogue = DriverCatalogue::with_builtin();
        let config = EndpointConfig::new(
            EndpointKind::Device,
            "SIEMENS_PLC",
            "plc",
            serde_json::json!({}),
        );
        let err = catalogue.build(&config).err().expect("unknown");
        assert!(matches!(err, ProtocolError::UnknownType(_)));
    }
}

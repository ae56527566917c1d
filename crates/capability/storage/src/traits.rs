//! 存储接口 Trait 定义
//!
//! - EndpointStore：四类端点配置
//! - RuleStore：规则
//! - PointStore：设备点表
//! - SchemaStore：数据模型与属性，含跨配置库 / 数据中心库的发布与撤销
//! - NotifyStore：内部通知
//!
//! 所有接口返回 StorageError；使用 async_trait 支持动态分发。

use crate::error::StorageError;
use crate::models::NotifyRecord;
use async_trait::async_trait;
use domain::{DataPoint, EndpointConfig, EndpointKind, IotProperty, IotSchema, RuleConfig};

/// 端点配置存储
#[async_trait]
pub trait EndpointStore: Send + Sync {
    /// 列出某类端点（按创建顺序）
    async fn list_endpoints(&self, kind: EndpointKind)
    -> Result<Vec<EndpointConfig>, StorageError>;

    /// 查找最新配置
    async fn find_endpoint(
        &self,
        kind: EndpointKind,
        uuid: &str,
    ) -> Result<Option<EndpointConfig>, StorageError>;

    async fn create_endpoint(&self, record: EndpointConfig)
    -> Result<EndpointConfig, StorageError>;

    /// 更新；不存在时返回 None
    async fn update_endpoint(
        &self,
        record: EndpointConfig,
    ) -> Result<Option<EndpointConfig>, StorageError>;

    async fn delete_endpoint(&self, kind: EndpointKind, uuid: &str) -> Result<bool, StorageError>;
}

/// 规则存储
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list_rules(&self) -> Result<Vec<RuleConfig>, StorageError>;

    async fn find_rule(&self, uuid: &str) -> Result<Option<RuleConfig>, StorageError>;

    async fn create_rule(&self, record: RuleConfig) -> Result<RuleConfig, StorageError>;

    async fn update_rule(&self, record: RuleConfig) -> Result<Option<RuleConfig>, StorageError>;

    async fn delete_rule(&self, uuid: &str) -> Result<bool, StorageError>;
}

/// 点表存储
#[async_trait]
pub trait PointStore: Send + Sync {
    async fn list_points(&self, device_uuid: &str) -> Result<Vec<DataPoint>, StorageError>;

    /// 批量新增或更新（同一事务），返回写入后的点位
    async fn save_points(
        &self,
        device_uuid: &str,
        points: Vec<DataPoint>,
    ) -> Result<Vec<DataPoint>, StorageError>;

    /// 批量删除，返回删除行数
    async fn delete_points(&self, device_uuid: &str, uuids: &[String])
    -> Result<u64, StorageError>;

    /// 删除设备全部点位
    async fn delete_device_points(&self, device_uuid: &str) -> Result<u64, StorageError>;
}

/// 数据模型存储
#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn list_schemas(&self) -> Result<Vec<IotSchema>, StorageError>;

    async fn find_schema(&self, uuid: &str) -> Result<Option<IotSchema>, StorageError>;

    async fn create_schema(&self, record: IotSchema) -> Result<IotSchema, StorageError>;

    /// 只更新名称与描述
    async fn update_schema(&self, record: IotSchema) -> Result<Option<IotSchema>, StorageError>;

    /// 属性列表，按创建时间倒序
    async fn list_properties(&self, schema_uuid: &str) -> Result<Vec<IotProperty>, StorageError>;

    async fn find_property(&self, uuid: &str) -> Result<Option<IotProperty>, StorageError>;

    async fn create_property(&self, record: IotProperty) -> Result<IotProperty, StorageError>;

    async fn update_property(&self, record: IotProperty)
    -> Result<Option<IotProperty>, StorageError>;

    async fn delete_property(&self, uuid: &str) -> Result<bool, StorageError>;

    /// 所有已发布模型的属性（构建内存校验缓存）
    async fn published_properties(&self) -> Result<Vec<IotProperty>, StorageError>;

    /// 发布：配置库事务内置位 published，嵌套在数据中心库事务中执行 DDL；
    /// 任一失败整体回滚。已发布时返回 `Ok(false)`。
    async fn publish(&self, schema_uuid: &str, ddl: &[String]) -> Result<bool, StorageError>;

    /// 撤销发布：置位 published = false 并删除投影表
    async fn reset(&self, schema_uuid: &str) -> Result<bool, StorageError>;

    /// 删除模型；已发布时在同一事务中删除属性并删除投影表
    async fn delete_schema(&self, schema_uuid: &str) -> Result<bool, StorageError>;
}

/// 内部通知存储
#[async_trait]
pub trait NotifyStore: Send + Sync {
    async fn insert_notify(&self, record: NotifyRecord) -> Result<(), StorageError>;

    /// 最新通知在前
    async fn list_notifies(&self, limit: i64) -> Result<Vec<NotifyRecord>, StorageError>;

    /// 删除早于保留期的通知，返回删除行数
    async fn purge_notifies(&self, retention: &str) -> Result<u64, StorageError>;
}

//! # SQLite 存储实现模块
//!
//! 生产环境使用的实现，全部基于 sqlx 参数化查询。
//!
//! - **EndpointStore** (`endpoint.rs`)：`m_in_ends` / `m_out_ends` / `m_devices` / `m_cecollas`
//! - **RuleStore** (`rule.rs`)：`m_rules`，UUID 列表与动作以 JSON 列保存
//! - **PointStore** (`point.rs`)：`m_data_points`，寻址部分以 JSON 列保存
//! - **SchemaStore** (`schema.rs`)：`m_iot_schemas` / `m_iot_properties`，发布涉及数据中心库
//! - **NotifyStore** (`notify.rs`)：`m_internal_notifies`
//!
//! 表名、列名只来自常量或经过 `validation` 校验的标识符，其余一律参数绑定。

pub mod endpoint;
pub mod notify;
pub mod point;
pub mod rule;
pub mod schema;

pub use endpoint::*;
pub use notify::*;
pub use point::*;
pub use rule::*;
pub use schema::*;

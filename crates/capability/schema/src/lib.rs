//! 数据模型发布与数据中心写入
//!
//! - `validator`：按属性类型构造的校验器
//! - `cache`：已发布属性的常驻校验缓存（DataSchemaCache）
//! - `ddl`：属性列表到投影表 DDL 的降级
//! - `publisher`：模型 / 属性管理、发布、撤销、删除、校验写入
//! - `cron`：投影表保留期清理

pub mod cache;
pub mod cron;
pub mod ddl;
pub mod error;
pub mod publisher;
pub mod validator;

pub use cache::*;
pub use cron::*;
pub use ddl::*;
pub use error::*;
pub use publisher::*;
pub use validator::*;

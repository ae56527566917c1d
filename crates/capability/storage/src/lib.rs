//! # 网关存储模块
//!
//! 三个嵌入式 SQLite 库上的存储抽象与实现。
//!
//! ## 分层
//!
//! 1. **接口抽象层** (`traits.rs`)：配置库各资源的异步 Trait
//! 2. **数据模型层** (`models.rs`)：只在持久化边界出现的结构
//! 3. **错误处理层** (`error.rs`)：统一的 `StorageError`
//! 4. **标识符校验** (`validation.rs`)：允许拼进 SQL 的表名 / 列名
//! 5. **连接管理层** (`connection.rs`)：三个连接池、配置库建表、滚动窗口触发器
//! 6. **实现层**：
//!    - `sqlite/`：配置库实现（端点、规则、点表、数据模型、通知）
//!    - `datacenter.rs`：数据中心投影表读写
//!    - `lostcache.rs`：北向目标的丢失数据缓存
//!    - `in_memory/`：端点、规则、点表的内存实现（测试用）
//!
//! ## 事务边界
//!
//! 每个库各自一个连接池；跨库只有数据模型发布 / 撤销 / 删除会同时
//! 打开两个事务，内层失败时外层一起回滚。

pub mod connection;
pub mod datacenter;
pub mod error;
pub mod in_memory;
pub mod lostcache;
pub mod models;
pub mod sqlite;
pub mod traits;
pub mod validation;

pub use connection::*;
pub use datacenter::*;
pub use error::*;
pub use in_memory::*;
pub use lostcache::*;
pub use models::*;
pub use sqlite::*;
pub use traits::*;
pub use validation::*;

//! 规则引擎能力模块
//!
//! - [`RuleEngine`]：资源注册表之上的门面，负责端点的加载、重启、移除，
//!   规则维护与状态快照；
//! - 加载器（`loader`）：按最新持久化配置构造驱动，失败时端点以 DOWN 留存；
//! - 看门狗（`supervisor`）：发现 DOWN 后退避并重新加载；
//! - 分发（`dispatch`）：样本写入端点插槽，再按规则投递到北向目标或数据模型，
//!   投递失败写入丢失数据缓存；
//! - 点表（`points`）：按设备类型校验、整批落库、重启设备；
//! - [`Runtime`]：三个 SQLite 库上的完整装配与后台清理任务。

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod loader;
pub mod options;
pub mod points;
pub mod registry;
pub mod runtime;
pub mod supervisor;
pub mod validator;

pub use engine::{EngineParts, EngineStores, RuleEngine};
pub use error::EngineError;
pub use evaluator::{ActionEvaluator, RuleEvaluator, RuleOutput};
pub use options::EngineOptions;
pub use registry::{Endpoint, ResourceRegistry};
pub use runtime::Runtime;
pub use validator::PointValidator;

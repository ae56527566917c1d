//! 内存存储实现模块
//!
//! 用于测试和无盘演示。包含：
//! - EndpointStore: InMemoryEndpointStore
//! - RuleStore: InMemoryRuleStore
//! - PointStore: InMemoryPointStore

pub mod endpoint;
pub mod point;
pub mod rule;

pub use endpoint::*;
pub use point::*;
pub use rule::*;

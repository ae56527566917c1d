//! 内部事件总线
//!
//! - `EventBus`：有界队列，满时拒绝推送；
//! - 事件泵：把事件扇出给订阅者，并写入配置库 `m_internal_notifies`；
//! - 清理任务：按保留期删除旧通知。

pub mod bus;
pub mod cron;
pub mod error;

pub use bus::*;
pub use cron::*;
pub use error::*;

//! 驱动能力模块
//!
//! 定义引擎与驱动之间的契约：
//! - [`Driver`]：启动、停止、北向投递；
//! - [`DriverContext`]：驱动启动时获得的配置、点表、状态句柄与取消令牌；
//! - [`DriverCatalogue`]：`(端点种类, 类型名)` 到驱动工厂的映射，可标记单例；
//! - [`SampleHandler`]：驱动产出样本后的回调，由规则引擎实现。
//!
//! 内置驱动：
//! - `GENERIC_MODBUS_MASTER`（设备）：tokio-modbus TCP 主站；
//! - `INTERNAL_EVENT`（设备，单例）：转发内部事件；
//! - `GENERIC_MQTT`（采集源）/ `MQTT`（北向目标）：rumqttc；
//! - `TCP_TRANSPORT`（北向目标）：按分隔符成帧的 TCP 客户端。
//!
//! 北向目标在（重新）连接后按最旧优先回放丢失数据缓存。

pub mod driver;
pub mod error;
pub mod internal_event;
pub mod lost;
pub mod modbus_master;
pub mod mqtt;
pub mod tcp_transport;
pub mod types;

pub use driver::{Driver, DriverCatalogue, DriverContext, DriverFactory};
pub use error::ProtocolError;
pub use internal_event::InternalEventDriver;
pub use lost::drain_lost_data;
pub use modbus_master::{ModbusMasterConfig, ModbusMasterDriver, decode_registers};
pub use mqtt::{MqttConfig, MqttSourceDriver, MqttTargetDriver};
pub use tcp_transport::{TcpTransportConfig, TcpTransportDriver};
pub use types::{PointReading, Sample, SampleHandler, StateHandle};

//! 驱动错误类型定义

/// 驱动错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 连接错误
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Modbus 错误
    #[error("modbus error: {0}")]
    Modbus(String),

    /// MQTT 错误
    #[error("mqtt error: {0}")]
    Mqtt(String),

    /// 配置解析错误
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// 数据解析错误
    #[error("data parse error: {0}")]
    DataParse(String),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 驱动不支持该操作
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// 目录中没有该类型
    #[error("unsupported driver type: {0}")]
    UnknownType(String),

    /// 丢失数据缓存读写失败
    #[error("lost data cache: {0}")]
    LostCache(String),
}

impl From<edge_storage::StorageError> for ProtocolError {
    fn from(err: edge_storage::StorageError) -> Self {
        Self::LostCache(err.to_string())
    }
}

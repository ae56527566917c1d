//! 引擎错误类型
//!
//! `Validation` 对应调用方可直接呈现的输入错误（HTTP 400），
//! 包括不变量冲突与未注册的驱动类型。

use edge_cache::CacheError;
use edge_notify::NotifyError;
use edge_protocol::ProtocolError;
use edge_schema::SchemaError;
use edge_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("driver error: {0}")]
    Driver(#[from] ProtocolError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("event bus error: {0}")]
    Notify(#[from] NotifyError),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

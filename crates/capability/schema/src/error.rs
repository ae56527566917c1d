use edge_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// 输入不合法或违反模型约束
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    /// 写入值未通过属性校验
    #[error("property '{property}': {message}")]
    InvalidValue { property: String, message: String },
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

impl SchemaError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

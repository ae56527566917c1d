/// 事件总线错误
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("attached max queue size, max size is:{capacity}")]
    QueueFull { capacity: usize },
    #[error("event bus closed")]
    Closed,
    #[error("event pump already started")]
    PumpStarted,
}

use crate::error::NotifyError;
use domain::{BaseEvent, make_uuid};
use edge_storage::{NotifyRecord, NotifyStore};
use edge_telemetry::{record_event_dropped, record_event_pushed};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 默认队列容量
pub const DEFAULT_QUEUE_SIZE: usize = 1024;

/// 不落库的事件前缀（通信模块的上行数据）
const UNPERSISTED_PREFIX: &str = "transceiver.upstream.data";

pub struct EventBus {
    sender: mpsc::Sender<BaseEvent>,
    receiver: Mutex<Option<mpsc::Receiver<BaseEvent>>>,
    capacity: usize,
    subscribers: RwLock<HashMap<String, mpsc::Sender<BaseEvent>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Arc::new(Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            capacity,
            subscribers: RwLock::new(HashMap::new()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 非阻塞推送；队列已满时返回错误，事件被丢弃
    pub fn push(&self, event: BaseEvent) -> Result<(), NotifyError> {
        match self.sender.try_send(event) {
            Ok(()) => {
                record_event_pushed();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                record_event_dropped();
                warn!(target: "gateway.notify", event = %event.event, capacity = self.capacity, "event_queue_full");
                Err(NotifyError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(NotifyError::Closed),
        }
    }

    /// 注册订阅者；同名订阅者已存在时替换
    pub fn subscribe(&self, id: &str, buffer: usize) -> mpsc::Receiver<BaseEvent> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        if let Ok(mut subscribers) = self.subscribers.write() {
            subscribers.insert(id.to_string(), tx);
        }
        rx
    }

    /// 取消订阅；订阅者的接收端随之关闭
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.subscribers
            .write()
            .map(|mut subscribers| subscribers.remove(id).is_some())
            .unwrap_or(false)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }

    fn fan_out(&self, event: &BaseEvent) {
        let Ok(subscribers) = self.subscribers.read() else {
            return;
        };
        for (id, tx) in subscribers.iter() {
            if tx.try_send(event.clone()).is_err() {
                debug!(target: "gateway.notify", subscriber = %id, event = %event.event, "subscriber_lagging");
            }
        }
    }

    /// 启动事件泵。只能启动一次。
    pub fn spawn_pump(
        self: &Arc<Self>,
        store: Option<Arc<dyn NotifyStore>>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, NotifyError> {
        let mut receiver = self
            .receiver
            .lock()
            .map_err(|_| NotifyError::Closed)?
            .take()
            .ok_or(NotifyError::PumpStarted)?;
        let bus = Arc::clone(self);
        Ok(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = receiver.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                bus.fan_out(&event);
                if event.event.starts_with(UNPERSISTED_PREFIX) {
                    continue;
                }
                if let Some(store) = store.as_ref() {
                    if let Err(err) = store.insert_notify(notify_record(&event)).await {
                        warn!(target: "gateway.notify", event = %event.event, error = %err, "notify_persist_failed");
                    }
                }
            }
        }))
    }
}

fn notify_record(event: &BaseEvent) -> NotifyRecord {
    NotifyRecord {
        id: 0,
        uuid: make_uuid("NOTIFY"),
        kind: event.kind.as_str().to_string(),
        status: 1,
        event: event.event.clone(),
        ts: event.ts,
        summary: format!("Internal Event: {}", event.event),
        info: event.to_string(),
        created_at: String::new(),
    }
}

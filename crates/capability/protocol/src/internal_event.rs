//! 内部事件设备：把内部总线上的事件作为样本转发给规则
//!
//! 整个进程只允许一个实例。

use crate::driver::{Driver, DriverContext};
use crate::error::ProtocolError;
use crate::types::Sample;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const TYPE_NAME: &str = "INTERNAL_EVENT";

/// 订阅缓冲
const SUBSCRIBE_BUFFER: usize = 256;

#[derive(Default)]
pub struct InternalEventDriver {
    session: Mutex<Option<(String, CancellationToken)>>,
}

impl InternalEventDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Driver for InternalEventDriver {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn start(&self, ctx: DriverContext) -> Result<(), ProtocolError> {
        let bus = ctx.events.clone().ok_or_else(|| {
            ProtocolError::ConfigParse("internal event bus unavailable".to_string())
        })?;
        let mut events = bus.subscribe(ctx.uuid(), SUBSCRIBE_BUFFER);
        if let Ok(mut guard) = self.session.lock() {
            *guard = Some((ctx.uuid().to_string(), ctx.cancel.clone()));
        }
        ctx.state.set_up();
        info!(target: "gateway.protocol", device = %ctx.uuid(), "internal_event_started");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => {
                            let payload = serde_json::to_value(&event).unwrap_or_default();
                            ctx.handler.on_sample(Sample::new(ctx.uuid(), ctx.kind(), payload)).await;
                        }
                        None => {
                            ctx.state.set_down("internal event bus closed");
                            break;
                        }
                    }
                }
            }
            bus.unsubscribe(ctx.uuid());
        });
        Ok(())
    }

    async fn stop(&self) {
        let session = self.session.lock().ok().and_then(|mut guard| guard.take());
        if let Some((_, cancel)) = session {
            cancel.cancel();
        }
    }
}

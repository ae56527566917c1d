//! TCP 透传北向目标
//!
//! 主动连接对端，每条载荷追加分隔符后写出。对端关闭或写失败时置为 DOWN，
//! 由看门狗整体重载。

use crate::driver::{Driver, DriverContext, parse_config};
use crate::error::ProtocolError;
use crate::lost::drain_lost_data;
use crate::types::StateHandle;
use async_trait::async_trait;
use domain::EndpointConfig;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const TYPE_NAME: &str = "TCP_TRANSPORT";

/// TCP 透传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpTransportConfig {
    /// 对端主机地址
    pub host: String,
    /// 对端端口
    pub port: u16,
    /// 连接超时（毫秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// 写超时（毫秒）
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
    /// 帧分隔符
    #[serde(default = "default_delimiter")]
    pub frame_delimiter: String,
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_write_timeout() -> u64 {
    3000
}

fn default_delimiter() -> String {
    "\n".to_string()
}

type SharedWriter = Arc<tokio::sync::Mutex<Option<OwnedWriteHalf>>>;

/// TCP 透传目标
pub struct TcpTransportDriver {
    config: TcpTransportConfig,
    writer: SharedWriter,
    session: Mutex<Option<(StateHandle, CancellationToken)>>,
}

impl TcpTransportDriver {
    pub fn new(config: TcpTransportConfig) -> Self {
        Self {
            config,
            writer: Arc::new(tokio::sync::Mutex::new(None)),
            session: Mutex::new(None),
        }
    }

    pub fn from_config(config: &EndpointConfig) -> Result<Self, ProtocolError> {
        Ok(Self::new(parse_config(config)?))
    }

    fn state(&self) -> Option<StateHandle> {
        self.session
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|(state, _)| state.clone()))
    }
}

/// 写出一帧；失败时丢弃写端
async fn write_frame(
    writer: &SharedWriter,
    payload: &str,
    delimiter: &str,
    write_timeout: Duration,
) -> Result<(), ProtocolError> {
    let mut guard = writer.lock().await;
    let half = guard
        .as_mut()
        .ok_or_else(|| ProtocolError::Connection("tcp transport not connected".to_string()))?;
    let mut frame = String::with_capacity(payload.len() + delimiter.len());
    frame.push_str(payload);
    frame.push_str(delimiter);

    let result = match timeout(write_timeout, half.write_all(frame.as_bytes())).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(ProtocolError::Io(err)),
        Err(_) => Err(ProtocolError::Timeout("tcp write".to_string())),
    };
    if result.is_err() {
        *guard = None;
    }
    result
}

#[async_trait]
impl Driver for TcpTransportDriver {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn start(&self, ctx: DriverContext) -> Result<(), ProtocolError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let stream = match timeout(connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ProtocolError::Connection(format!("{}: {}", addr, e))),
            Err(_) => return Err(ProtocolError::Timeout(format!("connect {}", addr))),
        };
        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        if let Ok(mut guard) = self.session.lock() {
            *guard = Some((ctx.state.clone(), ctx.cancel.clone()));
        }
        ctx.state.set_up();
        info!(target: "gateway.protocol", outend = %ctx.uuid(), addr = %addr, "tcp_transport_started");

        // 对端下发的内容只记日志；读到 EOF 说明连接已断开
        let writer = self.writer.clone();
        let reader_ctx = ctx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                tokio::select! {
                    _ = reader_ctx.cancel.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            debug!(target: "gateway.protocol", outend = %reader_ctx.uuid(), len = line.len(), "tcp_transport_peer_data");
                        }
                        Ok(None) => {
                            writer.lock().await.take();
                            reader_ctx.state.set_down(ProtocolError::Connection(format!("{} closed by peer", addr)));
                            break;
                        }
                        Err(err) => {
                            writer.lock().await.take();
                            reader_ctx.state.set_down(ProtocolError::Io(err));
                            break;
                        }
                    }
                }
            }
        });

        if let Some(lost) = ctx.lost.clone() {
            let writer = self.writer.clone();
            let delimiter = self.config.frame_delimiter.clone();
            let write_timeout = Duration::from_millis(self.config.write_timeout_ms);
            let uuid = ctx.uuid().to_string();
            tokio::spawn(async move {
                let result = drain_lost_data(&lost, &uuid, |data| {
                    let writer = writer.clone();
                    let delimiter = delimiter.clone();
                    async move { write_frame(&writer, &data, &delimiter, write_timeout).await }
                })
                .await;
                if let Err(err) = result {
                    warn!(target: "gateway.protocol", outend = %uuid, error = %err, "lost_data_drain_failed");
                }
            });
        }
        Ok(())
    }

    async fn stop(&self) {
        let session = self.session.lock().ok().and_then(|mut guard| guard.take());
        if let Some((_, cancel)) = session {
            cancel.cancel();
        }
        if let Some(mut half) = self.writer.lock().await.take() {
            let _ = half.shutdown().await;
        }
    }

    async fn deliver(&self, payload: &str) -> Result<(), ProtocolError> {
        let write_timeout = Duration::from_millis(self.config.write_timeout_ms);
        let result = write_frame(&self.writer, payload, &self.config.frame_delimiter, write_timeout).await;
        if let Err(err) = &result {
            if let Some(state) = self.state() {
                if matches!(err, ProtocolError::Io(_) | ProtocolError::Timeout(_)) {
                    state.set_down(err);
                }
            }
        }
        result
    }
}

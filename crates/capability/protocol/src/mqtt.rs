//! MQTT 采集源与 MQTT 北向目标
//!
//! 两者都持有一个 rumqttc 会话，事件循环在独立任务中轮询；
//! 事件循环报错即置为 DOWN 并退出，不在原地重连。

use crate::driver::{Driver, DriverContext, parse_config};
use crate::error::ProtocolError;
use crate::lost::drain_lost_data;
use crate::types::{Sample, StateHandle};
use async_trait::async_trait;
use domain::EndpointConfig;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const SOURCE_TYPE_NAME: &str = "GENERIC_MQTT";
pub const TARGET_TYPE_NAME: &str = "MQTT";

/// MQTT 会话配置（采集源与目标共用）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// 采集源订阅 / 目标发布的主题
    pub topic: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    30
}

impl MqttConfig {
    fn validate(&self) -> Result<(), ProtocolError> {
        if self.host.trim().is_empty() {
            return Err(ProtocolError::ConfigParse("mqtt host is empty".to_string()));
        }
        if self.topic.trim().is_empty() {
            return Err(ProtocolError::ConfigParse("mqtt topic is empty".to_string()));
        }
        Ok(())
    }

    fn session(&self, endpoint_uuid: &str) -> (AsyncClient, EventLoop) {
        let client_id = self
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("gateway-{}", endpoint_uuid));
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs.max(5)));
        if let (Some(username), Some(password)) = (self.username.as_ref(), self.password.as_ref()) {
            options.set_credentials(username, password);
        }
        AsyncClient::new(options, 10)
    }
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// 载荷为 JSON 时按 JSON 解析，否则作为字符串
fn payload_to_json(payload: &[u8]) -> serde_json::Value {
    serde_json::from_slice(payload).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(payload).into_owned())
    })
}

fn take_token(slot: &Mutex<Option<CancellationToken>>) -> Option<CancellationToken> {
    slot.lock().ok().and_then(|mut guard| guard.take())
}

/// MQTT 采集源：订阅主题，每条消息作为一个样本
pub struct MqttSourceDriver {
    config: MqttConfig,
    cancel: Mutex<Option<CancellationToken>>,
}

impl MqttSourceDriver {
    pub fn new(config: MqttConfig) -> Result<Self, ProtocolError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: Mutex::new(None),
        })
    }

    pub fn from_config(config: &EndpointConfig) -> Result<Self, ProtocolError> {
        Self::new(parse_config(config)?)
    }
}

#[async_trait]
impl Driver for MqttSourceDriver {
    fn type_name(&self) -> &'static str {
        SOURCE_TYPE_NAME
    }

    async fn start(&self, ctx: DriverContext) -> Result<(), ProtocolError> {
        let (client, mut eventloop) = self.config.session(ctx.uuid());
        client
            .subscribe(self.config.topic.clone(), qos_from_u8(self.config.qos))
            .await
            .map_err(|err| ProtocolError::Mqtt(err.to_string()))?;

        if let Ok(mut guard) = self.cancel.lock() {
            *guard = Some(ctx.cancel.clone());
        }
        ctx.state.set_up();
        info!(
            target: "gateway.protocol",
            inend = %ctx.uuid(),
            topic = %self.config.topic,
            "mqtt_source_started"
        );

        tokio::spawn(async move {
            // 会话随任务结束而释放
            let _client = client;
            loop {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let mut sample =
                                Sample::new(ctx.uuid(), ctx.kind(), payload_to_json(&publish.payload));
                            if let serde_json::Value::Object(map) = &mut sample.payload {
                                map.entry("topic")
                                    .or_insert_with(|| serde_json::Value::String(publish.topic.clone()));
                            }
                            ctx.handler.on_sample(sample).await;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            ctx.state.set_down(ProtocolError::Mqtt(err.to_string()));
                            break;
                        }
                    }
                }
            }
        });
        Ok(())
    }

    async fn stop(&self) {
        if let Some(token) = take_token(&self.cancel) {
            token.cancel();
        }
    }
}

/// 未收到回执时放弃本轮回放的等待上限
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// 发布回执计数
///
/// 发布在锁内入队并领取序号；代理按接收顺序回 PUBACK（QoS 1）或 PUBCOMP（QoS 2），
/// 回执数不小于序号即表示该条已被代理确认。
struct AckTracker {
    sent: tokio::sync::Mutex<u64>,
    acked: watch::Sender<u64>,
}

impl AckTracker {
    fn new() -> Self {
        let (acked, _) = watch::channel(0);
        Self {
            sent: tokio::sync::Mutex::new(0),
            acked,
        }
    }

    async fn publish<F, Fut>(&self, send: F) -> Result<u64, ProtocolError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ProtocolError>>,
    {
        let mut sent = self.sent.lock().await;
        send().await?;
        *sent += 1;
        Ok(*sent)
    }

    fn ack(&self) {
        self.acked.send_modify(|count| *count += 1);
    }

    async fn wait_acked(&self, ticket: u64, limit: Duration) -> Result<(), ProtocolError> {
        let mut rx = self.acked.subscribe();
        match timeout(limit, rx.wait_for(|count| *count >= ticket)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ProtocolError::Mqtt("mqtt session closed".to_string())),
            Err(_) => Err(ProtocolError::Timeout(format!("mqtt ack #{}", ticket))),
        }
    }
}

/// 发布一条并按 QoS 决定是否等待代理确认
///
/// QoS 0 没有回执，入队即视为送达（至多一次）；QoS 1/2 必须等到回执，
/// 回放据此决定能否删除缓存行。
async fn publish_confirmed<F, Fut>(
    acks: &AckTracker,
    qos: QoS,
    limit: Duration,
    send: F,
) -> Result<(), ProtocolError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), ProtocolError>>,
{
    let ticket = acks.publish(send).await?;
    if qos == QoS::AtMostOnce {
        return Ok(());
    }
    acks.wait_acked(ticket, limit).await
}

struct TargetSession {
    client: AsyncClient,
    acks: Arc<AckTracker>,
    state: StateHandle,
    cancel: CancellationToken,
}

/// MQTT 北向目标：把载荷发布到固定主题
pub struct MqttTargetDriver {
    config: MqttConfig,
    session: Mutex<Option<TargetSession>>,
    connected: Arc<AtomicBool>,
}

impl MqttTargetDriver {
    pub fn new(config: MqttConfig) -> Result<Self, ProtocolError> {
        config.validate()?;
        Ok(Self {
            config,
            session: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn from_config(config: &EndpointConfig) -> Result<Self, ProtocolError> {
        Self::new(parse_config(config)?)
    }

    fn client(&self) -> Option<(AsyncClient, Arc<AckTracker>)> {
        self.session.lock().ok().and_then(|guard| {
            guard
                .as_ref()
                .map(|session| (session.client.clone(), session.acks.clone()))
        })
    }
}

#[async_trait]
impl Driver for MqttTargetDriver {
    fn type_name(&self) -> &'static str {
        TARGET_TYPE_NAME
    }

    async fn start(&self, ctx: DriverContext) -> Result<(), ProtocolError> {
        let (client, mut eventloop) = self.config.session(ctx.uuid());
        let acks = Arc::new(AckTracker::new());
        if let Ok(mut guard) = self.session.lock() {
            *guard = Some(TargetSession {
                client: client.clone(),
                acks: acks.clone(),
                state: ctx.state.clone(),
                cancel: ctx.cancel.clone(),
            });
        }
        ctx.state.set_up();
        info!(
            target: "gateway.protocol",
            outend = %ctx.uuid(),
            topic = %self.config.topic,
            qos = self.config.qos,
            "mqtt_target_started"
        );

        let connected = self.connected.clone();
        let topic = self.config.topic.clone();
        let qos = qos_from_u8(self.config.qos);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            connected.store(true, Ordering::Release);
                            debug!(target: "gateway.protocol", outend = %ctx.uuid(), "mqtt_target_connected");
                            if let Some(lost) = ctx.lost.clone() {
                                // 回放时事件循环必须继续轮询，否则请求通道会被占满，回执也无法到达
                                let client = client.clone();
                                let acks = acks.clone();
                                let topic = topic.clone();
                                let uuid = ctx.uuid().to_string();
                                let cancel = ctx.cancel.clone();
                                tokio::spawn(async move {
                                    let drain = drain_lost_data(&lost, &uuid, |data| {
                                        let client = client.clone();
                                        let acks = acks.clone();
                                        let topic = topic.clone();
                                        async move {
                                            publish_confirmed(&acks, qos, ACK_TIMEOUT, || async move {
                                                client
                                                    .publish(topic, qos, false, data.into_bytes())
                                                    .await
                                                    .map_err(|err| ProtocolError::Mqtt(err.to_string()))
                                            })
                                            .await
                                        }
                                    });
                                    let result = tokio::select! {
                                        _ = cancel.cancelled() => return,
                                        result = drain => result,
                                    };
                                    if let Err(err) = result {
                                        warn!(target: "gateway.protocol", outend = %uuid, error = %err, "lost_data_drain_failed");
                                    }
                                });
                            }
                        }
                        Ok(Event::Incoming(Packet::PubAck(_) | Packet::PubComp(_))) => acks.ack(),
                        Ok(_) => {}
                        Err(err) => {
                            connected.store(false, Ordering::Release);
                            ctx.state.set_down(ProtocolError::Mqtt(err.to_string()));
                            break;
                        }
                    }
                }
            }
        });
        Ok(())
    }

    async fn stop(&self) {
        self.connected.store(false, Ordering::Release);
        let session = self.session.lock().ok().and_then(|mut guard| guard.take());
        if let Some(session) = session {
            session.cancel.cancel();
            let _ = session.client.try_disconnect();
            debug!(target: "gateway.protocol", outend = %session.state.uuid(), "mqtt_target_stopped");
        }
    }

    async fn deliver(&self, payload: &str) -> Result<(), ProtocolError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ProtocolError::Connection(format!(
                "mqtt broker {}:{} not connected",
                self.config.host, self.config.port
            )));
        }
        let (client, acks) = self
            .client()
            .ok_or_else(|| ProtocolError::Connection("mqtt target not started".to_string()))?;
        let topic = self.config.topic.clone();
        let qos = qos_from_u8(self.config.qos);
        let payload = payload.as_bytes().to_vec();
        // 实时投递不等待回执，但必须领取序号，保证回放的计数与代理回执对齐
        acks.publish(|| async move {
            client
                .publish(topic, qos, false, payload)
                .await
                .map_err(|err| ProtocolError::Mqtt(err.to_string()))
        })
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_validation() {
        let config: MqttConfig =
            serde_json::from_value(serde_json::json!({"host": "127.0.0.1", "topic": "up"}))
                .expect("config");
        assert_eq!(config.port, 1883);
        assert_eq!(config.qos, 0);
        assert!(config.validate().is_ok());

        let empty = MqttConfig {
            topic: " ".to_string(),
            ..config
        };
        assert!(matches!(empty.validate(), Err(ProtocolError::ConfigParse(_))));
    }

    #[tokio::test]
    async fn confirmed_publish_waits_for_broker_ack() {
        let acks = Arc::new(AckTracker::new());
        let limit = Duration::from_millis(50);

        let err = publish_confirmed(&acks, QoS::AtLeastOnce, limit, || async { Ok(()) })
            .await
            .expect_err("no ack yet");
        assert!(matches!(err, ProtocolError::Timeout(_)));

        // 第一条的回执到达前第二条也不能算确认
        acks.ack();
        let waiter = {
            let acks = acks.clone();
            tokio::spawn(async move {
                publish_confirmed(&acks, QoS::AtLeastOnce, Duration::from_secs(5), || async {
                    Ok(())
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        acks.ack();
        waiter.await.expect("join").expect("second acked");

        publish_confirmed(&acks, QoS::AtMostOnce, limit, || async { Ok(()) })
            .await
            .expect("qos 0 needs no ack");
    }

    #[tokio::test]
    async fn unacknowledged_replay_keeps_lost_rows() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let pool = edge_storage::connect_sqlite(&dir.path().join("lostcache.db"))
            .await
            .expect("pool");
        let lost = edge_storage::LostDataCache::new(pool);
        lost.create_table("out-1").await.expect("create");
        lost.append("out-1", "a").await.expect("append");
        lost.append("out-1", "b").await.expect("append");

        let acks = AckTracker::new();
        let limit = Duration::from_millis(50);
        let drained = drain_lost_data(&lost, "out-1", |_| {
            publish_confirmed(&acks, QoS::AtLeastOnce, limit, || async { Ok(()) })
        })
        .await
        .expect("drain");
        assert_eq!(drained, 0);
        assert_eq!(lost.count("out-1").await.expect("count"), 2);

        acks.ack();
        acks.ack();
        acks.ack();
        let drained = drain_lost_data(&lost, "out-1", |_| {
            publish_confirmed(&acks, QoS::AtLeastOnce, limit, || async { Ok(()) })
        })
        .await
        .expect("drain");
        assert_eq!(drained, 2);
        assert_eq!(lost.count("out-1").await.expect("count"), 0);
    }

    #[test]
    fn payload_falls_back_to_text() {
        assert_eq!(
            payload_to_json(br#"{"temp": 21}"#),
            serde_json::json!({"temp": 21})
        );
        assert_eq!(
            payload_to_json(b"plain"),
            serde_json::Value::String("plain".to_string())
        );
    }
}

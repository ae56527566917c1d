//! Modbus TCP 主站驱动
//!
//! 一个设备一个会话、一个轮询任务：各点位按自身周期到期后读取，
//! 同一轮到期的点位合并为一个样本上报，保证设备内样本单调有序。
//! 连接或传输失败时置为 DOWN 并退出，由看门狗整体重载；
//! 异常码与解码失败只影响对应点位。

use crate::driver::{Driver, DriverContext, parse_config};
use crate::error::ProtocolError;
use crate::types::{PointReading, Sample};
use async_trait::async_trait;
use domain::{CacheValue, DataPoint, EndpointConfig, PointAddress, Value};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_modbus::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const TYPE_NAME: &str = "GENERIC_MODBUS_MASTER";

/// 未配置采集周期时的默认值（毫秒）
const DEFAULT_FREQUENCY_MS: u64 = 1000;

/// Modbus TCP 主站配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModbusMasterConfig {
    /// 从设备主机地址
    pub host: String,
    /// 从设备端口（默认 502）
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    /// 连接超时（毫秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// 读取超时（毫秒）
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_read_timeout() -> u64 {
    3000
}

/// 单个点位的轮询任务
#[derive(Debug, Clone)]
struct PollTask {
    point_uuid: String,
    tag: String,
    function: u8,
    slave: u8,
    address: u16,
    quantity: u16,
    data_type: String,
    data_order: String,
    weight: f64,
    period: Duration,
}

impl PollTask {
    fn from_point(point: &DataPoint) -> Option<Self> {
        let PointAddress::Modbus {
            function: Some(function),
            slaver_id: Some(slave),
            address: Some(address),
            quantity,
        } = point.address
        else {
            return None;
        };
        Some(Self {
            point_uuid: point.uuid.clone(),
            tag: point.tag.clone(),
            function,
            slave,
            address,
            quantity: quantity.unwrap_or_else(|| default_quantity(&point.data_type)),
            data_type: point.data_type.clone(),
            data_order: point.data_order.clone(),
            weight: point.weight.unwrap_or(1.0),
            period: Duration::from_millis(point.frequency.unwrap_or(DEFAULT_FREQUENCY_MS)),
        })
    }
}

fn default_quantity(data_type: &str) -> u16 {
    match data_type {
        "RAW" | "INT" | "INT32" | "UINT" | "UINT32" | "FLOAT" | "FLOAT32" | "UFLOAT32" => 2,
        _ => 1,
    }
}

/// Modbus TCP 主站
pub struct ModbusMasterDriver {
    config: ModbusMasterConfig,
    cancel: Mutex<Option<CancellationToken>>,
}

impl ModbusMasterDriver {
    pub fn new(config: ModbusMasterConfig) -> Self {
        Self {
            config,
            cancel: Mutex::new(None),
        }
    }

    pub fn from_config(config: &EndpointConfig) -> Result<Self, ProtocolError> {
        Ok(Self::new(parse_config(config)?))
    }

    fn target(&self) -> Result<(String, u16), ProtocolError> {
        let host = self.config.host.trim();
        if host.is_empty() {
            return Err(ProtocolError::ConfigParse("modbus host is empty".to_string()));
        }
        Ok((host.to_string(), self.config.port))
    }
}

#[async_trait]
impl Driver for ModbusMasterDriver {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn start(&self, ctx: DriverContext) -> Result<(), ProtocolError> {
        let (host, port) = self.target()?;
        let mut tasks = Vec::with_capacity(ctx.points.len());
        for point in &ctx.points {
            match PollTask::from_point(point) {
                Some(task) => tasks.push(task),
                None => warn!(
                    target: "gateway.protocol",
                    device = %ctx.uuid(),
                    tag = %point.tag,
                    "modbus_point_skipped"
                ),
            }
        }

        if let Ok(mut guard) = self.cancel.lock() {
            *guard = Some(ctx.cancel.clone());
        }
        ctx.state.set_up();
        info!(
            target: "gateway.protocol",
            device = %ctx.uuid(),
            host = %host,
            port,
            points = tasks.len(),
            "modbus_master_started"
        );
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let read_timeout = Duration::from_millis(self.config.read_timeout_ms);
        tokio::spawn(run_poll_loop(
            (host, port),
            connect_timeout,
            read_timeout,
            tasks,
            ctx,
        ));
        Ok(())
    }

    async fn stop(&self) {
        let token = self.cancel.lock().ok().and_then(|mut guard| guard.take());
        if let Some(token) = token {
            token.cancel();
        }
    }
}

/// 解析主机名（IP 字面量或 DNS 名称），依次尝试每个地址
///
/// 解析失败与全部地址不可达都视为连接错误。
async fn connect_modbus(
    host: &str,
    port: u16,
) -> Result<(SocketAddr, tokio_modbus::client::Context), ProtocolError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ProtocolError::Connection(format!("resolve {}:{}: {}", host, port, e)))?
        .collect();
    let mut last_error = format!("{}:{} resolved to no address", host, port);
    for addr in addrs {
        match tcp::connect(addr).await {
            Ok(modbus) => return Ok((addr, modbus)),
            Err(e) => last_error = format!("{}: {}", addr, e),
        }
    }
    Err(ProtocolError::Connection(last_error))
}

async fn run_poll_loop(
    (host, port): (String, u16),
    connect_timeout: Duration,
    read_timeout: Duration,
    tasks: Vec<PollTask>,
    ctx: DriverContext,
) {
    let (addr, mut modbus) = tokio::select! {
        _ = ctx.cancel.cancelled() => return,
        result = timeout(connect_timeout, connect_modbus(&host, port)) => match result {
            Ok(Ok(connected)) => connected,
            Ok(Err(err)) => {
                ctx.state.set_down(err);
                return;
            }
            Err(_) => {
                ctx.state
                    .set_down(ProtocolError::Timeout(format!("connect {}:{}", host, port)));
                return;
            }
        }
    };
    debug!(target: "gateway.protocol", device = %ctx.uuid(), addr = %addr, "modbus_connected");

    if tasks.is_empty() {
        ctx.cancel.cancelled().await;
        return;
    }

    let mut next_due = vec![Instant::now(); tasks.len()];
    loop {
        let wake = next_due.iter().min().copied().unwrap_or_else(Instant::now);
        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            _ = sleep_until(wake) => {}
        }

        let now = Instant::now();
        let mut readings = Vec::new();
        for (index, task) in tasks.iter().enumerate() {
            if next_due[index] > now {
                continue;
            }
            next_due[index] = now + task.period;

            let value = match timeout(read_timeout, read_point(&mut modbus, task)).await {
                Ok(Ok(value)) => CacheValue::ok(task.point_uuid.clone(), value),
                Ok(Err(err @ (ProtocolError::Modbus(_) | ProtocolError::DataParse(_)))) => {
                    CacheValue::error(task.point_uuid.clone(), err.to_string())
                }
                Ok(Err(err)) => {
                    ctx.state.set_down(err);
                    return;
                }
                Err(_) => {
                    ctx.state
                        .set_down(ProtocolError::Timeout(format!("read {}", task.tag)));
                    return;
                }
            };
            readings.push(PointReading {
                tag: task.tag.clone(),
                value,
            });
        }

        if !readings.is_empty() {
            ctx.handler
                .on_sample(Sample::from_readings(ctx.uuid(), ctx.kind(), readings))
                .await;
        }
    }
}

/// 读取单个点位
async fn read_point(
    modbus: &mut tokio_modbus::client::Context,
    task: &PollTask,
) -> Result<Value, ProtocolError> {
    modbus.set_slave(Slave(task.slave));

    let value = match task.function {
        1 | 2 => {
            let coils = if task.function == 1 {
                // 读线圈
                modbus.read_coils(task.address, task.quantity).await
            } else {
                // 读离散输入
                modbus.read_discrete_inputs(task.address, task.quantity).await
            };
            let coils = coils
                .map_err(|e| ProtocolError::Connection(e.to_string()))?
                .map_err(|e| ProtocolError::Modbus(format!("exception: {:?}", e)))?;
            let first = coils
                .first()
                .copied()
                .ok_or_else(|| ProtocolError::DataParse("empty coil response".to_string()))?;
            Value::Bool(first)
        }
        3 | 4 => {
            let registers = if task.function == 3 {
                // 读保持寄存器
                modbus
                    .read_holding_registers(task.address, task.quantity)
                    .await
            } else {
                // 读输入寄存器
                modbus.read_input_registers(task.address, task.quantity).await
            };
            let registers = registers
                .map_err(|e| ProtocolError::Connection(e.to_string()))?
                .map_err(|e| ProtocolError::Modbus(format!("exception: {:?}", e)))?;
            decode_registers(&task.data_type, &task.data_order, &registers)?
        }
        other => {
            return Err(ProtocolError::Modbus(format!(
                "unsupported function code: {}",
                other
            )));
        }
    };

    Ok(apply_weight(value, task.weight))
}

/// 按 dataType / dataOrder 解码寄存器
///
/// 寄存器按大端展开为字节序列 `A B C D ...`，再按 dataOrder 重排。
pub fn decode_registers(
    data_type: &str,
    data_order: &str,
    registers: &[u16],
) -> Result<Value, ProtocolError> {
    let bytes: Vec<u8> = registers.iter().flat_map(|r| r.to_be_bytes()).collect();

    match data_type {
        "BOOL" | "I" | "Q" => {
            let first = registers.first().ok_or_else(|| short(data_type, 1, 0))?;
            Ok(Value::Bool(*first != 0))
        }
        "BYTE" => {
            let first = registers.first().ok_or_else(|| short(data_type, 1, 0))?;
            Ok(Value::Int(i64::from(*first & 0x00ff)))
        }
        "INT16" | "UINT16" => {
            let raw = reorder::<2>(&bytes, data_type, data_order)?;
            if data_type == "INT16" {
                Ok(Value::Int(i64::from(i16::from_be_bytes(raw))))
            } else {
                Ok(Value::Int(i64::from(u16::from_be_bytes(raw))))
            }
        }
        "INT" | "INT32" => {
            let raw = reorder::<4>(&bytes, data_type, data_order)?;
            Ok(Value::Int(i64::from(i32::from_be_bytes(raw))))
        }
        "UINT" | "UINT32" => {
            let raw = reorder::<4>(&bytes, data_type, data_order)?;
            Ok(Value::Int(i64::from(u32::from_be_bytes(raw))))
        }
        "FLOAT" | "FLOAT32" => {
            let raw = reorder::<4>(&bytes, data_type, data_order)?;
            Ok(Value::Float(f64::from(f32::from_be_bytes(raw))))
        }
        "UFLOAT32" => {
            let raw = reorder::<4>(&bytes, data_type, data_order)?;
            Ok(Value::Float(f64::from(f32::from_be_bytes(raw).abs())))
        }
        "RAW" => {
            let raw = reorder::<4>(&bytes, data_type, data_order)?;
            Ok(Value::Raw(raw.to_vec()))
        }
        "UTF8" => {
            let ordered: Vec<u8> = match data_order {
                "BIG_ENDIAN" => bytes,
                "LITTLE_ENDIAN" => registers.iter().flat_map(|r| r.to_le_bytes()).collect(),
                other => return Err(bad_order(data_type, other)),
            };
            let text = String::from_utf8_lossy(&ordered);
            Ok(Value::String(text.trim_end_matches('\0').to_string()))
        }
        other => Err(ProtocolError::DataParse(format!(
            "invalid data type '{}'",
            other
        ))),
    }
}

fn reorder<const N: usize>(
    bytes: &[u8],
    data_type: &str,
    data_order: &str,
) -> Result<[u8; N], ProtocolError> {
    if bytes.len() < N {
        return Err(short(data_type, N, bytes.len()));
    }
    let mut out = [0u8; N];
    match (N, data_order) {
        (2, "AB") | (4, "ABCD") => out.copy_from_slice(&bytes[..N]),
        (2, "BA") | (4, "DCBA") => {
            out.copy_from_slice(&bytes[..N]);
            out.reverse();
        }
        (4, "CDAB") => {
            out[..2].copy_from_slice(&bytes[2..4]);
            out[2..].copy_from_slice(&bytes[..2]);
        }
        (_, other) => return Err(bad_order(data_type, other)),
    }
    Ok(out)
}

fn short(data_type: &str, expected: usize, actual: usize) -> ProtocolError {
    ProtocolError::DataParse(format!(
        "'{}' needs {} bytes, got {}",
        data_type, expected, actual
    ))
}

fn bad_order(data_type: &str, data_order: &str) -> ProtocolError {
    ProtocolError::DataParse(format!("invalid '{}' order '{}'", data_type, data_order))
}

/// 数值点位乘以权重；权重为 1 时保持原类型
fn apply_weight(value: Value, weight: f64) -> Value {
    if weight == 1.0 {
        return value;
    }
    match value {
        Value::Int(v) => Value::Float(v as f64 * weight),
        Value::Float(v) => Value::Float(v * weight),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_sixteen_bit_orders() {
        assert_eq!(
            decode_registers("INT16", "AB", &[0xfffe]).expect("ab"),
            Value::Int(-2)
        );
        assert_eq!(
            decode_registers("UINT16", "BA", &[0x0100]).expect("ba"),
            Value::Int(1)
        );
    }

    #[test]
    fn decode_thirty_two_bit_orders() {
        // 12.5f32 = 0x41480000
        assert_eq!(
            decode_registers("FLOAT32", "ABCD", &[0x4148, 0x0000]).expect("abcd"),
            Value::Float(12.5)
        );
        assert_eq!(
            decode_registers("FLOAT", "CDAB", &[0x0000, 0x4148]).expect("cdab"),
            Value::Float(12.5)
        );
        assert_eq!(
            decode_registers("UINT32", "DCBA", &[0x0100, 0x0000]).expect("dcba"),
            Value::Int(1)
        );
        assert_eq!(
            decode_registers("INT32", "ABCD", &[0xffff, 0xffff]).expect("neg"),
            Value::Int(-1)
        );
        assert_eq!(
            decode_registers("RAW", "ABCD", &[0x0102, 0x0304]).expect("raw"),
            Value::Raw(vec![1, 2, 3, 4])
        );
    }

    #[test]
    fn decode_text_and_bits() {
        assert_eq!(
            decode_registers("UTF8", "BIG_ENDIAN", &[0x4f4b, 0x0000]).expect("be"),
            Value::String("OK".to_string())
        );
        assert_eq!(
            decode_registers("UTF8", "LITTLE_ENDIAN", &[0x4b4f]).expect("le"),
            Value::String("OK".to_string())
        );
        assert_eq!(
            decode_registers("BOOL", "A", &[1]).expect("bool"),
            Value::Bool(true)
        );
        assert_eq!(
            decode_registers("BYTE", "A", &[0x12ff]).expect("byte"),
            Value::Int(255)
        );
    }

    #[test]
    fn decode_rejects_bad_input() {
        let err = decode_registers("INT16", "ABCD", &[1]).expect_err("order");
        assert_eq!(err.to_string(), "data parse error: invalid 'INT16' order 'ABCD'");
        assert!(decode_registers("FLOAT32", "ABCD", &[1]).is_err());
        assert!(decode_registers("DOUBLE", "ABCD", &[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn weight_scales_numbers_only() {
        assert_eq!(apply_weight(Value::Int(10), 0.5), Value::Float(5.0));
        assert_eq!(apply_weight(Value::Int(10), 1.0), Value::Int(10));
        assert_eq!(apply_weight(Value::Bool(true), 2.0), Value::Bool(true));
    }
}

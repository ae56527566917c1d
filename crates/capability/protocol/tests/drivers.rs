use async_trait::async_trait;
use domain::{DataPoint, EndpointConfig, EndpointKind, EndpointState, PointAddress, Value};
use edge_cache::InterCache;
use edge_protocol::{
    Driver, DriverCatalogue, DriverContext, ModbusMasterDriver, ProtocolError, Sample,
    SampleHandler, StateHandle, TcpTransportDriver,
};
use edge_storage::{LostDataCache, connect_sqlite};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Collector {
    tx: mpsc::UnboundedSender<Sample>,
}

#[async_trait]
impl SampleHandler for Collector {
    async fn on_sample(&self, sample: Sample) {
        let _ = self.tx.send(sample);
    }
}

fn context(
    config: EndpointConfig,
    points: Vec<DataPoint>,
    lost: Option<LostDataCache>,
) -> (DriverContext, mpsc::UnboundedReceiver<Sample>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cache = Arc::new(InterCache::new());
    let ctx = DriverContext {
        state: StateHandle::new(&config.uuid, cache),
        config,
        points,
        cancel: CancellationToken::new(),
        handler: Arc::new(Collector { tx }),
        lost,
        events: None,
    };
    (ctx, rx)
}

async fn wait_for_state(state: &StateHandle, expected: EndpointState) {
    for _ in 0..150 {
        if state.get() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("state never became {}", expected);
}

async fn next_line(lines: &mut Lines<BufReader<TcpStream>>) -> String {
    tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("line in time")
        .expect("read")
        .expect("line")
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    port
}

fn float_point(device: &str) -> DataPoint {
    DataPoint {
        uuid: "POINT1".to_string(),
        device_uuid: device.to_string(),
        tag: "temp".to_string(),
        alias: "Temperature".to_string(),
        frequency: Some(100),
        address: PointAddress::Modbus {
            function: Some(3),
            slaver_id: Some(1),
            address: Some(0),
            quantity: Some(2),
        },
        data_type: "FLOAT32".to_string(),
        data_order: "ABCD".to_string(),
        weight: Some(1.0),
    }
}

/// 最小 Modbus TCP 从站：只回答读寄存器请求
async fn serve_registers(listener: TcpListener, registers: Vec<u16>) {
    let (mut socket, _) = listener.accept().await.expect("accept");
    loop {
        let mut header = [0u8; 7];
        if socket.read_exact(&mut header).await.is_err() {
            return;
        }
        let len = u16::from_be_bytes([header[4], header[5]]) as usize;
        let mut pdu = vec![0u8; len - 1];
        if socket.read_exact(&mut pdu).await.is_err() {
            return;
        }
        let count = u16::from_be_bytes([pdu[3], pdu[4]]) as usize;
        let mut body = vec![pdu[0], (count * 2) as u8];
        for register in registers.iter().take(count) {
            body.extend_from_slice(&register.to_be_bytes());
        }
        let mut frame = Vec::with_capacity(7 + body.len());
        frame.extend_from_slice(&header[..4]);
        frame.extend_from_slice(&((body.len() + 1) as u16).to_be_bytes());
        frame.push(header[6]);
        frame.extend_from_slice(&body);
        if socket.write_all(&frame).await.is_err() {
            return;
        }
    }
}

#[tokio::test]
async fn modbus_master_goes_down_when_target_unreachable() {
    let port = closed_port().await;
    let config = EndpointConfig::new(
        EndpointKind::Device,
        "GENERIC_MODBUS_MASTER",
        "plc",
        serde_json::json!({"host": "127.0.0.1", "port": port, "connectTimeoutMs": 1000}),
    );
    let device = config.uuid.clone();
    let driver = DriverCatalogue::with_builtin()
        .build(&config)
        .map_err(|e| e.to_string())
        .expect("build");
    let (ctx, _rx) = context(config, vec![float_point(&device)], None);
    let state = ctx.state.clone();

    driver.start(ctx).await.expect("start");
    wait_for_state(&state, EndpointState::Down).await;
    let err = state.last_error().expect("error recorded");
    assert!(err.contains("connection error"), "unexpected error: {}", err);
}

#[tokio::test]
async fn modbus_master_polls_and_decodes_points() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(serve_registers(listener, vec![0x4148, 0x0000]));

    let config = EndpointConfig::new(
        EndpointKind::Device,
        "GENERIC_MODBUS_MASTER",
        "plc",
        serde_json::json!({"host": "127.0.0.1", "port": port}),
    );
    let device = config.uuid.clone();
    let driver = ModbusMasterDriver::from_config(&config).expect("driver");
    let (ctx, mut rx) = context(config, vec![float_point(&device)], None);
    let state = ctx.state.clone();
    let cancel = ctx.cancel.clone();

    driver.start(ctx).await.expect("start");
    let sample = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("sample in time")
        .expect("sample");
    assert_eq!(sample.endpoint_uuid, device);
    assert_eq!(sample.readings.len(), 1);
    assert_eq!(sample.readings[0].value.uuid, "POINT1");
    assert_eq!(sample.readings[0].value.value, Value::Float(12.5));
    assert_eq!(sample.payload, serde_json::json!({"temp": 12.5}));
    assert_eq!(state.get(), EndpointState::Up);

    driver.stop().await;
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn modbus_master_accepts_host_names() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(serve_registers(listener, vec![0x4148, 0x0000]));

    let config = EndpointConfig::new(
        EndpointKind::Device,
        "GENERIC_MODBUS_MASTER",
        "plc",
        serde_json::json!({"host": "localhost", "port": port, "connectTimeoutMs": 2000}),
    );
    let device = config.uuid.clone();
    let driver = ModbusMasterDriver::from_config(&config).expect("driver");
    let (ctx, mut rx) = context(config, vec![float_point(&device)], None);
    let state = ctx.state.clone();

    driver.start(ctx).await.expect("start");
    let sample = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("sample in time")
        .expect("sample");
    assert_eq!(sample.readings[0].value.value, Value::Float(12.5));
    assert_eq!(state.get(), EndpointState::Up);
    driver.stop().await;
}

#[tokio::test]
async fn modbus_master_unresolvable_host_goes_down() {
    let config = EndpointConfig::new(
        EndpointKind::Device,
        "GENERIC_MODBUS_MASTER",
        "plc",
        serde_json::json!({"host": "plc.invalid", "port": 502, "connectTimeoutMs": 2000}),
    );
    let device = config.uuid.clone();
    let driver = ModbusMasterDriver::from_config(&config).expect("driver");
    let (ctx, _rx) = context(config, vec![float_point(&device)], None);
    let state = ctx.state.clone();

    driver.start(ctx).await.expect("start");
    wait_for_state(&state, EndpointState::Down).await;
    assert!(state.last_error().is_some());
}

#[tokio::test]
async fn tcp_transport_frames_payloads_and_drains_lost_data() {
    let dir = TempDir::new().expect("tempdir");
    let pool = connect_sqlite(&dir.path().join("lostcache.db"))
        .await
        .expect("pool");
    let lost = LostDataCache::new(pool);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let config = EndpointConfig::new(
        EndpointKind::OutEnd,
        "TCP_TRANSPORT",
        "north",
        serde_json::json!({"host": "127.0.0.1", "port": port}),
    );
    let outend = config.uuid.clone();
    lost.create_table(&outend).await.expect("create");
    lost.append(&outend, "old-1").await.expect("append");
    lost.append(&outend, "old-2").await.expect("append");

    let driver = TcpTransportDriver::from_config(&config).expect("driver");
    let (ctx, _rx) = context(config, Vec::new(), Some(lost.clone()));
    let state = ctx.state.clone();
    driver.start(ctx).await.expect("start");
    assert_eq!(state.get(), EndpointState::Up);

    let (socket, _) = listener.accept().await.expect("accept");
    let mut lines = BufReader::new(socket).lines();
    assert_eq!(next_line(&mut lines).await, "old-1");
    assert_eq!(next_line(&mut lines).await, "old-2");

    driver.deliver("fresh").await.expect("deliver");
    assert_eq!(next_line(&mut lines).await, "fresh");
    for _ in 0..150 {
        if lost.count(&outend).await.expect("count") == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(lost.count(&outend).await.expect("count"), 0);

    // 对端关闭后转为 DOWN，投递失败
    drop(lines);
    wait_for_state(&state, EndpointState::Down).await;
    let err = driver.deliver("late").await.expect_err("closed");
    assert!(matches!(err, ProtocolError::Connection(_)));
    driver.stop().await;
}

#[tokio::test]
async fn tcp_transport_start_fails_when_peer_is_absent() {
    let port = closed_port().await;
    let config = EndpointConfig::new(
        EndpointKind::OutEnd,
        "TCP_TRANSPORT",
        "north",
        serde_json::json!({"host": "127.0.0.1", "port": port}),
    );
    let driver = TcpTransportDriver::from_config(&config).expect("driver");
    let (ctx, _rx) = context(config, Vec::new(), None);
    let state = ctx.state.clone();
    let err = driver.start(ctx).await.expect_err("refused");
    assert!(matches!(err, ProtocolError::Connection(_)));
    assert_eq!(state.get(), EndpointState::Stop);
}

#[tokio::test]
async fn unsupported_delivery_is_an_error() {
    let config = EndpointConfig::new(
        EndpointKind::Device,
        "GENERIC_MODBUS_MASTER",
        "plc",
        serde_json::json!({"host": "127.0.0.1"}),
    );
    let driver = ModbusMasterDriver::from_config(&config).expect("driver");
    let err = driver.deliver("x").await.expect_err("unsupported");
    assert!(matches!(err, ProtocolError::Unsupported(_)));
}

#![allow(dead_code)]

use async_trait::async_trait;
use domain::{EndpointKind, EndpointState};
use edge_engine::{EngineOptions, RuleEngine, Runtime};
use edge_protocol::{Driver, DriverCatalogue, DriverContext, ProtocolError};
use edge_storage::Databases;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const FAKE_SOURCE: &str = "FAKE_SOURCE";
pub const FAKE_DEVICE: &str = "FAKE_DEVICE";
pub const FAKE_TARGET: &str = "FAKE_TARGET";
pub const FAKE_CECOLLA: &str = "FAKE_CECOLLA";

/// 所有假驱动共享的探针
#[derive(Clone, Default)]
pub struct Probe {
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub fail_start: Arc<AtomicBool>,
    /// 置位时驱动工厂构造失败
    pub fail_build: Arc<AtomicBool>,
    pub fail_deliver: Arc<AtomicBool>,
    pub delivered: Arc<Mutex<Vec<String>>>,
    contexts: Arc<Mutex<Vec<DriverContext>>>,
}

impl Probe {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// 某端点最近一次启动时拿到的上下文
    pub fn context(&self, uuid: &str) -> DriverContext {
        self.contexts
            .lock()
            .expect("contexts")
            .iter()
            .rev()
            .find(|ctx| ctx.uuid() == uuid)
            .cloned()
            .expect("driver started")
    }

    /// 某端点仍未被取消的驱动上下文个数，即实际在运行的实例数
    pub fn live_contexts(&self, uuid: &str) -> usize {
        self.contexts
            .lock()
            .expect("contexts")
            .iter()
            .filter(|ctx| ctx.uuid() == uuid && !ctx.cancel.is_cancelled())
            .count()
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().expect("delivered").clone()
    }
}

struct FakeDriver {
    probe: Probe,
}

#[async_trait]
impl Driver for FakeDriver {
    fn type_name(&self) -> &'static str {
        "FAKE"
    }

    async fn start(&self, ctx: DriverContext) -> Result<(), ProtocolError> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_start.load(Ordering::SeqCst) {
            return Err(ProtocolError::Connection("fake refused".to_string()));
        }
        ctx.state.set_up();
        self.probe.contexts.lock().expect("contexts").push(ctx);
        Ok(())
    }

    async fn stop(&self) {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn deliver(&self, payload: &str) -> Result<(), ProtocolError> {
        if self.probe.fail_deliver.load(Ordering::SeqCst) {
            return Err(ProtocolError::Connection("fake sink offline".to_string()));
        }
        self.probe
            .delivered
            .lock()
            .expect("delivered")
            .push(payload.to_string());
        Ok(())
    }
}

pub fn register_fake(catalogue: &mut DriverCatalogue, kind: EndpointKind, type_name: &str, probe: &Probe) {
    let probe = probe.clone();
    catalogue.register(kind, type_name, move |_| {
        if probe.fail_build.load(Ordering::SeqCst) {
            return Err(ProtocolError::ConfigParse("fake factory unavailable".to_string()));
        }
        Ok(Arc::new(FakeDriver {
            probe: probe.clone(),
        }))
    });
}

pub fn catalogue(probe: &Probe) -> DriverCatalogue {
    let mut catalogue = DriverCatalogue::with_builtin();
    register_fake(&mut catalogue, EndpointKind::InEnd, FAKE_SOURCE, probe);
    register_fake(&mut catalogue, EndpointKind::Device, FAKE_DEVICE, probe);
    register_fake(&mut catalogue, EndpointKind::OutEnd, FAKE_TARGET, probe);
    register_fake(&mut catalogue, EndpointKind::Cecolla, FAKE_CECOLLA, probe);
    catalogue
}

pub fn fast_options() -> EngineOptions {
    EngineOptions::default().with_timing(Duration::from_millis(50), Duration::from_millis(50))
}

pub struct Fixture {
    pub dir: TempDir,
    pub probe: Probe,
    pub runtime: Runtime,
}

impl Fixture {
    pub fn engine(&self) -> &Arc<RuleEngine> {
        self.runtime.engine()
    }
}

pub async fn fixture() -> Fixture {
    let probe = Probe::default();
    let catalogue = catalogue(&probe);
    fixture_with(probe, catalogue).await
}

pub async fn fixture_with(probe: Probe, catalogue: DriverCatalogue) -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let databases = Databases::open_in_dir(dir.path()).await.expect("databases");
    let runtime = Runtime::open(databases, catalogue, fast_options())
        .await
        .expect("runtime");
    Fixture {
        dir,
        probe,
        runtime,
    }
}

pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

pub async fn wait_for_state(engine: &RuleEngine, kind: EndpointKind, uuid: &str, expected: EndpointState) {
    wait_until(&format!("{} {}", uuid, expected), || {
        engine
            .get(kind, uuid)
            .map(|endpoint| endpoint.state() == expected)
            .unwrap_or(false)
    })
    .await;
}

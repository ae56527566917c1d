mod common;

use common::{FAKE_CECOLLA, FAKE_DEVICE, FAKE_SOURCE, fixture, wait_for_state, wait_until};
use domain::{CacheValue, EndpointKind, EndpointState, Value};
use edge_cache::DEFAULT_RULE_ENGINE_SLOT;
use edge_protocol::{PointReading, Sample};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::test]
async fn created_endpoint_is_registered_with_slot() {
    let fx = fixture().await;
    let engine = fx.engine();
    let record = engine
        .create_endpoint(EndpointKind::Device, FAKE_DEVICE, "dev-1", "", json!({}))
        .await
        .expect("create");

    let endpoint = engine.get_device(&record.uuid).expect("registered");
    assert_eq!(endpoint.uuid(), record.uuid);
    assert_eq!(endpoint.state(), EndpointState::Up);
    assert!(engine.cache().has_slot(&record.uuid));
    assert_eq!(engine.all_devices().len(), 1);
    assert_eq!(fx.probe.starts(), 1);
}

#[tokio::test]
async fn unknown_driver_type_is_rejected() {
    let fx = fixture().await;
    let err = fx
        .engine()
        .create_endpoint(EndpointKind::Device, "NOPE", "dev", "", json!({}))
        .await
        .expect_err("unknown type");
    assert!(err.is_validation());
    assert_eq!(err.to_string(), "unsupported Device type:NOPE");
}

#[tokio::test]
async fn duplicate_name_is_rejected() {
    let fx = fixture().await;
    let engine = fx.engine();
    engine
        .create_endpoint(EndpointKind::InEnd, FAKE_SOURCE, "src", "", json!({}))
        .await
        .expect("first");
    let err = engine
        .create_endpoint(EndpointKind::InEnd, FAKE_SOURCE, "src", "", json!({}))
        .await
        .expect_err("second");
    assert_eq!(err.to_string(), "InEnd name already exists: src");
}

#[tokio::test]
async fn singleton_device_can_only_be_created_once() {
    let fx = fixture().await;
    let engine = fx.engine();
    engine
        .create_endpoint(EndpointKind::Device, "INTERNAL_EVENT", "events-1", "", json!({}))
        .await
        .expect("first singleton");
    let err = engine
        .create_endpoint(EndpointKind::Device, "INTERNAL_EVENT", "events-2", "", json!({}))
        .await
        .expect_err("second singleton");
    assert_eq!(err.to_string(), "singleton Device, can not create again");
    assert_eq!(engine.all_devices().len(), 1);
}

#[tokio::test]
async fn start_failure_is_retried_by_supervisor() {
    let fx = fixture().await;
    let engine = fx.engine();
    let mut events = engine.events().subscribe("test", 64);
    fx.probe.fail_start.store(true, Ordering::SeqCst);

    let record = engine
        .create_endpoint(EndpointKind::Device, FAKE_DEVICE, "flaky", "", json!({}))
        .await
        .expect("create keeps the endpoint");
    let endpoint = engine.get_device(&record.uuid).expect("registered while down");
    assert_eq!(endpoint.state(), EndpointState::Down);
    assert!(endpoint.err_msg().contains("fake refused"));

    let down = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event");
            if event.event == "event.device.down" {
                return event;
            }
        }
    })
    .await
    .expect("down event in time");
    assert!(down.info.contains("fake refused"));

    fx.probe.fail_start.store(false, Ordering::SeqCst);
    wait_for_state(engine, EndpointKind::Device, &record.uuid, EndpointState::Up).await;
    assert!(engine.restart_count(&record.uuid) >= 1);
    assert!(engine.get_device(&record.uuid).expect("reloaded").err_msg().is_empty());
}

#[tokio::test]
async fn modbus_device_goes_down_and_recovers() {
    let fx = fixture().await;
    let engine = fx.engine();

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let record = engine
        .create_endpoint(
            EndpointKind::Device,
            "GENERIC_MODBUS_MASTER",
            "plc",
            "",
            json!({"host": "127.0.0.1", "port": port, "connectTimeoutMs": 200}),
        )
        .await
        .expect("create");
    wait_for_state(engine, EndpointKind::Device, &record.uuid, EndpointState::Down).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await.expect("rebind");
    let accept = tokio::spawn(async move {
        let mut peers = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            peers.push(stream);
        }
    });

    wait_until("restart after down", || engine.restart_count(&record.uuid) >= 1).await;
    wait_for_state(engine, EndpointKind::Device, &record.uuid, EndpointState::Up).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        engine.get_device(&record.uuid).expect("device").state(),
        EndpointState::Up
    );
    accept.abort();
}

#[tokio::test]
async fn removed_endpoint_ignores_late_samples() {
    let fx = fixture().await;
    let engine = fx.engine();
    let record = engine
        .create_endpoint(EndpointKind::Device, FAKE_DEVICE, "dev", "", json!({}))
        .await
        .expect("create");
    let ctx = fx.probe.context(&record.uuid);

    assert!(engine.remove_device(&record.uuid).await);
    assert!(engine.get_device(&record.uuid).is_none());
    assert!(!engine.cache().has_slot(&record.uuid));
    assert!(ctx.cancel.is_cancelled());
    assert_eq!(fx.probe.stops(), 1);

    let reading = PointReading {
        tag: "temp".to_string(),
        value: CacheValue::ok("p1", Value::Float(20.0)),
    };
    ctx.handler
        .on_sample(Sample::from_readings(&record.uuid, EndpointKind::Device, vec![reading]))
        .await;
    assert!(engine.cache().get_value(&record.uuid, "p1").is_none());
    assert!(!engine.cache().has_slot(&record.uuid));
    assert!(
        engine
            .cache()
            .get_value(DEFAULT_RULE_ENGINE_SLOT, &record.uuid)
            .is_none()
    );

    // 持久化配置仍在，可以重新加载
    engine
        .load_newest_device(&record.uuid)
        .await
        .expect("reload");
    assert!(engine.get_device(&record.uuid).is_some());
}

#[tokio::test]
async fn restart_replaces_instance_and_counts() {
    let fx = fixture().await;
    let engine = fx.engine();
    let record = engine
        .create_endpoint(EndpointKind::InEnd, FAKE_SOURCE, "src", "", json!({}))
        .await
        .expect("create");
    let before = engine.get_inend(&record.uuid).expect("running");

    engine.restart_inend(&record.uuid).await.expect("restart");
    let after = engine.get_inend(&record.uuid).expect("running");
    assert!(before.supervisor_cancel.is_cancelled());
    assert!(!after.supervisor_cancel.is_cancelled());
    assert_eq!(engine.restart_count(&record.uuid), 1);
    assert_eq!(fx.probe.starts(), 2);
    assert_eq!(fx.probe.stops(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_restarts_leave_one_live_instance() {
    let fx = fixture().await;
    let engine = fx.engine().clone();
    let record = engine
        .create_endpoint(EndpointKind::Device, FAKE_DEVICE, "dev", "", json!({}))
        .await
        .expect("create");

    for _ in 0..20 {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                let uuid = record.uuid.clone();
                tokio::spawn(async move { engine.restart_device(&uuid).await })
            })
            .collect();
        for handle in handles {
            handle.await.expect("join").expect("restart");
        }
    }

    assert_eq!(fx.probe.live_contexts(&record.uuid), 1);
    assert_eq!(fx.probe.starts() - fx.probe.stops(), 1);
    assert_eq!(engine.restart_count(&record.uuid), 40);
    let endpoint = engine.get_device(&record.uuid).expect("running");
    assert_eq!(endpoint.state(), EndpointState::Up);
    assert!(!endpoint.supervisor_cancel.is_cancelled());
}

#[tokio::test]
async fn failed_reload_keeps_endpoint_down_and_retried() {
    let fx = fixture().await;
    let engine = fx.engine();
    let record = engine
        .create_endpoint(EndpointKind::Device, FAKE_DEVICE, "dev", "", json!({}))
        .await
        .expect("create");

    fx.probe.fail_build.store(true, Ordering::SeqCst);
    fx.probe.context(&record.uuid).state.set_down("link lost");

    // 工厂失败时旧实例留在注册表，看门狗持续重试
    wait_until("two reload attempts", || engine.restart_count(&record.uuid) >= 2).await;
    let endpoint = engine.get_device(&record.uuid).expect("still registered");
    assert_eq!(endpoint.state(), EndpointState::Down);
    assert!(endpoint.err_msg().contains("fake factory unavailable"));
    assert!(engine.cache().has_slot(&record.uuid));
    assert_eq!(fx.probe.stops(), 0);

    fx.probe.fail_build.store(false, Ordering::SeqCst);
    wait_for_state(engine, EndpointKind::Device, &record.uuid, EndpointState::Up).await;
    assert_eq!(fx.probe.live_contexts(&record.uuid), 1);
    assert!(engine.get_device(&record.uuid).expect("reloaded").err_msg().is_empty());
}

#[tokio::test]
async fn update_endpoint_reloads_with_new_config() {
    let fx = fixture().await;
    let engine = fx.engine();
    let mut record = engine
        .create_endpoint(EndpointKind::InEnd, FAKE_SOURCE, "src", "", json!({"a": 1}))
        .await
        .expect("create");
    record.config = json!({"a": 2});
    record.name = "src-renamed".to_string();
    engine.update_endpoint(record.clone()).await.expect("update");

    let endpoint = engine.get_inend(&record.uuid).expect("running");
    assert_eq!(endpoint.config.config, json!({"a": 2}));
    assert_eq!(endpoint.config.name, "src-renamed");
    assert_eq!(fx.probe.context(&record.uuid).config.config, json!({"a": 2}));
}

#[tokio::test]
async fn load_all_restores_persisted_endpoints() {
    let fx = fixture().await;
    let engine = fx.engine();
    let record = engine
        .create_device(FAKE_DEVICE, "dev", "", json!({}))
        .await
        .expect("create");
    let cecolla = engine
        .create_cecolla(FAKE_CECOLLA, "edge-app", "", json!({}))
        .await
        .expect("cecolla");
    assert!(engine.remove_device(&record.uuid).await);
    assert!(engine.remove_cecolla(&cecolla.uuid).await);
    assert!(engine.all_devices().is_empty());
    assert!(engine.all_cecollas().is_empty());

    fx.runtime.start().await.expect("load all");
    assert_eq!(engine.all_devices().len(), 1);
    assert_eq!(engine.get_cecolla(&cecolla.uuid).expect("cecolla").state(), EndpointState::Up);
    assert!(engine.cache().has_slot(&record.uuid));
}

#[tokio::test]
async fn stop_tears_down_every_endpoint() {
    let fx = fixture().await;
    let engine = fx.engine().clone();
    let device = engine
        .create_endpoint(EndpointKind::Device, FAKE_DEVICE, "dev", "", json!({}))
        .await
        .expect("device");
    engine
        .create_endpoint(EndpointKind::InEnd, FAKE_SOURCE, "src", "", json!({}))
        .await
        .expect("inend");

    fx.runtime.shutdown().await;
    assert!(engine.all_devices().is_empty());
    assert!(engine.all_inends().is_empty());
    assert!(!engine.cache().has_slot(&device.uuid));
    assert!(engine.shutdown_token().is_cancelled());
    assert!(fx.probe.stops() >= 2);
}

#[tokio::test]
async fn snapshot_lists_state_per_kind() {
    let fx = fixture().await;
    let engine = fx.engine();
    engine
        .create_endpoint(EndpointKind::Device, FAKE_DEVICE, "dev", "", json!({}))
        .await
        .expect("device");

    let snapshot = engine.snapshot_dump();
    for key in ["rules", "inends", "outends", "devices", "cecollas", "statistics", "system", "config"] {
        assert!(snapshot.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(snapshot["devices"][0]["state"], "UP");
    assert_eq!(snapshot["devices"][0]["type"], FAKE_DEVICE);
    assert_eq!(snapshot["config"]["supervisorTickMs"], 50);
}

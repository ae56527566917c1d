//! 边缘网关进程：装配运行时、启动只读观测接口、优雅停机。

mod routes;

use edge_config::AppConfig;
use edge_engine::{EngineOptions, Runtime};
use edge_protocol::DriverCatalogue;
use edge_storage::Databases;
use edge_telemetry::init_tracing;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    tokio::fs::create_dir_all(&config.data_dir).await?;
    let databases = Databases::open(
        &config.config_db_path(),
        &config.datacenter_db_path(),
        &config.lostcache_db_path(),
    )
    .await?;

    let options = EngineOptions {
        supervisor_tick: Duration::from_millis(config.supervisor_tick_ms),
        supervisor_backoff: Duration::from_millis(config.supervisor_backoff_ms),
        event_queue_size: config.event_queue_size,
    };
    let runtime = Runtime::open(databases, DriverCatalogue::with_builtin(), options).await?;
    runtime.start().await?;
    runtime.spawn_background(
        &config.retention_period,
        Duration::from_secs(config.purge_interval_secs()),
        Duration::from_secs(5),
    );

    let app = routes::router(routes::AppState {
        engine: runtime.engine().clone(),
    });
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "gateway.app", addr = %config.http_addr, "gateway_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runtime.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!(target: "gateway.app", "shutdown_requested");
}

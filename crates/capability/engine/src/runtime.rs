//! 运行时装配
//!
//! 打开三个库上的存储，重建数据模型缓存，构造引擎并启动事件泵。
//! 后台任务（缓存过期清理、通知清理、数据中心清理）由调用方按配置启动。

use crate::engine::{EngineParts, EngineStores, RuleEngine};
use crate::error::EngineError;
use crate::evaluator::ActionEvaluator;
use crate::options::EngineOptions;
use edge_cache::InterCache;
use edge_notify::{EventBus, spawn_notify_purge};
use edge_protocol::DriverCatalogue;
use edge_schema::{DataSchemaCache, SchemaPublisher, spawn_datacenter_purge};
use edge_storage::{
    Databases, DatacenterStore, LostDataCache, NotifyStore, SqliteEndpointStore,
    SqliteNotifyStore, SqlitePointStore, SqliteRuleStore, SqliteSchemaStore,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Runtime {
    engine: Arc<RuleEngine>,
    databases: Databases,
    notify_store: Arc<dyn NotifyStore>,
    /// 事件泵与后台任务的令牌，晚于引擎取消，保证停止事件能落库
    background: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Runtime {
    pub async fn open(
        databases: Databases,
        catalogue: DriverCatalogue,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let cache = Arc::new(InterCache::new());
        let datacenter = DatacenterStore::new(databases.datacenter.clone());
        let schema_store = Arc::new(SqliteSchemaStore::new(
            databases.config.clone(),
            databases.datacenter.clone(),
        ));
        let schemas = Arc::new(SchemaPublisher::new(
            schema_store,
            datacenter,
            Arc::new(DataSchemaCache::new(cache.clone())),
        ));
        let published = schemas.rebuild_cache().await?;

        let events = EventBus::new(options.event_queue_size);
        let notify_store: Arc<dyn NotifyStore> =
            Arc::new(SqliteNotifyStore::new(databases.config.clone()));
        let background = CancellationToken::new();
        let pump = events.spawn_pump(Some(notify_store.clone()), background.clone())?;

        let engine = RuleEngine::new(EngineParts {
            stores: EngineStores {
                endpoints: Arc::new(SqliteEndpointStore::new(databases.config.clone())),
                rules: Arc::new(SqliteRuleStore::new(databases.config.clone())),
                points: Arc::new(SqlitePointStore::new(databases.config.clone())),
            },
            cache,
            catalogue,
            lost: LostDataCache::new(databases.lostcache.clone()),
            schemas,
            events,
            evaluator: Arc::new(ActionEvaluator),
            options,
            shutdown: CancellationToken::new(),
        });
        info!(target: "gateway.runtime", published, "runtime_opened");

        Ok(Self {
            engine,
            databases,
            notify_store,
            background,
            tasks: Mutex::new(vec![pump]),
        })
    }

    pub fn engine(&self) -> &Arc<RuleEngine> {
        &self.engine
    }

    /// 载入全部规则与端点
    pub async fn start(&self) -> Result<(), EngineError> {
        self.engine.load_all().await
    }

    /// 启动后台清理任务
    pub fn spawn_background(&self, retention: &str, purge_interval: Duration, sweep_interval: Duration) {
        let handles = [
            self.engine
                .cache()
                .spawn_sweeper(sweep_interval, self.background.clone()),
            spawn_notify_purge(
                self.notify_store.clone(),
                retention.to_string(),
                purge_interval,
                self.background.clone(),
            ),
            spawn_datacenter_purge(
                self.engine.schemas().datacenter().clone(),
                retention.to_string(),
                purge_interval,
                self.background.clone(),
            ),
        ];
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.extend(handles);
        }
    }

    /// 停止引擎，再停后台任务，最后关闭连接池
    pub async fn shutdown(self) {
        self.engine.stop().await;
        // 让事件泵处理完停止事件
        tokio::task::yield_now().await;
        self.background.cancel();
        let tasks = self
            .tasks
            .lock()
            .map(|mut tasks| std::mem::take(&mut *tasks))
            .unwrap_or_default();
        for task in tasks {
            let _ = task.await;
        }
        self.databases.close().await;
        info!(target: "gateway.runtime", "runtime_shutdown");
    }
}

use edge_storage::NotifyStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 周期清理旧通知；启动时先执行一次
pub fn spawn_notify_purge(
    store: Arc<dyn NotifyStore>,
    retention: String,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match store.purge_notifies(&retention).await {
                        Ok(deleted) => {
                            info!(target: "gateway.notify", deleted, retention = %retention, "notifies_purged");
                        }
                        Err(err) => {
                            warn!(target: "gateway.notify", error = %err, "notify_purge_failed");
                        }
                    }
                }
            }
        }
    })
}

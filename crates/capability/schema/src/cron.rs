use edge_storage::DatacenterStore;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 周期清理所有投影表中超出保留期的行
pub fn spawn_datacenter_purge(
    datacenter: DatacenterStore,
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
                    match datacenter.purge_expired(&retention).await {
                        Ok(deleted) => {
                            info!(target: "gateway.schema", deleted, retention = %retention, "datacenter_purged");
                        }
                        Err(err) => {
                            warn!(target: "gateway.schema", error = %err, "datacenter_purge_failed");
                        }
                    }
                }
            }
        }
    })
}

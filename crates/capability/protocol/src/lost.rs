//! 丢失数据重放

use crate::error::ProtocolError;
use edge_storage::LostDataCache;
use std::future::Future;
use tracing::{info, warn};

/// 单次从缓存读取的行数
const DRAIN_BATCH: i64 = 100;

/// 按写入顺序重放丢失数据
///
/// 每行投递成功后立即删除，遇到第一次失败即停止，剩余行留待下次重连。
/// 返回成功重放的行数。
pub async fn drain_lost_data<F, Fut>(
    cache: &LostDataCache,
    outend_uuid: &str,
    mut send: F,
) -> Result<usize, ProtocolError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<(), ProtocolError>>,
{
    let mut drained = 0usize;
    loop {
        let rows = cache.pending(outend_uuid, DRAIN_BATCH).await?;
        if rows.is_empty() {
            break;
        }
        for row in rows {
            if let Err(err) = send(row.data.clone()).await {
                warn!(
                    target: "gateway.protocol",
                    outend = %outend_uuid,
                    drained,
                    error = %err,
                    "lost_data_drain_interrupted"
                );
                return Ok(drained);
            }
            cache.delete(outend_uuid, row.id).await?;
            edge_telemetry::record_lost_row_drained();
            drained += 1;
        }
    }
    if drained > 0 {
        info!(target: "gateway.protocol", outend = %outend_uuid, drained, "lost_data_drained");
    }
    Ok(drained)
}

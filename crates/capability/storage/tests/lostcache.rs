use edge_storage::{LostDataCache, connect_sqlite};
use tempfile::TempDir;

async fn open_cache(dir: &TempDir) -> LostDataCache {
    let pool = connect_sqlite(&dir.path().join("lostcache.db"))
        .await
        .expect("pool");
    LostDataCache::new(pool)
}

#[tokio::test]
async fn pending_rows_come_back_oldest_first() {
    let dir = TempDir::new().expect("tempdir");
    let cache = open_cache(&dir).await;
    cache.create_table("OUTEND1").await.expect("create");
    // 幂等
    cache.create_table("OUTEND1").await.expect("create again");

    cache.append("OUTEND1", "{\"n\":1}").await.expect("append 1");
    cache.append("OUTEND1", "{\"n\":2}").await.expect("append 2");
    cache.append("OUTEND1", "{\"n\":3}").await.expect("append 3");

    let pending = cache.pending("OUTEND1", 2).await.expect("pending");
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].data, "{\"n\":1}");
    assert_eq!(pending[1].data, "{\"n\":2}");
    assert_eq!(pending[0].target_id, "OUTEND1");

    assert!(cache.delete("OUTEND1", pending[0].id).await.expect("delete"));
    assert!(!cache.delete("OUTEND1", pending[0].id).await.expect("delete again"));
    assert_eq!(cache.count("OUTEND1").await.expect("count"), 2);
}

#[tokio::test]
async fn drop_table_removes_the_cache() {
    let dir = TempDir::new().expect("tempdir");
    let cache = open_cache(&dir).await;
    cache.create_table("OUTEND2").await.expect("create");
    assert!(cache.table_exists("OUTEND2").await.expect("exists"));
    cache.drop_table("OUTEND2").await.expect("drop");
    assert!(!cache.table_exists("OUTEND2").await.expect("exists"));
    assert!(cache.append("OUTEND2", "x").await.is_err());
}

#[tokio::test]
async fn rolling_window_keeps_ten_thousand_rows() {
    let dir = TempDir::new().expect("tempdir");
    let cache = open_cache(&dir).await;
    cache.create_table("OUTEND3").await.expect("create");

    let mut tx = cache.pool.begin().await.expect("begin");
    for n in 0..10_100 {
        sqlx::query("insert into \"lost_cache_OUTEND3\" (target_id, data) values (?, ?)")
            .bind("OUTEND3")
            .bind(n.to_string())
            .execute(&mut *tx)
            .await
            .expect("insert");
    }
    tx.commit().await.expect("commit");

    assert_eq!(cache.count("OUTEND3").await.expect("count"), 10_000);
    let oldest = cache.pending("OUTEND3", 1).await.expect("pending");
    assert_eq!(oldest[0].id, 101);
}

#[tokio::test]
async fn unsafe_uuid_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let cache = open_cache(&dir).await;
    assert!(cache.create_table("x\"; drop table y; --").await.is_err());
}

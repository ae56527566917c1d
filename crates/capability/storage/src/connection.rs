//! 数据库连接管理
//!
//! 三个相互独立的 SQLite 文件，各自一个连接池、各自的事务边界：
//! - 配置库（端点、点位、规则、数据模型、通知）
//! - 数据中心库（`data_center_<schema>` 投影表）
//! - 丢失数据缓存库（`lost_cache_<outend>` 表）
//!
//! 不做跨库事务。

use crate::error::StorageError;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// 打开（必要时创建）一个 SQLite 文件连接池，最大连接数 8。
pub async fn connect_sqlite(path: &Path) -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// 三个嵌入式库的连接池
#[derive(Clone)]
pub struct Databases {
    pub config: SqlitePool,
    pub datacenter: SqlitePool,
    pub lostcache: SqlitePool,
}

impl Databases {
    /// 打开三个库并执行配置库建表
    pub async fn open(
        config_path: &Path,
        datacenter_path: &Path,
        lostcache_path: &Path,
    ) -> Result<Self, StorageError> {
        let config = connect_sqlite(config_path).await?;
        let datacenter = connect_sqlite(datacenter_path).await?;
        let lostcache = connect_sqlite(lostcache_path).await?;
        migrate_config_db(&config).await?;
        Ok(Self {
            config,
            datacenter,
            lostcache,
        })
    }

    /// 在目录下使用默认文件名打开
    pub async fn open_in_dir(dir: &Path) -> Result<Self, StorageError> {
        Self::open(
            &dir.join("rhilex.db"),
            &dir.join("rhilex_datacenter.db"),
            &dir.join("rhilex_lostcache.db"),
        )
        .await
    }

    pub async fn close(&self) {
        self.config.close().await;
        self.datacenter.close().await;
        self.lostcache.close().await;
    }
}

const ENDPOINT_TABLES: [&str; 4] = ["m_in_ends", "m_out_ends", "m_devices", "m_cecollas"];

/// 配置库建表（幂等）
pub async fn migrate_config_db(pool: &SqlitePool) -> Result<(), StorageError> {
    for table in ENDPOINT_TABLES {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
             uuid TEXT NOT NULL UNIQUE, \
             type TEXT NOT NULL, \
             name TEXT NOT NULL, \
             description TEXT NOT NULL DEFAULT '', \
             config TEXT NOT NULL DEFAULT '{{}}', \
             created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP)"
        ))
        .execute(pool)
        .await?;
    }
    let statements = [
        "CREATE TABLE IF NOT EXISTS m_rules (\
         id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
         uuid TEXT NOT NULL UNIQUE, \
         name TEXT NOT NULL, \
         description TEXT NOT NULL DEFAULT '', \
         from_source TEXT NOT NULL DEFAULT '[]', \
         from_device TEXT NOT NULL DEFAULT '[]', \
         actions TEXT NOT NULL DEFAULT '[]', \
         created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP)",
        "CREATE TABLE IF NOT EXISTS m_data_points (\
         id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
         uuid TEXT NOT NULL UNIQUE, \
         device_uuid TEXT NOT NULL, \
         tag TEXT NOT NULL, \
         alias TEXT NOT NULL, \
         frequency INTEGER, \
         address TEXT NOT NULL, \
         data_type TEXT NOT NULL DEFAULT '', \
         data_order TEXT NOT NULL DEFAULT '', \
         weight REAL, \
         created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP, \
         UNIQUE (device_uuid, tag))",
        "CREATE INDEX IF NOT EXISTS idx_data_points_device ON m_data_points (device_uuid)",
        "CREATE TABLE IF NOT EXISTS m_iot_schemas (\
         id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
         uuid TEXT NOT NULL UNIQUE, \
         name TEXT NOT NULL, \
         published BOOLEAN NOT NULL DEFAULT 0, \
         description TEXT NOT NULL DEFAULT '', \
         created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP)",
        "CREATE TABLE IF NOT EXISTS m_iot_properties (\
         id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
         uuid TEXT NOT NULL UNIQUE, \
         schema_id TEXT NOT NULL, \
         name TEXT NOT NULL, \
         label TEXT NOT NULL DEFAULT '', \
         type TEXT NOT NULL, \
         rw TEXT NOT NULL, \
         unit TEXT NOT NULL DEFAULT '', \
         description TEXT NOT NULL DEFAULT '', \
         rule TEXT NOT NULL DEFAULT '{}', \
         created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP, \
         UNIQUE (schema_id, name))",
        "CREATE TABLE IF NOT EXISTS m_internal_notifies (\
         id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
         uuid TEXT NOT NULL, \
         type TEXT NOT NULL, \
         status INTEGER NOT NULL DEFAULT 1, \
         event TEXT NOT NULL, \
         ts INTEGER NOT NULL, \
         summary TEXT NOT NULL, \
         info TEXT NOT NULL, \
         created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP)",
    ];
    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// 滚动窗口触发器：表超过 10000 行后，每满 100 行删除最旧的 100 行。
///
/// 投影表与丢失数据表共用。
pub fn rolling_window_trigger(trigger_name: &str, table: &str) -> String {
    format!(
        "CREATE TRIGGER IF NOT EXISTS \"{trigger}\" \
         AFTER INSERT ON \"{table}\" \
         WHEN ((SELECT COUNT(*) FROM \"{table}\") / 100) * 100 = (SELECT COUNT(*) FROM \"{table}\") \
         AND (SELECT COUNT(*) FROM \"{table}\") > 10000 \
         BEGIN \
         DELETE FROM \"{table}\" WHERE id IN (SELECT id FROM \"{table}\" ORDER BY id ASC LIMIT 100); \
         END;",
        trigger = trigger_name,
        table = table,
    )
}

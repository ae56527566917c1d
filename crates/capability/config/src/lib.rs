//! 网关运行配置加载。

use std::env;
use std::path::PathBuf;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 网关运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub config_db: String,
    pub datacenter_db: String,
    pub lostcache_db: String,
    pub http_addr: String,
    pub supervisor_tick_ms: u64,
    pub supervisor_backoff_ms: u64,
    /// SQLite `date('now', ...)` 修饰符，例如 `-1 day`
    pub retention_period: String,
    pub debug: bool,
    pub event_queue_size: usize,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = PathBuf::from(env::var("GATEWAY_DATA_DIR").unwrap_or_else(|_| ".".to_string()));
        let config_db = env::var("GATEWAY_CONFIG_DB").unwrap_or_else(|_| "rhilex.db".to_string());
        let datacenter_db = env::var("GATEWAY_DATACENTER_DB")
            .unwrap_or_else(|_| "rhilex_datacenter.db".to_string());
        let lostcache_db = env::var("GATEWAY_LOSTCACHE_DB")
            .unwrap_or_else(|_| "rhilex_lostcache.db".to_string());
        let http_addr =
            env::var("GATEWAY_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:2580".to_string());
        let supervisor_tick_ms = read_u64_with_default("GATEWAY_SUPERVISOR_TICK_MS", 5000)?;
        let supervisor_backoff_ms = read_u64_with_default("GATEWAY_SUPERVISOR_BACKOFF_MS", 4000)?;
        let retention_period = read_retention("GATEWAY_RETENTION_PERIOD", "-1 day")?;
        let debug = read_bool_with_default("GATEWAY_DEBUG", false);
        let event_queue_size = read_u64_with_default("GATEWAY_EVENT_QUEUE_SIZE", 1024)? as usize;
        if event_queue_size == 0 {
            return Err(ConfigError::Invalid(
                "GATEWAY_EVENT_QUEUE_SIZE".to_string(),
                "0".to_string(),
            ));
        }

        Ok(Self {
            data_dir,
            config_db,
            datacenter_db,
            lostcache_db,
            http_addr,
            supervisor_tick_ms,
            supervisor_backoff_ms,
            retention_period,
            debug,
            event_queue_size,
        })
    }

    pub fn config_db_path(&self) -> PathBuf {
        self.data_dir.join(&self.config_db)
    }

    pub fn datacenter_db_path(&self) -> PathBuf {
        self.data_dir.join(&self.datacenter_db)
    }

    pub fn lostcache_db_path(&self) -> PathBuf {
        self.data_dir.join(&self.lostcache_db)
    }

    /// 定时清理周期：调试模式 24 秒，否则 24 小时
    pub fn purge_interval_secs(&self) -> u64 {
        if self.debug { 24 } else { 24 * 60 * 60 }
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

/// 保留期会被拼进 SQL，只接受 `-<n> <unit>` 形式。
fn read_retention(key: &str, default: &str) -> Result<String, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default.to_string()),
    };
    let valid = value
        .strip_prefix('-')
        .and_then(|rest| rest.split_once(' '))
        .is_some_and(|(count, unit)| {
            !count.is_empty()
                && count.chars().all(|c| c.is_ascii_digit())
                && matches!(
                    unit,
                    "day" | "days" | "hour" | "hours" | "minute" | "minutes" | "month" | "months"
                )
        });
    if valid {
        Ok(value)
    } else {
        Err(ConfigError::Invalid(key.to_string(), value))
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}

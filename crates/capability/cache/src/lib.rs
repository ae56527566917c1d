//! 进程内缓存（InterCache）
//!
//! 一组具名插槽，每个插槽是 `实体 UUID -> CacheValue` 的映射：
//! - 插槽在端点启动前注册，端点终止后注销；
//! - 写入是整值替换（后写者胜），读者拿到 `Arc` 快照；
//! - 插槽之间互不阻塞，同一插槽内读者之间互不阻塞。
//!
//! 两个常驻插槽：`__DefaultRuleEngine`（端点健康）与 `__DataSchema`（属性校验器）。

use domain::CacheValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 端点健康插槽
pub const DEFAULT_RULE_ENGINE_SLOT: &str = "__DefaultRuleEngine";
/// 数据模型校验器插槽
pub const DATA_SCHEMA_SLOT: &str = "__DataSchema";

/// 过期清理周期
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("slot not found: {0}")]
    SlotNotFound(String),
    #[error("cache lock failed")]
    LockFailed,
}

#[derive(Clone)]
struct Entry {
    value: Arc<CacheValue>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

type Slot = Arc<RwLock<HashMap<String, Entry>>>;

pub struct InterCache {
    slots: RwLock<HashMap<String, Slot>>,
}

impl Default for InterCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InterCache {
    /// 创建缓存，常驻插槽已注册
    pub fn new() -> Self {
        let cache = Self {
            slots: RwLock::new(HashMap::new()),
        };
        cache.register_well_known();
        cache
    }

    fn register_well_known(&self) {
        self.register_slot(DEFAULT_RULE_ENGINE_SLOT);
        self.register_slot(DATA_SCHEMA_SLOT);
    }

    fn slot(&self, name: &str) -> Option<Slot> {
        self.slots.read().ok()?.get(name).cloned()
    }

    /// 注册插槽；已存在时保持原内容
    pub fn register_slot(&self, name: &str) {
        if let Ok(mut slots) = self.slots.write() {
            slots.entry(name.to_string()).or_default();
        }
    }

    /// 注销插槽并释放其内容；不存在时无操作
    pub fn unregister_slot(&self, name: &str) {
        let removed = match self.slots.write() {
            Ok(mut slots) => slots.remove(name),
            Err(_) => None,
        };
        if let Some(slot) = removed {
            if let Ok(mut entries) = slot.write() {
                entries.clear();
            }
        }
    }

    pub fn has_slot(&self, name: &str) -> bool {
        self.slot(name).is_some()
    }

    pub fn slot_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .read()
            .map(|slots| slots.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// 插槽数量
    pub fn size(&self) -> usize {
        self.slots.read().map(|slots| slots.len()).unwrap_or(0)
    }

    /// 整值替换写入
    pub fn set_value(&self, slot: &str, key: &str, value: CacheValue) -> Result<(), CacheError> {
        self.insert(slot, key, value, None)
    }

    /// 写入带过期时间的值；`ttl` 为零时不过期
    pub fn set_with_timeout(
        &self,
        slot: &str,
        key: &str,
        value: CacheValue,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        self.insert(slot, key, value, expires_at)
    }

    fn insert(
        &self,
        slot: &str,
        key: &str,
        value: CacheValue,
        expires_at: Option<Instant>,
    ) -> Result<(), CacheError> {
        let entries = self
            .slot(slot)
            .ok_or_else(|| CacheError::SlotNotFound(slot.to_string()))?;
        let mut entries = entries.write().map_err(|_| CacheError::LockFailed)?;
        entries.insert(
            key.to_string(),
            Entry {
                value: Arc::new(value),
                expires_at,
            },
        );
        Ok(())
    }

    /// 读单值快照；过期条目视为不存在
    pub fn get_value(&self, slot: &str, key: &str) -> Option<Arc<CacheValue>> {
        let entries = self.slot(slot)?;
        let entries = entries.read().ok()?;
        let entry = entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry.value.clone())
    }

    /// 读整个插槽快照；插槽不存在时返回 None
    pub fn get_slot(&self, slot: &str) -> Option<BTreeMap<String, Arc<CacheValue>>> {
        let entries = self.slot(slot)?;
        let entries = entries.read().ok()?;
        let now = Instant::now();
        Some(
            entries
                .iter()
                .filter(|(_, entry)| !entry.is_expired(now))
                .map(|(key, entry)| (key.clone(), entry.value.clone()))
                .collect(),
        )
    }

    pub fn delete_value(&self, slot: &str, key: &str) -> Result<bool, CacheError> {
        let entries = self
            .slot(slot)
            .ok_or_else(|| CacheError::SlotNotFound(slot.to_string()))?;
        let mut entries = entries.write().map_err(|_| CacheError::LockFailed)?;
        Ok(entries.remove(key).is_some())
    }

    /// 清空全部插槽，随后重建常驻插槽
    pub fn flush(&self) {
        let drained: Vec<Slot> = match self.slots.write() {
            Ok(mut slots) => slots.drain().map(|(_, slot)| slot).collect(),
            Err(_) => Vec::new(),
        };
        for slot in drained {
            if let Ok(mut entries) = slot.write() {
                entries.clear();
            }
        }
        self.register_well_known();
    }

    /// 删除所有已过期条目，返回删除数量
    pub fn sweep_expired(&self) -> usize {
        let slots: Vec<Slot> = self
            .slots
            .read()
            .map(|slots| slots.values().cloned().collect())
            .unwrap_or_default();
        let now = Instant::now();
        let mut removed = 0;
        for slot in slots {
            if let Ok(mut entries) = slot.write() {
                let before = entries.len();
                entries.retain(|_, entry| !entry.is_expired(now));
                removed += before - entries.len();
            }
        }
        removed
    }

    /// 启动后台过期清理任务
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.sweep_expired();
                        if removed > 0 {
                            debug!(target: "gateway.cache", removed, "expired_entries_swept");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Value;

    #[test]
    fn well_known_slots_survive_flush() {
        let cache = InterCache::new();
        cache.register_slot("DEVICE1");
        cache
            .set_value(DEFAULT_RULE_ENGINE_SLOT, "DEVICE1", CacheValue::error("DEVICE1", "timeout"))
            .expect("set");
        assert_eq!(cache.size(), 3);

        cache.flush();
        assert_eq!(cache.size(), 2);
        assert!(cache.has_slot(DATA_SCHEMA_SLOT));
        assert!(cache.get_value(DEFAULT_RULE_ENGINE_SLOT, "DEVICE1").is_none());
    }

    #[test]
    fn register_keeps_existing_values() {
        let cache = InterCache::new();
        cache.register_slot("S");
        cache
            .set_value("S", "k", CacheValue::ok("k", Value::Int(1)))
            .expect("set");
        cache.register_slot("S");
        assert!(cache.get_value("S", "k").is_some());
    }
}

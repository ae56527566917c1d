//! 点表内存实现
//!
//! 与 SQLite 实现保持相同约束：同一设备下 tag 唯一，新点位分配 UUID。

use crate::error::StorageError;
use crate::traits::PointStore;
use domain::{DataPoint, make_uuid};
use std::collections::HashMap;
use std::sync::RwLock;

/// 点位内存存储：设备 UUID -> 点位列表
pub struct InMemoryPointStore {
    points: RwLock<HashMap<String, Vec<DataPoint>>>,
}

impl InMemoryPointStore {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PointStore for InMemoryPointStore {
    async fn list_points(&self, device_uuid: &str) -> Result<Vec<DataPoint>, StorageError> {
        let points = self
            .points
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(points.get(device_uuid).cloned().unwrap_or_default())
    }

    async fn save_points(
        &self,
        device_uuid: &str,
        points: Vec<DataPoint>,
    ) -> Result<Vec<DataPoint>, StorageError> {
        let mut map = self
            .points
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        // 先在副本上演算，任何冲突都不落地
        let mut current = map.get(device_uuid).cloned().unwrap_or_default();
        let mut saved = Vec::with_capacity(points.len());
        for mut point in points {
            point.device_uuid = device_uuid.to_string();
            if point.is_new() {
                point.uuid = make_uuid("POINT");
            }
            if current
                .iter()
                .any(|item| item.tag == point.tag && item.uuid != point.uuid)
            {
                return Err(StorageError::new(format!(
                    "UNIQUE constraint failed: m_data_points.device_uuid, m_data_points.tag ({})",
                    point.tag
                )));
            }
            match current.iter_mut().find(|item| item.uuid == point.uuid) {
                Some(item) => *item = point.clone(),
                None => current.push(point.clone()),
            }
            saved.push(point);
        }
        map.insert(device_uuid.to_string(), current);
        Ok(saved)
    }

    async fn delete_points(
        &self,
        device_uuid: &str,
        uuids: &[String],
    ) -> Result<u64, StorageError> {
        let mut map = self
            .points
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(points) = map.get_mut(device_uuid) else {
            return Ok(0);
        };
        let before = points.len();
        points.retain(|point| !uuids.contains(&point.uuid));
        Ok((before - points.len()) as u64)
    }

    async fn delete_device_points(&self, device_uuid: &str) -> Result<u64, StorageError> {
        let mut map = self
            .points
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map
            .remove(device_uuid)
            .map(|points| points.len() as u64)
            .unwrap_or(0))
    }
}

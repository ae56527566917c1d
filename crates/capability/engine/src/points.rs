//! 设备点表维护
//!
//! 整批校验通过后才落库，落库后重启设备一次，使新点表生效。

use crate::engine::RuleEngine;
use crate::error::EngineError;
use crate::validator::PointValidator;
use domain::{DataPoint, EndpointConfig, EndpointKind};
use std::collections::{HashMap, HashSet};
use tracing::info;

impl RuleEngine {
    async fn require_device(&self, device_uuid: &str) -> Result<EndpointConfig, EngineError> {
        self.stores
            .endpoints
            .find_endpoint(EndpointKind::Device, device_uuid)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("device not exists:{}", device_uuid)))
    }

    pub async fn list_points(&self, device_uuid: &str) -> Result<Vec<DataPoint>, EngineError> {
        self.require_device(device_uuid).await?;
        Ok(self.stores.points.list_points(device_uuid).await?)
    }

    /// 批量新增或更新点位
    pub async fn save_points(
        &self,
        device_uuid: &str,
        points: Vec<DataPoint>,
    ) -> Result<Vec<DataPoint>, EngineError> {
        let device = self.require_device(device_uuid).await?;
        let validator = PointValidator::for_device_type(&device.type_name);
        for point in &points {
            validator.validate(point)?;
        }

        // 合并后的点表内 tag 必须唯一
        let existing = self.stores.points.list_points(device_uuid).await?;
        let mut merged: HashMap<String, String> = existing
            .into_iter()
            .map(|point| (point.uuid, point.tag))
            .collect();
        let mut fresh = Vec::new();
        for point in &points {
            if point.is_new() {
                fresh.push(point.tag.clone());
            } else {
                merged.insert(point.uuid.clone(), point.tag.clone());
            }
        }
        let mut seen = HashSet::new();
        for tag in merged.into_values().chain(fresh) {
            if !seen.insert(tag.clone()) {
                return Err(EngineError::validation(format!("duplicate tag: {}", tag)));
            }
        }

        let points = points
            .into_iter()
            .map(|mut point| {
                point.device_uuid = device_uuid.to_string();
                point
            })
            .collect();
        let saved = self.stores.points.save_points(device_uuid, points).await?;
        info!(
            target: "gateway.engine",
            device = %device_uuid,
            count = saved.len(),
            "points_saved"
        );
        self.restart_device(device_uuid).await?;
        Ok(saved)
    }

    /// 表格导入：缺失或为 0 的权重按 1 处理
    pub async fn import_points(
        &self,
        device_uuid: &str,
        points: Vec<DataPoint>,
    ) -> Result<Vec<DataPoint>, EngineError> {
        let points = points
            .into_iter()
            .map(DataPoint::with_default_weight)
            .collect();
        self.save_points(device_uuid, points).await
    }

    pub async fn delete_points(&self, device_uuid: &str, uuids: &[String]) -> Result<u64, EngineError> {
        self.require_device(device_uuid).await?;
        let deleted = self.stores.points.delete_points(device_uuid, uuids).await?;
        if deleted > 0 {
            self.restart_device(device_uuid).await?;
        }
        Ok(deleted)
    }
}

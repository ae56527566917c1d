//! 点位模型
//!
//! 各驱动共用同一点位形状，只有寻址部分按协议区分。
//! 可选字段保留为 `Option`，由点位校验器给出缺失提示。

use serde::{Deserialize, Serialize};

/// 协议相关寻址
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "protocol",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum PointAddress {
    /// Modbus：功能码 + 从站 + 地址 + 数量
    Modbus {
        function: Option<u8>,
        slaver_id: Option<u8>,
        address: Option<u16>,
        quantity: Option<u16>,
    },
    /// Siemens S7：`DB1.DBD0` 形式
    Siemens { address: String },
    Snmp { oid: String },
    Bacnet {
        object_type: String,
        object_id: Option<u32>,
    },
    /// DL/T-645、SZY206、M-Bus 等表计
    Meter { slaver_id: String, meter_type: String },
}

/// 设备点位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub device_uuid: String,
    /// 列名安全的标识，同时作为投影表字段名
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub alias: String,
    /// 采集周期（毫秒）
    pub frequency: Option<u64>,
    pub address: PointAddress,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub data_order: String,
    pub weight: Option<f64>,
}

impl DataPoint {
    /// 表格导入时权重解析为 0（或缺失）视为 1
    pub fn with_default_weight(mut self) -> Self {
        match self.weight {
            None => self.weight = Some(1.0),
            Some(w) if w == 0.0 => self.weight = Some(1.0),
            _ => {}
        }
        self
    }

    /// uuid 为空、`new` 或 `copy` 的行按新增处理
    pub fn is_new(&self) -> bool {
        matches!(self.uuid.as_str(), "" | "new" | "copy")
    }
}

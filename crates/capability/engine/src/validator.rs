//! 点位校验
//!
//! 新增、编辑、导入点位时都要按设备类型校验。所有设备共用
//! tag / alias / 采集周期 / 权重检查，寻址部分按协议区分。

use crate::error::EngineError;
use domain::{DataPoint, PointAddress};
use edge_storage::is_identifier;

const MAX_LABEL_LENGTH: usize = 64;
const MIN_FREQUENCY_MS: u64 = 50;
const MAX_FREQUENCY_MS: u64 = 100_000;

/// Modbus 主站 dataType -> 允许的 dataOrder
const MODBUS_ORDERS: &[(&str, &[&str])] = &[
    ("UTF8", &["BIG_ENDIAN", "LITTLE_ENDIAN"]),
    ("I", &["A"]),
    ("Q", &["A"]),
    ("BYTE", &["A"]),
    ("BOOL", &["A"]),
    ("INT16", &["AB", "BA"]),
    ("UINT16", &["AB", "BA"]),
    ("RAW", &["ABCD", "DCBA", "CDAB"]),
    ("INT", &["ABCD", "DCBA", "CDAB"]),
    ("INT32", &["ABCD", "DCBA", "CDAB"]),
    ("UINT", &["ABCD", "DCBA", "CDAB"]),
    ("UINT32", &["ABCD", "DCBA", "CDAB"]),
    ("FLOAT", &["ABCD", "DCBA", "CDAB"]),
    ("FLOAT32", &["ABCD", "DCBA", "CDAB"]),
    ("UFLOAT32", &["ABCD", "DCBA", "CDAB"]),
];

/// S7 与 Modbus 相同，去掉 BOOL / RAW / UTF8
const SIEMENS_ORDERS: &[(&str, &[&str])] = &[
    ("I", &["A"]),
    ("Q", &["A"]),
    ("BYTE", &["A"]),
    ("INT16", &["AB", "BA"]),
    ("UINT16", &["AB", "BA"]),
    ("INT", &["ABCD", "DCBA", "CDAB"]),
    ("INT32", &["ABCD", "DCBA", "CDAB"]),
    ("UINT", &["ABCD", "DCBA", "CDAB"]),
    ("UINT32", &["ABCD", "DCBA", "CDAB"]),
    ("FLOAT", &["ABCD", "DCBA", "CDAB"]),
    ("FLOAT32", &["ABCD", "DCBA", "CDAB"]),
    ("UFLOAT32", &["ABCD", "DCBA", "CDAB"]),
];

const BACNET_OBJECT_TYPES: &[&str] = &["AI", "AO", "AV", "BI", "BO", "BV", "MI", "MO", "MV"];

/// 点表协议族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointValidator {
    Modbus,
    Siemens,
    Snmp,
    Bacnet,
    Meter,
    /// 只做公共检查
    Common,
}

impl PointValidator {
    /// 按设备类型选择校验器
    pub fn for_device_type(device_type: &str) -> Self {
        match device_type {
            "GENERIC_MODBUS_MASTER" => Self::Modbus,
            "SIEMENS_PLC" => Self::Siemens,
            "GENERIC_SNMP" => Self::Snmp,
            "GENERIC_BACNET_IP" | "BACNET_ROUTER_GW" => Self::Bacnet,
            "DLT6452007_MASTER" | "CJT1882004_MASTER" | "SZY2062016_MASTER"
            | "GENERIC_MBUS_EN13433_MASTER" => Self::Meter,
            _ => Self::Common,
        }
    }

    pub fn validate(&self, point: &DataPoint) -> Result<(), EngineError> {
        check_label(&point.tag, "tag")?;
        check_label(&point.alias, "alias")?;
        if !is_identifier(&point.tag) {
            return Err(EngineError::validation(format!(
                "invalid tag name: {}",
                point.tag
            )));
        }
        check_frequency(point.frequency)?;

        match self {
            Self::Modbus => check_modbus(point)?,
            Self::Siemens => check_siemens(point)?,
            Self::Snmp => match &point.address {
                PointAddress::Snmp { oid } if !oid.is_empty() => {}
                PointAddress::Snmp { .. } => return Err(missing("oid")),
                _ => return Err(address_mismatch("SNMP")),
            },
            Self::Bacnet => check_bacnet(point)?,
            Self::Meter => match &point.address {
                PointAddress::Meter { slaver_id, .. } if slaver_id.is_empty() => {
                    return Err(missing("slaverId"));
                }
                PointAddress::Meter { meter_type, .. } if meter_type.is_empty() => {
                    return Err(missing("meterType"));
                }
                PointAddress::Meter { .. } => {}
                _ => return Err(address_mismatch("METER")),
            },
            Self::Common => {}
        }

        match point.weight {
            Some(weight) if weight.is_finite() => Ok(()),
            _ => Err(EngineError::validation("invalid weight value")),
        }
    }
}

fn check_label(value: &str, name: &str) -> Result<(), EngineError> {
    if value.is_empty() {
        return Err(missing(name));
    }
    if value.len() > MAX_LABEL_LENGTH {
        return Err(EngineError::validation(format!(
            "'{}' length must be in the range of 1-{}",
            name, MAX_LABEL_LENGTH
        )));
    }
    Ok(())
}

fn check_frequency(frequency: Option<u64>) -> Result<(), EngineError> {
    let frequency = frequency.ok_or_else(|| missing("frequency"))?;
    if frequency < MIN_FREQUENCY_MS {
        return Err(EngineError::validation("'frequency' must be greater than 50ms"));
    }
    if frequency > MAX_FREQUENCY_MS {
        return Err(EngineError::validation("'frequency' must be less than 100s"));
    }
    Ok(())
}

fn check_order(
    table: &[(&str, &[&str])],
    data_type: &str,
    data_order: &str,
) -> Result<(), EngineError> {
    let orders = table
        .iter()
        .find(|(name, _)| *name == data_type)
        .map(|(_, orders)| *orders)
        .ok_or_else(|| EngineError::validation(format!("invalid data type '{}'", data_type)))?;
    if !orders.contains(&data_order) {
        return Err(EngineError::validation(format!(
            "invalid '{}' order '{}'",
            data_type, data_order
        )));
    }
    Ok(())
}

fn check_modbus(point: &DataPoint) -> Result<(), EngineError> {
    let PointAddress::Modbus {
        function,
        slaver_id,
        address,
        quantity,
    } = &point.address
    else {
        return Err(address_mismatch("MODBUS"));
    };
    address.ok_or_else(|| missing("address"))?;
    let function = function.ok_or_else(|| missing("function"))?;
    if !(1..=4).contains(&function) {
        return Err(EngineError::validation(format!(
            "invalid function code: {}",
            function
        )));
    }
    slaver_id.ok_or_else(|| missing("slaverId"))?;
    quantity.ok_or_else(|| missing("quantity"))?;
    check_order(MODBUS_ORDERS, &point.data_type, &point.data_order)
}

fn check_siemens(point: &DataPoint) -> Result<(), EngineError> {
    let PointAddress::Siemens { address } = &point.address else {
        return Err(address_mismatch("SIEMENS"));
    };
    if address.is_empty() {
        return Err(missing("address"));
    }
    check_order(SIEMENS_ORDERS, &point.data_type, &point.data_order)
}

fn check_bacnet(point: &DataPoint) -> Result<(), EngineError> {
    let PointAddress::Bacnet {
        object_type,
        object_id,
    } = &point.address
    else {
        return Err(address_mismatch("BACNET"));
    };
    if !BACNET_OBJECT_TYPES.contains(&object_type.as_str()) {
        return Err(EngineError::validation(format!(
            "invalid objectType: {}",
            object_type
        )));
    }
    object_id.ok_or_else(|| missing("objectId"))?;
    Ok(())
}

fn missing(name: &str) -> EngineError {
    EngineError::validation(format!("missing required param '{}'", name))
}

fn address_mismatch(protocol: &str) -> EngineError {
    EngineError::validation(format!("point address is not a {} address", protocol))
}

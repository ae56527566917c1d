//! 属性校验器
//!
//! 缺失的上下界视为不设限；整数与浮点的上下界均为开区间。

use domain::{IotProperty, PropertyType, Value};
use regex::Regex;
use std::sync::OnceLock;

static GEO_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn geo_pattern() -> Option<&'static Regex> {
    GEO_PATTERN
        .get_or_init(|| Regex::new(r"^(-?\d+(\.\d+)?),\s*(-?\d+(\.\d+)?)$").ok())
        .as_ref()
}

/// 经纬度文本是否合法：格式匹配且 -90≤lat≤90、-180≤lon≤180
pub fn is_valid_geo(text: &str) -> bool {
    let Some(pattern) = geo_pattern() else {
        return false;
    };
    let Some(caps) = pattern.captures(text) else {
        return false;
    };
    let lat = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
    let lon = caps.get(3).and_then(|m| m.as_str().parse::<f64>().ok());
    match (lat, lon) {
        (Some(lat), Some(lon)) => geo_in_range(lat, lon),
        _ => false,
    }
}

fn geo_in_range(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValidator {
    String {
        max_length: Option<usize>,
    },
    Integer {
        min: Option<f64>,
        max: Option<f64>,
    },
    Float {
        min: Option<f64>,
        max: Option<f64>,
        /// 小数位，仅展示用
        round: Option<u32>,
    },
    Bool {
        true_label: Option<String>,
        false_label: Option<String>,
    },
    Geo,
}

fn within_open(v: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.is_none_or(|min| v > min) && max.is_none_or(|max| v < max)
}

impl PropertyValidator {
    pub fn from_property(property: &IotProperty) -> Self {
        let rule = &property.rule;
        match property.kind {
            PropertyType::String => PropertyValidator::String {
                max_length: rule.max.filter(|m| *m >= 0.0).map(|m| m as usize),
            },
            PropertyType::Integer => PropertyValidator::Integer {
                min: rule.min,
                max: rule.max,
            },
            PropertyType::Float => PropertyValidator::Float {
                min: rule.min,
                max: rule.max,
                round: rule.round,
            },
            PropertyType::Bool => PropertyValidator::Bool {
                true_label: rule.true_label.clone(),
                false_label: rule.false_label.clone(),
            },
            PropertyType::Geo => PropertyValidator::Geo,
        }
    }

    pub fn kind(&self) -> PropertyType {
        match self {
            PropertyValidator::String { .. } => PropertyType::String,
            PropertyValidator::Integer { .. } => PropertyType::Integer,
            PropertyValidator::Float { .. } => PropertyType::Float,
            PropertyValidator::Bool { .. } => PropertyType::Bool,
            PropertyValidator::Geo => PropertyType::Geo,
        }
    }

    /// 校验一个写入值，错误信息直接面向调用方
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match (self, value) {
            (PropertyValidator::String { max_length }, Value::String(s)) => {
                match max_length {
                    Some(max) if s.len() > *max => {
                        Err(format!("Value exceed Max Length:{}", s.len()))
                    }
                    _ => Ok(()),
                }
            }
            (PropertyValidator::String { .. }, other) => Err(format!(
                "Invalid String type: {}, Expect UTF8 string",
                other
            )),
            (PropertyValidator::Integer { min, max }, Value::Int(v)) => {
                if within_open(*v as f64, *min, *max) {
                    Ok(())
                } else {
                    Err(format!("Int value out of range:{}", v))
                }
            }
            (PropertyValidator::Integer { .. }, other) => Err(format!("Invalid Int type:{}", other)),
            (PropertyValidator::Float { min, max, .. }, Value::Float(v)) => {
                if within_open(*v, *min, *max) {
                    Ok(())
                } else {
                    Err(format!("Float value out of range:{}", v))
                }
            }
            (PropertyValidator::Float { min, max, .. }, Value::Int(v)) => {
                if within_open(*v as f64, *min, *max) {
                    Ok(())
                } else {
                    Err(format!("Float value out of range:{}", v))
                }
            }
            (PropertyValidator::Float { .. }, other) => {
                Err(format!("Invalid Float type:{}", other))
            }
            (PropertyValidator::Bool { .. }, Value::Bool(_)) => Ok(()),
            (PropertyValidator::Bool { .. }, other) => Err(format!("Invalid Bool type:{}", other)),
            (PropertyValidator::Geo, Value::String(s)) if is_valid_geo(s) => Ok(()),
            (PropertyValidator::Geo, Value::Geo { lat, lon }) if geo_in_range(*lat, *lon) => {
                Ok(())
            }
            (PropertyValidator::Geo, other) => Err(format!("Invalid Coordinate type:{}", other)),
        }
    }
}

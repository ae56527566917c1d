//! 规则求值
//!
//! 求值只根据规则与样本计算输出，不读写任何缓存。

use domain::{RuleAction, RuleConfig, Value};
use edge_protocol::Sample;
use std::collections::BTreeMap;

/// 规则输出
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutput {
    /// 投递到北向目标
    ToTarget { target: String, payload: String },
    /// 写入已发布的数据模型
    ToSchema {
        schema: String,
        row: BTreeMap<String, Value>,
    },
}

pub trait RuleEvaluator: Send + Sync {
    fn evaluate(&self, rule: &RuleConfig, sample: &Sample) -> Vec<RuleOutput>;
}

/// 默认求值器：逐条解释规则动作
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionEvaluator;

impl RuleEvaluator for ActionEvaluator {
    fn evaluate(&self, rule: &RuleConfig, sample: &Sample) -> Vec<RuleOutput> {
        let mut outputs = Vec::with_capacity(rule.actions.len());
        for action in &rule.actions {
            match action {
                RuleAction::DataToTarget { target } => outputs.push(RuleOutput::ToTarget {
                    target: target.clone(),
                    payload: sample.payload.to_string(),
                }),
                RuleAction::DataToSchema { schema, mapping } => {
                    let row = project_row(&sample.payload, mapping);
                    if !row.is_empty() {
                        outputs.push(RuleOutput::ToSchema {
                            schema: schema.clone(),
                            row,
                        });
                    }
                }
            }
        }
        outputs
    }
}

/// 按 属性名 -> tag 映射取值；映射为空时载荷的每个键都当作同名属性
fn project_row(
    payload: &serde_json::Value,
    mapping: &BTreeMap<String, String>,
) -> BTreeMap<String, Value> {
    let Some(object) = payload.as_object() else {
        return BTreeMap::new();
    };
    if mapping.is_empty() {
        return object
            .iter()
            .map(|(key, value)| (key.clone(), Value::from_json(value)))
            .collect();
    }
    mapping
        .iter()
        .filter_map(|(property, tag)| {
            object
                .get(tag)
                .map(|value| (property.clone(), Value::from_json(value)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::EndpointKind;

    #[test]
    fn actions_become_outputs() {
        let mut rule = RuleConfig::new("r");
        rule.actions = vec![
            RuleAction::DataToTarget {
                target: "OUTEND1".to_string(),
            },
            RuleAction::DataToSchema {
                schema: "SCHEMA1".to_string(),
                mapping: BTreeMap::from([("temperature".to_string(), "temp".to_string())]),
            },
        ];
        let sample = Sample::new(
            "DEVICE1",
            EndpointKind::Device,
            serde_json::json!({"temp": 21.5, "humidity": 40}),
        );

        let outputs = ActionEvaluator.evaluate(&rule, &sample);
        assert_eq!(outputs.len(), 2);
        assert_eq!(
            outputs[0],
            RuleOutput::ToTarget {
                target: "OUTEND1".to_string(),
                payload: sample.payload.to_string(),
            }
        );
        assert_eq!(
            outputs[1],
            RuleOutput::ToSchema {
                schema: "SCHEMA1".to_string(),
                row: BTreeMap::from([("temperature".to_string(), Value::Float(21.5))]),
            }
        );
    }

    #[test]
    fn unmapped_or_scalar_payloads_skip_schema_writes() {
        let mut rule = RuleConfig::new("r");
        rule.actions = vec![RuleAction::DataToSchema {
            schema: "SCHEMA1".to_string(),
            mapping: BTreeMap::from([("temperature".to_string(), "missing".to_string())]),
        }];
        let sample = Sample::new("IN1", EndpointKind::InEnd, serde_json::json!({"temp": 1}));
        assert!(ActionEvaluator.evaluate(&rule, &sample).is_empty());

        let scalar = Sample::new("IN1", EndpointKind::InEnd, serde_json::json!("text"));
        rule.actions = vec![RuleAction::DataToSchema {
            schema: "SCHEMA1".to_string(),
            mapping: BTreeMap::new(),
        }];
        assert!(ActionEvaluator.evaluate(&rule, &scalar).is_empty());
    }
}

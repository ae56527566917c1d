//! 规则内存实现

use crate::error::StorageError;
use crate::traits::RuleStore;
use domain::RuleConfig;
use std::sync::RwLock;

pub struct InMemoryRuleStore {
    rules: RwLock<Vec<RuleConfig>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list_rules(&self) -> Result<Vec<RuleConfig>, StorageError> {
        let rules = self
            .rules
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(rules.clone())
    }

    async fn find_rule(&self, uuid: &str) -> Result<Option<RuleConfig>, StorageError> {
        let rules = self
            .rules
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(rules.iter().find(|rule| rule.uuid == uuid).cloned())
    }

    async fn create_rule(&self, record: RuleConfig) -> Result<RuleConfig, StorageError> {
        let mut rules = self
            .rules
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if rules.iter().any(|rule| rule.uuid == record.uuid) {
            return Err(StorageError::new("rule exists"));
        }
        rules.push(record.clone());
        Ok(record)
    }

    async fn update_rule(&self, record: RuleConfig) -> Result<Option<RuleConfig>, StorageError> {
        let mut rules = self
            .rules
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match rules.iter_mut().find(|rule| rule.uuid == record.uuid) {
            Some(rule) => {
                *rule = record.clone();
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn delete_rule(&self, uuid: &str) -> Result<bool, StorageError> {
        let mut rules = self
            .rules
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let before = rules.len();
        rules.retain(|rule| rule.uuid != uuid);
        Ok(rules.len() != before)
    }
}

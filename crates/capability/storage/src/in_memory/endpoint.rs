//! 端点配置内存实现

use crate::error::StorageError;
use crate::traits::EndpointStore;
use domain::{EndpointConfig, EndpointKind};
use std::sync::RwLock;

/// 端点内存存储，按插入顺序保存
pub struct InMemoryEndpointStore {
    endpoints: RwLock<Vec<EndpointConfig>>,
}

impl InMemoryEndpointStore {
    pub fn new() -> Self {
        Self {
            endpoints: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryEndpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EndpointStore for InMemoryEndpointStore {
    async fn list_endpoints(
        &self,
        kind: EndpointKind,
    ) -> Result<Vec<EndpointConfig>, StorageError> {
        let items = self
            .endpoints
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(items.iter().filter(|item| item.kind == kind).cloned().collect())
    }

    async fn find_endpoint(
        &self,
        kind: EndpointKind,
        uuid: &str,
    ) -> Result<Option<EndpointConfig>, StorageError> {
        let items = self
            .endpoints
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(items
            .iter()
            .find(|item| item.kind == kind && item.uuid == uuid)
            .cloned())
    }

    async fn create_endpoint(
        &self,
        record: EndpointConfig,
    ) -> Result<EndpointConfig, StorageError> {
        let mut items = self
            .endpoints
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if items.iter().any(|item| item.uuid == record.uuid) {
            return Err(StorageError::new("endpoint exists"));
        }
        items.push(record.clone());
        Ok(record)
    }

    async fn update_endpoint(
        &self,
        record: EndpointConfig,
    ) -> Result<Option<EndpointConfig>, StorageError> {
        let mut items = self
            .endpoints
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match items
            .iter_mut()
            .find(|item| item.kind == record.kind && item.uuid == record.uuid)
        {
            Some(item) => {
                *item = record.clone();
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn delete_endpoint(&self, kind: EndpointKind, uuid: &str) -> Result<bool, StorageError> {
        let mut items = self
            .endpoints
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let before = items.len();
        items.retain(|item| !(item.kind == kind && item.uuid == uuid));
        Ok(items.len() != before)
    }
}

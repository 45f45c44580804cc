use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Persistence;
use crate::core::Result;

/// 进程内持久化（测试与演示用）
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    collections: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// 集合中的文档数
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|c| c.get(key))
            .cloned())
    }

    async fn put(&self, collection: &str, key: &str, value: serde_json::Value) -> Result<()> {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        if let Some(c) = self.collections.write().await.get_mut(collection) {
            c.remove(key);
        }
        Ok(())
    }

    async fn list_values(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }
}

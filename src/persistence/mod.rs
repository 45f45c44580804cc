//! 持久化协作方
//!
//! 引擎只通过 `Persistence` 读写 JSON 文档（collection + key），不关心底层存储格式。
//! 自带两种实现：进程内 `InMemoryPersistence`（测试用）与按集合落盘的 `JsonFilePersistence`。

mod json_file;
mod memory;

pub use json_file::JsonFilePersistence;
pub use memory::InMemoryPersistence;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::Result;

/// 会话归档集合
pub const SESSIONS_COLLECTION: &str = "tutoring_sessions";
/// 学习计划集合
pub const PLANS_COLLECTION: &str = "study_plans";
/// 离线队列集合（整队列存为单个文档，保证顺序）
pub const OFFLINE_QUEUE_COLLECTION: &str = "offline_queue";

/// 持久化接口
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<serde_json::Value>>;

    async fn put(&self, collection: &str, key: &str, value: serde_json::Value) -> Result<()>;

    async fn delete(&self, collection: &str, key: &str) -> Result<()>;

    /// 集合内全部文档（顺序不保证）
    async fn list_values(&self, collection: &str) -> Result<Vec<serde_json::Value>>;
}

/// 类型化读写辅助（serde 序列化到 JSON 文档）
pub async fn save<T: Serialize + Sync>(
    store: &dyn Persistence,
    collection: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    store
        .put(collection, key, serde_json::to_value(value)?)
        .await
}

pub async fn load<T: DeserializeOwned>(
    store: &dyn Persistence,
    collection: &str,
    key: &str,
) -> Result<Option<T>> {
    match store.get(collection, key).await? {
        Some(v) => Ok(Some(serde_json::from_value(v)?)),
        None => Ok(None),
    }
}

/// 读取整个集合；无法反序列化的文档跳过并记录警告
pub async fn load_all<T: DeserializeOwned>(
    store: &dyn Persistence,
    collection: &str,
) -> Result<Vec<T>> {
    let values = store.list_values(collection).await?;
    let mut items = Vec::with_capacity(values.len());
    for v in values {
        match serde_json::from_value(v) {
            Ok(item) => items.push(item),
            Err(e) => tracing::warn!("Skipping malformed document in '{}': {}", collection, e),
        }
    }
    Ok(items)
}

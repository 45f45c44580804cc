//! 文件持久化：每个集合一个 JSON 文件（key -> 文档）
//!
//! 写入先落到临时文件再 rename，避免进程中途退出留下半截文件。

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use super::Persistence;
use crate::core::Result;

type Collection = BTreeMap<String, serde_json::Value>;

#[derive(Debug)]
pub struct JsonFilePersistence {
    dir: PathBuf,
    /// 已加载的集合（首次访问时从磁盘读入）
    loaded: Mutex<HashMap<String, Collection>>,
}

impl JsonFilePersistence {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, collection: &str) -> PathBuf {
        let safe: String = collection
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    /// 文件不存在时返回空集合
    async fn read_collection(&self, collection: &str) -> Result<Collection> {
        let path = self.path_for(collection);
        match fs::read_to_string(&path).await {
            Ok(data) if data.trim().is_empty() => Ok(Collection::new()),
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Collection::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_collection(&self, collection: &str, docs: &Collection) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(collection);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(docs)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read<F, R>(&self, collection: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Collection) -> R,
    {
        let mut loaded = self.loaded.lock().await;
        if !loaded.contains_key(collection) {
            let docs = self.read_collection(collection).await?;
            loaded.insert(collection.to_string(), docs);
        }
        Ok(f(loaded.entry(collection.to_string()).or_default()))
    }

    /// 在副本上修改，写盘成功后才替换缓存；f 返回 false 表示无变化
    async fn update<F>(&self, collection: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Collection) -> bool,
    {
        let mut loaded = self.loaded.lock().await;
        if !loaded.contains_key(collection) {
            let docs = self.read_collection(collection).await?;
            loaded.insert(collection.to_string(), docs);
        }
        let docs = loaded.entry(collection.to_string()).or_default();
        let mut staged = docs.clone();
        if f(&mut staged) {
            self.write_collection(collection, &staged).await?;
            *docs = staged;
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for JsonFilePersistence {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<serde_json::Value>> {
        self.read(collection, |docs| docs.get(key).cloned()).await
    }

    async fn put(&self, collection: &str, key: &str, value: serde_json::Value) -> Result<()> {
        self.update(collection, |docs| {
            docs.insert(key.to_string(), value);
            true
        })
        .await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.update(collection, |docs| docs.remove(key).is_some()).await
    }

    async fn list_values(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
        self.read(collection, |docs| docs.values().cloned().collect()).await
    }
}

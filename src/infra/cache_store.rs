use crate::app::ports::CacheStorePort;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Raw responses stored as one JSON array per key under `root`.
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, String> {
        if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
            return Err(format!("invalid cache key: {}", key));
        }
        Ok(self.root.join(format!("raw_{}.json", key)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl CacheStorePort for FsCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<Value>>, String> {
        let path = self.path_for(key)?;
        if !tokio::fs::try_exists(&path).await.map_err(|e| e.to_string())? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| e.to_string())?;
        let records: Vec<Value> = serde_json::from_str(&content).map_err(|e| e.to_string())?;
        debug!("Loaded {} cached records from {}", records.len(), path.display());
        Ok(Some(records))
    }

    async fn put(&self, key: &str, records: &[Value]) -> Result<(), String> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| e.to_string())?;
        let body = serde_json::to_vec(records).map_err(|e| e.to_string())?;
        // Write-then-rename so a crash never leaves a truncated cache file behind
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(|e| e.to_string())?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), String> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Process-local store, used by tests and by callers embedding the pipeline.
#[derive(Default, Clone)]
pub struct InMemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, Vec<Value>>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().map(|e| e.contains_key(key)).unwrap_or(false)
    }
}

#[async_trait]
impl CacheStorePort for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<Value>>, String> {
        let entries = self.entries.lock().map_err(|e| e.to_string())?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, records: &[Value]) -> Result<(), String> {
        let mut entries = self.entries.lock().map_err(|e| e.to_string())?;
        entries.insert(key.to_string(), records.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), String> {
        let mut entries = self.entries.lock().map_err(|e| e.to_string())?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn fs_store_round_trips_and_removes() {
        let dir = tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());

        assert_eq!(store.get("population-1999-2023").await.unwrap(), None);

        let records = vec![json!({"PRD_DE": "1999", "DT": "10"})];
        store.put("population-1999-2023", &records).await.unwrap();
        assert_eq!(store.get("population-1999-2023").await.unwrap(), Some(records));

        store.remove("population-1999-2023").await.unwrap();
        assert_eq!(store.get("population-1999-2023").await.unwrap(), None);
        // Removing twice is fine
        store.remove("population-1999-2023").await.unwrap();
    }

    #[tokio::test]
    async fn fs_store_rejects_path_like_keys() {
        let dir = tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());
        assert!(store.get("../escape").await.is_err());
    }

    #[tokio::test]
    async fn malformed_cache_file_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("raw_cancer-1999-2023.json"), "{not json").unwrap();
        let store = FsCacheStore::new(dir.path());
        assert!(store.get("cancer-1999-2023").await.is_err());
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Durable string key-value store, the desktop stand-in for browser local storage.
///
/// Values are kept in memory and mirrored to a single JSON file. Writes go to a
/// `.json.tmp` sibling first and are then renamed over the main file.
#[derive(Debug, Clone)]
pub struct KvStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
    path: Option<PathBuf>,
}

impl KvStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            path: None,
        }
    }

    /// Opens the store at `path`. A corrupt file falls back to the temp copy, then to empty.
    pub async fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = read_map_with_tmp_fallback(&path).await;
        Self {
            inner: Arc::new(RwLock::new(data)),
            path: Some(path),
        }
    }

    /// Opens `cache_store.json` inside `dir`, creating the directory if needed.
    pub async fn load_from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(error = %e, "failed to create data dir");
        }
        Self::load_from(dir.join("cache_store.json")).await
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: &str, value: String) {
        self.set_many(vec![(key.to_owned(), value)]).await;
    }

    /// Applies every pair under one lock and persists once, so readers never
    /// observe a subset of the pairs.
    pub async fn set_many(&self, pairs: Vec<(String, String)>) {
        let mut inner = self.inner.write().await;
        for (key, value) in pairs {
            inner.insert(key, value);
        }
        // Persist under the guard so files land in the same order as updates.
        if let Err(err) = self.persist(&inner).await {
            warn!(%err, "failed to persist key-value store");
        }
    }

    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut keys: Vec<String> = inner
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    async fn persist(&self, data: &HashMap<String, String>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            debug!("key-value store is in-memory only; skipping persist");
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(data)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

async fn read_map_with_tmp_fallback(path: &Path) -> HashMap<String, String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to parse store, trying tmp fallback");
                let tmp = path.with_extension("json.tmp");
                match tokio::fs::read(&tmp).await {
                    Ok(tmp_bytes) => serde_json::from_slice(&tmp_bytes).unwrap_or_default(),
                    Err(_) => HashMap::new(),
                }
            }
        },
        Err(_) => HashMap::new(),
    }
}

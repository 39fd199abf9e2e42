use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::article::Article;
use crate::partition::Partition;
use crate::storage::KvStore;

/// Entries younger than this are served without touching the network.
pub const FRESHNESS_WINDOW_MS: i64 = 900_000;

const ARTICLES_PREFIX: &str = "scrollfeed_articles_";
const CACHE_TIME_PREFIX: &str = "scrollfeed_cache_time_";
const LAST_PARTITION_KEY: &str = "scrollfeed_last_partition";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub partition_key: String,
    pub articles: Vec<Article>,
    pub fetched_at: i64,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: i64) -> bool {
        is_fresh(self, now)
    }
}

/// Exclusive at the window boundary. An age that overflows `i64` counts as stale.
pub fn is_fresh(entry: &CacheEntry, now: i64) -> bool {
    now.checked_sub(entry.fetched_at)
        .is_some_and(|age| age < FRESHNESS_WINDOW_MS)
}

/// Last-known-good article snapshots, one per partition key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns `None` when nothing was written or the stored payload is unreadable.
    async fn read(&self, partition_key: &str) -> Option<CacheEntry>;

    /// Replaces the entry for `partition_key` with `articles` fetched at `now`.
    async fn write(&self, partition_key: &str, articles: &[Article], now: i64);

    async fn last_partition(&self) -> Option<Partition>;

    async fn set_last_partition(&self, partition: &Partition);
}

pub fn articles_key(partition_key: &str) -> String {
    format!("{ARTICLES_PREFIX}{}", partition_key.to_lowercase())
}

pub fn cache_time_key(partition_key: &str) -> String {
    format!("{CACHE_TIME_PREFIX}{}", partition_key.to_lowercase())
}

/// `CacheStore` laid out over a string key-value store: one key for the
/// serialized article list and one for the fetch timestamp.
#[derive(Debug, Clone)]
pub struct KvCacheStore {
    kv: KvStore,
}

impl KvCacheStore {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    pub fn in_memory() -> Self {
        Self::new(KvStore::in_memory())
    }

    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    /// Total articles held across `partition_keys`, stale entries included.
    pub async fn cached_article_count<I, S>(&self, partition_keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut total = 0;
        for key in partition_keys {
            if let Some(entry) = self.read(key.as_ref()).await {
                total += entry.articles.len();
            }
        }
        total
    }

    /// Partition keys that currently have an article list stored.
    pub async fn cached_partition_keys(&self) -> Vec<String> {
        self.kv
            .keys_with_prefix(ARTICLES_PREFIX)
            .await
            .into_iter()
            .filter_map(|k| k.strip_prefix(ARTICLES_PREFIX).map(ToOwned::to_owned))
            .collect()
    }
}

#[async_trait]
impl CacheStore for KvCacheStore {
    async fn read(&self, partition_key: &str) -> Option<CacheEntry> {
        let raw_articles = self.kv.get(&articles_key(partition_key)).await?;
        let raw_time = self.kv.get(&cache_time_key(partition_key)).await?;

        let articles = match serde_json::from_str::<Vec<Article>>(&raw_articles) {
            Ok(articles) => articles,
            Err(e) => {
                debug!(partition = %partition_key, error = %e, "cached articles unreadable, treating as miss");
                return None;
            }
        };
        let fetched_at = match raw_time.trim().parse::<i64>() {
            Ok(ts) => ts,
            Err(e) => {
                debug!(partition = %partition_key, error = %e, "cache timestamp unreadable, treating as miss");
                return None;
            }
        };

        Some(CacheEntry {
            partition_key: partition_key.to_lowercase(),
            articles,
            fetched_at,
        })
    }

    async fn write(&self, partition_key: &str, articles: &[Article], now: i64) {
        let payload = match serde_json::to_string(articles) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(partition = %partition_key, error = %e, "failed to serialize articles; cache left untouched");
                return;
            }
        };
        self.kv
            .set_many(vec![
                (articles_key(partition_key), payload),
                (cache_time_key(partition_key), now.to_string()),
            ])
            .await;
    }

    async fn last_partition(&self) -> Option<Partition> {
        let raw = self.kv.get(LAST_PARTITION_KEY).await?;
        serde_json::from_str(&raw).ok()
    }

    async fn set_last_partition(&self, partition: &Partition) {
        match serde_json::to_string(partition) {
            Ok(raw) => self.kv.set(LAST_PARTITION_KEY, raw).await,
            Err(e) => debug!(error = %e, "failed to serialize last partition"),
        }
    }
}

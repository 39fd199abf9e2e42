use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, warn};

use crate::article::Article;
use crate::error::FetchError;
use crate::partition::Partition;
use crate::storage::KvStore;
use crate::upstream::Upstream;

const REQUESTS_PREFIX: &str = "scrollfeed_requests_";

/// Issues exactly one GET for `partition` and normalizes the body.
pub async fn fetch_partition(
    client: &Client,
    upstream: &dyn Upstream,
    partition: &Partition,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<Article>, FetchError> {
    let url = upstream.request_url(partition, now)?;
    debug!(provider = upstream.name(), partition = %partition, "requesting articles");
    let response = client.get(url).timeout(timeout).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }
    let bytes = response.bytes().await?;
    upstream.normalize(&bytes, partition, now)
}

/// Per-day count of upstream requests, kept next to the article cache.
///
/// Providers cap free plans at a daily quota; the ledger only reports, it never blocks.
#[derive(Debug, Clone)]
pub struct RequestLedger {
    kv: KvStore,
    daily_limit: u32,
}

impl RequestLedger {
    pub fn new(kv: KvStore, daily_limit: u32) -> Self {
        Self { kv, daily_limit }
    }

    fn day_key(now: DateTime<Utc>) -> String {
        format!("{REQUESTS_PREFIX}{}", now.format("%Y-%m-%d"))
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub async fn requests_on(&self, now: DateTime<Utc>) -> u32 {
        self.kv
            .get(&Self::day_key(now))
            .await
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0)
    }

    /// Counts one request and returns the new total for the day.
    pub async fn record(&self, now: DateTime<Utc>) -> u32 {
        let total = self.requests_on(now).await.saturating_add(1);
        self.kv.set(&Self::day_key(now), total.to_string()).await;
        if total > self.daily_limit {
            warn!(total, limit = self.daily_limit, "daily upstream request quota exceeded");
        }
        total
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::article::Article;
use crate::cache::CacheStore;
use crate::clock::{Clock, SystemClock};
use crate::error::ErrorKind;
use crate::fetch::{fetch_partition, RequestLedger};
use crate::filter::filter_articles;
use crate::partition::{Category, Partition};
use crate::upstream::Upstream;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

/// What the view renders: the active partition, its articles and load status.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub partition: Option<Partition>,
    pub phase: Phase,
    /// Background revalidation over data already on screen; only set while `Ready`.
    pub refreshing: bool,
    pub articles: Vec<Article>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub search: String,
    pub fetched_at: Option<i64>,
}

impl FeedSnapshot {
    pub fn visible_articles(&self) -> Vec<&Article> {
        filter_articles(&self.articles, &self.search)
    }

    pub fn is_busy(&self) -> bool {
        self.phase == Phase::Loading || self.refreshing
    }
}

/// How a `load` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Served from a fresh cache entry without a request.
    Cached,
    /// Fetched and cached this many articles.
    Fetched(usize),
    /// The request failed; the last cached articles are shown with the error.
    StaleFallback,
    /// The request failed and nothing was cached.
    Failed,
    /// A newer load took over before this one finished; display untouched.
    Superseded,
}

#[derive(Debug, Default)]
struct FeedState {
    snapshot: FeedSnapshot,
    generation: u64,
}

/// Decides per request between cache hit, refetch and stale fallback, and
/// owns the displayed state for the single active partition.
#[derive(Clone)]
pub struct FeedCoordinator {
    cache: Arc<dyn CacheStore>,
    upstream: Arc<dyn Upstream>,
    client: Client,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    ledger: Option<RequestLedger>,
    state: Arc<RwLock<FeedState>>,
}

impl FeedCoordinator {
    pub fn new(cache: Arc<dyn CacheStore>, upstream: Arc<dyn Upstream>, client: Client) -> Self {
        Self {
            cache,
            upstream,
            client,
            clock: Arc::new(SystemClock),
            timeout: Duration::from_secs(10),
            ledger: None,
            state: Arc::new(RwLock::new(FeedState::default())),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ledger(mut self, ledger: RequestLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn ledger(&self) -> Option<&RequestLedger> {
        self.ledger.as_ref()
    }

    pub async fn snapshot(&self) -> FeedSnapshot {
        self.state.read().await.snapshot.clone()
    }

    /// Articles matching the current search term, in feed order.
    pub async fn visible_articles(&self) -> Vec<Article> {
        let state = self.state.read().await;
        state
            .snapshot
            .visible_articles()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn set_search(&self, term: impl Into<String>) {
        self.state.write().await.snapshot.search = term.into();
    }

    /// Switches to `partition`: clears the search term, remembers the choice and loads it.
    pub async fn select_partition(&self, partition: Partition) -> LoadOutcome {
        self.state.write().await.snapshot.search.clear();
        self.cache.set_last_partition(&partition).await;
        self.load(partition, false).await
    }

    /// Blank input is ignored.
    pub async fn select_location(&self, input: &str) -> Option<LoadOutcome> {
        let partition = Partition::location(input)?;
        Some(self.select_partition(partition).await)
    }

    pub async fn select_category(&self, category: Category) -> LoadOutcome {
        self.select_partition(Partition::Category(category)).await
    }

    /// Reopens the partition used last time, if any.
    pub async fn restore_last_partition(&self) -> Option<LoadOutcome> {
        let partition = self.cache.last_partition().await?;
        info!(partition = %partition, "restoring last partition");
        Some(self.load(partition, false).await)
    }

    /// Forced reload of the active partition; also serves as retry after an error.
    pub async fn refresh(&self) -> Option<LoadOutcome> {
        let partition = self.state.read().await.snapshot.partition.clone()?;
        Some(self.load(partition, true).await)
    }

    pub async fn load(&self, partition: Partition, force_refresh: bool) -> LoadOutcome {
        let key = partition.cache_key();
        let now = self.clock.now_ms();

        let token = {
            let mut state = self.state.write().await;
            state.generation += 1;
            if state.snapshot.partition.as_ref() != Some(&partition) {
                let search = std::mem::take(&mut state.snapshot.search);
                state.snapshot = FeedSnapshot {
                    partition: Some(partition.clone()),
                    search,
                    ..FeedSnapshot::default()
                };
            }
            state.generation
        };

        let cached = if force_refresh {
            None
        } else {
            self.cache.read(&key).await
        };

        {
            let mut state = self.state.write().await;
            if state.generation != token {
                return LoadOutcome::Superseded;
            }
            let snap = &mut state.snapshot;
            match cached {
                Some(entry) if entry.is_fresh(now) => {
                    debug!(partition = %key, age_ms = now.saturating_sub(entry.fetched_at), "serving fresh cache");
                    snap.articles = entry.articles;
                    snap.fetched_at = Some(entry.fetched_at);
                    snap.phase = Phase::Ready;
                    snap.refreshing = false;
                    snap.error = None;
                    snap.error_kind = None;
                    return LoadOutcome::Cached;
                }
                Some(entry) if snap.articles.is_empty() => {
                    // Stale data goes on screen while the refetch runs.
                    snap.articles = entry.articles;
                    snap.fetched_at = Some(entry.fetched_at);
                }
                _ => {}
            }
            snap.error = None;
            snap.error_kind = None;
            if snap.articles.is_empty() {
                snap.phase = Phase::Loading;
                snap.refreshing = false;
            } else {
                snap.phase = Phase::Ready;
                snap.refreshing = true;
            }
        }

        let now_utc = to_datetime(now);
        if let Some(ledger) = &self.ledger {
            ledger.record(now_utc).await;
        }
        let result = fetch_partition(
            &self.client,
            self.upstream.as_ref(),
            &partition,
            self.timeout,
            now_utc,
        )
        .await;

        match result {
            Ok(articles) => {
                let count = articles.len();
                self.cache.write(&key, &articles, now).await;
                let mut state = self.state.write().await;
                if state.generation != token {
                    debug!(partition = %key, "discarding superseded response");
                    return LoadOutcome::Superseded;
                }
                info!(partition = %key, count, "articles refreshed");
                let snap = &mut state.snapshot;
                snap.articles = articles;
                snap.fetched_at = Some(now);
                snap.phase = Phase::Ready;
                snap.refreshing = false;
                LoadOutcome::Fetched(count)
            }
            Err(err) => {
                warn!(partition = %key, error = %err, "failed to fetch articles");
                let stale = self.cache.read(&key).await;
                let mut state = self.state.write().await;
                if state.generation != token {
                    return LoadOutcome::Superseded;
                }
                let snap = &mut state.snapshot;
                snap.phase = Phase::Error;
                snap.refreshing = false;
                snap.error = Some(err.to_string());
                snap.error_kind = Some(err.kind());
                match stale {
                    Some(entry) => {
                        snap.articles = entry.articles;
                        snap.fetched_at = Some(entry.fetched_at);
                        LoadOutcome::StaleFallback
                    }
                    None => {
                        snap.articles.clear();
                        snap.fetched_at = None;
                        LoadOutcome::Failed
                    }
                }
            }
        }
    }
}

fn to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

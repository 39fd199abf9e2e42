pub mod article;
pub mod cache;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod partition;
pub mod relative_time;
pub mod storage;
pub mod upstream;

pub use article::Article;
pub use cache::{is_fresh, CacheEntry, CacheStore, KvCacheStore, FRESHNESS_WINDOW_MS};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, FeedMode, FetchConfig, ProviderConfig, ProviderKind};
pub use coordinator::{FeedCoordinator, FeedSnapshot, LoadOutcome, Phase};
pub use error::{ErrorKind, FetchError, StoreError};
pub use fetch::{fetch_partition, RequestLedger};
pub use filter::{filter_articles, matches};
pub use partition::{Category, Partition};
pub use relative_time::relative_label;
pub use storage::KvStore;
pub use upstream::{upstream_from_config, GNewsSource, GuardianSource, NewsApiSource, QueryOptions, Upstream};

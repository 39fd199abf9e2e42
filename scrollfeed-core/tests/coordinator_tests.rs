use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use reqwest::Client;
use scrollfeed_core::{
    Article, CacheStore, Category, FeedCoordinator, GuardianSource, KvCacheStore, LoadOutcome,
    ManualClock, NewsApiSource, Partition, Phase, QueryOptions, RequestLedger,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const T0: i64 = 1_729_500_000_000;

fn guardian_body(titles: &[&str]) -> serde_json::Value {
    let results: Vec<serde_json::Value> = titles
        .iter()
        .enumerate()
        .map(|(i, t)| {
            serde_json::json!({
                "webTitle": t,
                "webUrl": format!("https://www.theguardian.com/{i}"),
                "webPublicationDate": "2024-10-21T07:28:00Z",
                "sectionName": "World news",
                "fields": { "trailText": format!("About {t}") }
            })
        })
        .collect();
    serde_json::json!({ "response": { "status": "ok", "results": results } })
}

fn cached_article(title: &str) -> Article {
    Article {
        title: title.into(),
        description: String::new(),
        url: "https://example.com".into(),
        published_at: Utc.with_ymd_and_hms(2024, 10, 20, 10, 0, 0).unwrap(),
        source_name: "The Guardian".into(),
        image_url: None,
        category_tag: None,
    }
}

fn tokyo_key() -> String {
    Partition::Location("Tokyo".into()).cache_key()
}

struct Harness {
    coordinator: FeedCoordinator,
    cache: Arc<KvCacheStore>,
    clock: ManualClock,
}

fn harness(base_url: &str, cache: Arc<KvCacheStore>) -> Harness {
    let clock = ManualClock::new(T0);
    let mut source = GuardianSource::new("test-key", QueryOptions::default());
    source.base_url = base_url.to_owned();
    let coordinator = FeedCoordinator::new(cache.clone(), Arc::new(source), Client::new())
        .with_clock(Arc::new(clock.clone()))
        .with_timeout(Duration::from_secs(2));
    Harness {
        coordinator,
        cache,
        clock,
    }
}

/// Base URL of a port nothing listens on.
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

#[tokio::test]
async fn second_load_within_window_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Tokyo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(guardian_body(&["A", "B"])))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri(), Arc::new(KvCacheStore::in_memory()));
    let tokyo = Partition::Location("Tokyo".into());

    assert_eq!(h.coordinator.load(tokyo.clone(), false).await, LoadOutcome::Fetched(2));
    h.clock.advance(899_999);
    assert_eq!(h.coordinator.load(tokyo, false).await, LoadOutcome::Cached);

    let snap = h.coordinator.snapshot().await;
    assert_eq!(snap.phase, Phase::Ready);
    assert!(!snap.refreshing);
    assert_eq!(snap.articles.len(), 2);
    assert_eq!(snap.fetched_at, Some(T0));
}

#[tokio::test]
async fn expired_entry_is_refetched_and_replaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(guardian_body(&["Fresh"])))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(KvCacheStore::in_memory());
    cache.write(&tokyo_key(), &[cached_article("Old")], T0).await;
    let h = harness(&server.uri(), cache);
    h.clock.advance(900_000);

    let outcome = h
        .coordinator
        .load(Partition::Location("Tokyo".into()), false)
        .await;
    assert_eq!(outcome, LoadOutcome::Fetched(1));

    let entry = h.cache.read(&tokyo_key()).await.unwrap();
    assert_eq!(entry.articles[0].title, "Fresh");
    assert_eq!(entry.fetched_at, T0 + 900_000);
}

#[tokio::test]
async fn every_loaded_article_has_a_title() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(guardian_body(&["One", "", "  ", "Two"])))
        .mount(&server)
        .await;

    let h = harness(&server.uri(), Arc::new(KvCacheStore::in_memory()));
    h.coordinator.select_location("London").await;

    let snap = h.coordinator.snapshot().await;
    assert_eq!(snap.articles.len(), 2);
    assert!(snap.articles.iter().all(|a| !a.title.trim().is_empty()));
}

#[tokio::test]
async fn network_failure_falls_back_to_cached_articles() {
    let cache = Arc::new(KvCacheStore::in_memory());
    let prior = vec![cached_article("A"), cached_article("B"), cached_article("C")];
    cache.write(&tokyo_key(), &prior, T0 - 60_000).await;

    let h = harness(&closed_port_url(), cache);
    let outcome = h
        .coordinator
        .load(Partition::Location("Tokyo".into()), true)
        .await;

    assert_eq!(outcome, LoadOutcome::StaleFallback);
    let snap = h.coordinator.snapshot().await;
    assert_eq!(snap.phase, Phase::Error);
    assert!(snap.error.is_some());
    assert_eq!(snap.error_kind, Some(scrollfeed_core::ErrorKind::Network));
    assert_eq!(snap.articles, prior);
    assert!(!snap.refreshing);
}

#[tokio::test]
async fn failed_forced_refresh_keeps_previous_articles() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(guardian_body(&["A", "B", "C"])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let h = harness(&server.uri(), Arc::new(KvCacheStore::in_memory()));
    h.coordinator.select_location("Tokyo").await;
    let before = h.coordinator.snapshot().await.articles;
    assert_eq!(before.len(), 3);

    assert_eq!(h.coordinator.refresh().await, Some(LoadOutcome::StaleFallback));
    let snap = h.coordinator.snapshot().await;
    assert_eq!(snap.phase, Phase::Error);
    assert_eq!(snap.articles, before);
    assert!(snap.error.unwrap().contains("503"));
}

#[tokio::test]
async fn failure_without_cache_is_an_empty_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": { "status": "error", "message": "Invalid authentication credentials" }
        })))
        .mount(&server)
        .await;

    let h = harness(&server.uri(), Arc::new(KvCacheStore::in_memory()));
    let outcome = h.coordinator.select_location("Atlantis").await;

    assert_eq!(outcome, Some(LoadOutcome::Failed));
    let snap = h.coordinator.snapshot().await;
    assert_eq!(snap.phase, Phase::Error);
    assert!(snap.articles.is_empty());
    assert_eq!(
        snap.error.as_deref(),
        Some("upstream error: Invalid authentication credentials")
    );
    let atlantis = Partition::Location("Atlantis".into()).cache_key();
    assert!(h.cache.read(&atlantis).await.is_none());
}

#[tokio::test]
async fn search_filters_the_displayed_articles() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(guardian_body(&[
            "Market rally continues",
            "Local weather update",
        ])))
        .mount(&server)
        .await;

    let h = harness(&server.uri(), Arc::new(KvCacheStore::in_memory()));
    h.coordinator.select_location("New York").await;

    h.coordinator.set_search("market").await;
    let visible = h.coordinator.visible_articles().await;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].title, "Market rally continues");

    h.coordinator.set_search("").await;
    assert_eq!(h.coordinator.visible_articles().await.len(), 2);
}

#[tokio::test]
async fn switching_category_clears_search_and_loads_independently() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/top-headlines"))
        .and(query_param("category", "technology"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "articles": [
                { "title": "Chip news", "url": "https://e/1", "source": { "name": "Wired" } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(KvCacheStore::in_memory());
    let world_key = Partition::Category(Category::World).cache_key();
    cache
        .write(&world_key, &[cached_article("World story")], T0)
        .await;

    let mut source = NewsApiSource::new("key", QueryOptions::default());
    source.base_url = server.uri();
    let clock = ManualClock::new(T0);
    let coordinator = FeedCoordinator::new(cache.clone(), Arc::new(source), Client::new())
        .with_clock(Arc::new(clock));

    assert_eq!(
        coordinator.select_category(Category::World).await,
        LoadOutcome::Cached
    );
    coordinator.set_search("story").await;

    let outcome = coordinator.select_category(Category::Technology).await;
    assert_eq!(outcome, LoadOutcome::Fetched(1));

    let snap = coordinator.snapshot().await;
    assert_eq!(snap.search, "");
    assert_eq!(snap.partition, Some(Partition::Category(Category::Technology)));
    assert_eq!(snap.articles.len(), 1);
    assert_eq!(snap.articles[0].category_tag.as_deref(), Some("technology"));
    assert_eq!(cache.read(&world_key).await.unwrap().articles.len(), 1);
}

#[tokio::test]
async fn superseded_response_does_not_overwrite_active_partition() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", "Tokyo"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(guardian_body(&["Tokyo story"]))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("q", "London"))
        .respond_with(ResponseTemplate::new(200).set_body_json(guardian_body(&["London story"])))
        .mount(&server)
        .await;

    let h = harness(&server.uri(), Arc::new(KvCacheStore::in_memory()));
    let slow = {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move { coordinator.select_location("Tokyo").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let fast = h.coordinator.select_location("London").await;
    assert_eq!(fast, Some(LoadOutcome::Fetched(1)));
    assert_eq!(slow.await.unwrap(), Some(LoadOutcome::Superseded));

    let snap = h.coordinator.snapshot().await;
    assert_eq!(snap.partition, Some(Partition::Location("London".into())));
    assert_eq!(snap.articles[0].title, "London story");
    // The late response is still good data for its own partition.
    assert!(h.cache.read(&tokyo_key()).await.is_some());
}

#[tokio::test]
async fn refresh_marks_existing_data_as_refreshing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(guardian_body(&["A"]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let cache = Arc::new(KvCacheStore::in_memory());
    let paris_key = Partition::Location("Paris".into()).cache_key();
    cache
        .write(&paris_key, &[cached_article("Cached")], T0)
        .await;
    let h = harness(&server.uri(), cache);
    h.coordinator.select_location("Paris").await;

    let running = {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move { coordinator.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let during = h.coordinator.snapshot().await;
    assert_eq!(during.phase, Phase::Ready);
    assert!(during.refreshing);
    assert_eq!(during.articles[0].title, "Cached");

    assert_eq!(running.await.unwrap(), Some(LoadOutcome::Fetched(1)));
    let after = h.coordinator.snapshot().await;
    assert!(!after.refreshing);
    assert_eq!(after.articles[0].title, "A");
}

#[tokio::test]
async fn last_partition_is_restored_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(guardian_body(&["A"])))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(KvCacheStore::in_memory());
    let first = harness(&server.uri(), cache.clone());
    first.coordinator.select_location("  Sydney ").await;

    let second = harness(&server.uri(), cache);
    assert_eq!(
        second.coordinator.restore_last_partition().await,
        Some(LoadOutcome::Cached)
    );
    let snap = second.coordinator.snapshot().await;
    assert_eq!(snap.partition, Some(Partition::Location("Sydney".into())));
}

#[tokio::test]
async fn blank_location_is_ignored() {
    let h = harness(&closed_port_url(), Arc::new(KvCacheStore::in_memory()));
    assert_eq!(h.coordinator.select_location("   ").await, None);
    assert_eq!(h.coordinator.refresh().await, None);
    assert_eq!(h.coordinator.snapshot().await.phase, Phase::Idle);
}

#[tokio::test]
async fn ledger_counts_each_network_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(guardian_body(&["A"])))
        .expect(2)
        .mount(&server)
        .await;

    let cache = Arc::new(KvCacheStore::in_memory());
    let ledger = RequestLedger::new(cache.kv().clone(), 100);
    let h = harness(&server.uri(), cache);
    let coordinator = h.coordinator.with_ledger(ledger.clone());

    coordinator.select_location("Tokyo").await;
    coordinator.select_location("Tokyo").await;
    coordinator.refresh().await;

    let day = Utc.timestamp_millis_opt(T0).unwrap();
    assert_eq!(ledger.requests_on(day).await, 2);
}

#[tokio::test]
async fn location_named_like_a_category_is_fetched_not_served_from_category_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Business"))
        .respond_with(ResponseTemplate::new(200).set_body_json(guardian_body(&["Local story"])))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(KvCacheStore::in_memory());
    let mut headline = cached_article("Category headline");
    headline.category_tag = Some("business".into());
    cache
        .write(&Partition::Category(Category::Business).cache_key(), &[headline], T0)
        .await;
    let h = harness(&server.uri(), cache);
    h.clock.advance(1_000);

    let outcome = h.coordinator.select_location("Business").await;
    assert_eq!(outcome, Some(LoadOutcome::Fetched(1)));

    let snap = h.coordinator.snapshot().await;
    assert_eq!(snap.articles[0].title, "Local story");
    assert_eq!(snap.articles[0].category_tag, None);
}

#[tokio::test]
async fn expired_entry_is_shown_while_refetching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(guardian_body(&["Fresh"]))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(KvCacheStore::in_memory());
    cache
        .write(&tokyo_key(), &[cached_article("Old")], T0)
        .await;
    let h = harness(&server.uri(), cache);
    h.clock.advance(900_000);

    let running = {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move { coordinator.select_location("Tokyo").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let during = h.coordinator.snapshot().await;
    assert_eq!(during.phase, Phase::Ready);
    assert!(during.refreshing);
    assert_eq!(during.articles[0].title, "Old");
    assert_eq!(during.fetched_at, Some(T0));

    assert_eq!(running.await.unwrap(), Some(LoadOutcome::Fetched(1)));
    let after = h.coordinator.snapshot().await;
    assert!(!after.refreshing);
    assert_eq!(after.articles[0].title, "Fresh");
    assert_eq!(after.fetched_at, Some(T0 + 900_000));
}

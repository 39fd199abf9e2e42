use chrono::{TimeZone, Utc};
use scrollfeed_core::cache::{articles_key, cache_time_key};
use scrollfeed_core::{
    is_fresh, Article, CacheStore, Category, KvCacheStore, KvStore, Partition, FRESHNESS_WINDOW_MS,
};

fn article(title: &str) -> Article {
    Article {
        title: title.into(),
        description: format!("{title} description"),
        url: format!("https://example.com/{}", title.replace(' ', "-")),
        published_at: Utc.with_ymd_and_hms(2024, 10, 21, 7, 28, 0).unwrap(),
        source_name: "World news".into(),
        image_url: Some("https://example.com/thumb.jpg".into()),
        category_tag: None,
    }
}

fn temp_dir(tag: &str) -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "scrollfeed_{}_{}",
        tag,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    dir
}

#[tokio::test]
async fn write_then_read_returns_exact_entry() {
    let store = KvCacheStore::in_memory();
    let articles = vec![article("A"), article("B")];

    store.write("tokyo", &articles, 1_000).await;
    let entry = store.read("tokyo").await.expect("entry written");

    assert_eq!(entry.articles, articles);
    assert_eq!(entry.fetched_at, 1_000);
    assert_eq!(entry.partition_key, "tokyo");
}

#[tokio::test]
async fn write_overwrites_previous_entry() {
    let store = KvCacheStore::in_memory();
    store.write("world", &[article("old")], 1).await;
    store.write("world", &[article("new 1"), article("new 2")], 2).await;

    let entry = store.read("world").await.unwrap();
    assert_eq!(entry.articles.len(), 2);
    assert_eq!(entry.fetched_at, 2);
}

#[tokio::test]
async fn missing_key_is_absent() {
    let store = KvCacheStore::in_memory();
    assert!(store.read("nowhere").await.is_none());
}

#[tokio::test]
async fn staleness_boundary_is_exclusive() {
    let store = KvCacheStore::in_memory();
    store.write("paris", &[article("A")], 5_000).await;
    let entry = store.read("paris").await.unwrap();

    assert!(is_fresh(&entry, 5_000 + 899_999));
    assert!(!is_fresh(&entry, 5_000 + 900_000));
    assert!(entry.is_fresh(5_000 + FRESHNESS_WINDOW_MS - 1));
}

#[tokio::test]
async fn corrupt_payload_reads_as_absent() {
    let kv = KvStore::in_memory();
    let store = KvCacheStore::new(kv.clone());

    kv.set(&articles_key("london"), "[{ not json".into()).await;
    kv.set(&cache_time_key("london"), "1000".into()).await;
    assert!(store.read("london").await.is_none());

    store.write("berlin", &[article("A")], 1_000).await;
    kv.set(&cache_time_key("berlin"), "yesterday".into()).await;
    assert!(store.read("berlin").await.is_none());
}

#[tokio::test]
async fn entries_survive_reopening_the_file_store() {
    let dir = temp_dir("reload");

    let kv = KvStore::load_from_dir(&dir).await;
    let store = KvCacheStore::new(kv);
    store.write("tokyo", &[article("A"), article("B"), article("C")], 42).await;
    store
        .set_last_partition(&Partition::Location("Tokyo".into()))
        .await;

    let reopened = KvCacheStore::new(KvStore::load_from_dir(&dir).await);
    let entry = reopened.read("tokyo").await.expect("persisted entry");
    assert_eq!(entry.articles.len(), 3);
    assert_eq!(entry.fetched_at, 42);
    assert_eq!(
        reopened.last_partition().await,
        Some(Partition::Location("Tokyo".into()))
    );

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn corrupted_store_file_falls_back_to_tmp_copy() {
    let dir = temp_dir("corrupt");
    tokio::fs::create_dir_all(&dir).await.unwrap();

    let good = KvCacheStore::in_memory();
    good.write("sydney", &[article("A")], 7).await;
    let mut map = std::collections::HashMap::new();
    map.insert(
        articles_key("sydney"),
        good.kv().get(&articles_key("sydney")).await.unwrap(),
    );
    map.insert(cache_time_key("sydney"), "7".to_string());

    tokio::fs::write(dir.join("cache_store.json"), b"{ this is not json ")
        .await
        .unwrap();
    tokio::fs::write(
        dir.join("cache_store.json.tmp"),
        serde_json::to_vec(&map).unwrap(),
    )
    .await
    .unwrap();

    let store = KvCacheStore::new(KvStore::load_from_dir(&dir).await);
    let entry = store.read("sydney").await.expect("should fall back to tmp file");
    assert_eq!(entry.fetched_at, 7);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn counts_cached_articles_across_partitions() {
    let store = KvCacheStore::in_memory();
    let world = Partition::Category(Category::World).cache_key();
    let health = Partition::Category(Category::Health).cache_key();
    store.write(&world, &[article("A"), article("B")], 1).await;
    store.write(&health, &[article("C")], 1).await;

    let keys = Category::ALL.map(|c| Partition::Category(c).cache_key());
    assert_eq!(store.cached_article_count(&keys).await, 3);
    assert_eq!(store.cached_partition_keys().await, vec![health, world]);
}

#[tokio::test]
async fn location_and_category_with_same_name_are_kept_apart() {
    let store = KvCacheStore::in_memory();
    let category = Partition::Category(Category::Business).cache_key();
    let location = Partition::location("Business").unwrap().cache_key();

    store.write(&category, &[article("Category headline")], 1_000).await;
    assert!(store.read(&location).await.is_none());

    store.write(&location, &[article("Local one"), article("Local two")], 2_000).await;
    assert_eq!(store.read(&category).await.unwrap().articles.len(), 1);
    assert_eq!(store.read(&location).await.unwrap().articles.len(), 2);
}

#[tokio::test]
async fn extreme_stored_timestamp_reads_as_stale() {
    let store = KvCacheStore::in_memory();
    let key = Partition::location("Tokyo").unwrap().cache_key();
    store.write(&key, &[article("A")], 1_000).await;
    store.kv().set(&cache_time_key(&key), i64::MIN.to_string()).await;

    let entry = store.read(&key).await.expect("parsable timestamp is kept");
    assert_eq!(entry.fetched_at, i64::MIN);
    assert!(!entry.is_fresh(1_729_500_000_000));
    assert!(!is_fresh(&entry, i64::MAX));
}

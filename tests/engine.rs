// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! End-to-end behaviour of the cache engine and feed service over the
//! in-memory backends, plus one pass over a SQLite database file.
//!
//! Run with: `cargo test --test engine`

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;

use feed_cache::record::{news_snapshot, video_snapshot};
use feed_cache::{
    Collection, CollectionConfig, CreateResponse, DeleteBatchRequest, FeedCacheConfig, FeedError, FeedService, Feeds,
    InMemorySource, InMemoryStore, ListParams, ListResponse, NewsRecord, Origin, SortedSetCache, SortedSetStore,
    SqlSource, VideoRecord,
};

// =============================================================================
// Fixtures
// =============================================================================

fn news(id: i64, ts: Option<i64>) -> NewsRecord {
    NewsRecord {
        id,
        title: format!("Story {}", id),
        summary: format!("Summary of story {}", id),
        source: format!("https://example.com/news/{}", id),
        imageurl: Some(format!("https://img.example.com/{}.jpg", id)),
        timestamp: ts.map(|s| Utc.timestamp_opt(1_700_000_000 + s, 0).unwrap()),
        score: Some(id as f64 / 10.0),
        topic_id: Some(1),
        category_id: None,
    }
}

struct Harness {
    cache: Arc<SortedSetCache<NewsRecord>>,
    service: FeedService<NewsRecord>,
    store: Arc<InMemoryStore>,
    source: Arc<InMemorySource<NewsRecord>>,
}

fn harness(records: Vec<NewsRecord>) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let source = Arc::new(InMemorySource::with_records(records));
    let collection = Collection::new(&CollectionConfig::new("news", "News"), news_snapshot);
    let cache = Arc::new(SortedSetCache::new(collection, store.clone(), source.clone()));
    let service = FeedService::new(cache.clone(), &FeedCacheConfig::default());
    Harness { cache, service, store, source }
}

fn ids(items: &[feed_cache::Snapshot]) -> Vec<i64> {
    items.iter().map(|s| s.id).collect()
}

// =============================================================================
// Pagination
// =============================================================================

#[tokio::test]
async fn twenty_five_records_paginate_ten_ten_five() {
    let h = harness((1..=25).map(|i| news(i, Some(i))).collect());

    let p1 = h.cache.get_paginated(1, 10).await.unwrap();
    let p2 = h.cache.get_paginated(2, 10).await.unwrap();
    let p3 = h.cache.get_paginated(3, 10).await.unwrap();

    assert_eq!(p1.items.len(), 10);
    assert_eq!(p2.items.len(), 10);
    assert_eq!(p3.items.len(), 5);
    for page in [&p1, &p2, &p3] {
        assert_eq!(page.total, 25);
        assert_eq!(page.pages, 3);
    }

    let mut all = ids(&p1.items);
    all.extend(ids(&p2.items));
    all.extend(ids(&p3.items));
    assert_eq!(all, (1..=25).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn untimed_record_scores_zero_and_sorts_last() {
    let h = harness((1..=3).map(|i| news(i, Some(i))).collect());
    h.cache.warm().await.unwrap();

    h.cache.add(&news(99, None)).await.unwrap();

    assert_eq!(h.store.score("news:all", "news:99"), Some(0.0));
    let page = h.cache.get_paginated(1, 10).await.unwrap();
    assert_eq!(ids(&page.items), vec![3, 2, 1, 99]);
    assert_eq!(page.items[3].get("timestamp"), Some(&serde_json::Value::Null));
}

#[tokio::test]
async fn snapshot_carries_record_fields() {
    let h = harness(vec![news(4, Some(4))]);

    let page = h.cache.get_paginated(1, 1).await.unwrap();
    let item = &page.items[0];

    assert_eq!(item.get("title"), Some(&json!("Story 4")));
    assert_eq!(item.get("imageurl"), Some(&json!("https://img.example.com/4.jpg")));
    assert_eq!(item.get("score"), Some(&json!(0.4)));
    assert_eq!(item.get("topic_id"), Some(&json!(1)));
    assert_eq!(item.get("category_id"), Some(&serde_json::Value::Null));
}

// =============================================================================
// Warm / Flush / Delete
// =============================================================================

#[tokio::test]
async fn warm_twice_yields_same_membership() {
    let h = harness((1..=12).map(|i| news(i, Some(i))).collect());

    let first = h.cache.warm().await.unwrap();
    let members_first = h.store.zrange("news:all", 0, -1).await.unwrap();
    let second = h.cache.warm().await.unwrap();
    let members_second = h.store.zrange("news:all", 0, -1).await.unwrap();

    assert_eq!(first, 12);
    assert_eq!(second, 12);
    assert_eq!(members_first, members_second);
}

#[tokio::test]
async fn flush_leaves_collection_unpopulated() {
    let h = harness((1..=5).map(|i| news(i, Some(i))).collect());
    h.cache.warm().await.unwrap();

    h.cache.flush().await.unwrap();

    assert!(!h.cache.is_populated().await.unwrap());
    assert_eq!(h.cache.stats().await.unwrap().total_items, 0);
}

#[tokio::test]
async fn deleted_id_never_returned() {
    let h = harness((1..=5).map(|i| news(i, Some(i))).collect());
    h.cache.warm().await.unwrap();

    h.cache.delete(3).await.unwrap();

    assert_eq!(h.store.score("news:all", "news:3"), None);
    assert!(h.store.get_raw("news:obj:3").is_none());
    for page in 1..=3 {
        let items = h.cache.get_paginated(page, 2).await.unwrap().items;
        assert!(!ids(&items).contains(&3));
    }
}

// =============================================================================
// Backfill
// =============================================================================

#[tokio::test]
async fn externally_deleted_snapshot_is_repaired() {
    let h = harness((1..=10).map(|i| news(i, Some(i))).collect());
    h.cache.warm().await.unwrap();

    h.store.evict("news:obj:8");
    let page = h.cache.get_paginated(1, 5).await.unwrap();

    assert_eq!(ids(&page.items), vec![10, 9, 8, 7, 6]);
    assert_eq!(page.items[2].get("title"), Some(&json!("Story 8")));
    assert!(h.store.get_raw("news:obj:8").is_some());
}

#[tokio::test]
async fn every_snapshot_lost_still_serves_page_in_order() {
    let h = harness((1..=6).map(|i| news(i, Some(i))).collect());
    h.cache.warm().await.unwrap();

    for id in 1..=6 {
        h.store.evict(&format!("news:obj:{}", id));
    }

    let page = h.cache.get_paginated(1, 6).await.unwrap();
    assert_eq!(ids(&page.items), vec![6, 5, 4, 3, 2, 1]);
    assert_eq!(h.source.id_queries(), 1);
    assert_eq!(h.store.string_count(), 6);
}

// =============================================================================
// Orchestrator
// =============================================================================

#[tokio::test]
async fn store_outage_is_invisible_to_readers() {
    let h = harness((1..=25).map(|i| news(i, Some(i))).collect());

    let happy = h.service.list(&ListParams::page(2, 10)).await.unwrap();
    h.store.set_available(false);
    let degraded = h.service.list(&ListParams::page(2, 10)).await.unwrap();

    assert_eq!(happy.origin, Origin::Cache);
    assert_eq!(degraded.origin, Origin::Source);
    assert_eq!(
        serde_json::to_value(&happy.body).unwrap(),
        serde_json::to_value(&degraded.body).unwrap()
    );
}

#[tokio::test]
async fn list_all_is_capped_and_unpaged() {
    let store = Arc::new(InMemoryStore::new());
    let source = Arc::new(InMemorySource::with_records((1..=30).map(|i| news(i, Some(i)))));
    let collection = Collection::new(&CollectionConfig::new("news", "News"), news_snapshot);
    let cache = Arc::new(SortedSetCache::new(collection, store, source));
    let config = FeedCacheConfig { max_all: 20, ..FeedCacheConfig::default() };
    let service = FeedService::new(cache, &config);

    let served = service.list(&ListParams::all()).await.unwrap();
    let ListResponse::All(all) = served.body else {
        panic!("expected an unpaged response");
    };
    assert_eq!(all.items.len(), 20);
    assert_eq!(all.total, 30);
}

#[tokio::test]
async fn writes_reach_source_and_cache() {
    let h = harness((1..=3).map(|i| news(i, Some(i))).collect());
    h.service.list(&ListParams::default()).await.unwrap();

    h.service
        .create(json!({
            "title": "Breaking",
            "summary": "Something happened",
            "source": "https://example.com/news/breaking",
            "timestamp": "2030-01-01T00:00:00Z"
        }))
        .await
        .unwrap();

    let listed = h.service.list(&ListParams::page(1, 1)).await.unwrap();
    assert_eq!(listed.origin, Origin::Cache);
    assert_eq!(listed.body.items()[0].get("title"), Some(&json!("Breaking")));
    assert_eq!(listed.body.total(), 4);

    h.service.remove(listed.body.items()[0].id).await.unwrap();
    assert_eq!(h.service.list(&ListParams::default()).await.unwrap().body.total(), 3);
}

#[tokio::test]
async fn video_collection_uses_its_own_keyspace() {
    let store = Arc::new(InMemoryStore::new());
    let videos = Arc::new(InMemorySource::with_records(vec![VideoRecord {
        id: 1,
        title: Some("Clip".into()),
        videourl: Some("https://video.example.com/1".into()),
        source: None,
        publisher_id: Some(7),
        timestamp: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
        score: None,
        thumbnailurl: None,
    }]));
    let collection = Collection::new(&CollectionConfig::new("video", "Videos"), video_snapshot);
    let cache = SortedSetCache::new(collection, store.clone(), videos);

    cache.warm().await.unwrap();

    assert!(store.get_raw("video:obj:1").is_some());
    assert_eq!(store.score("video:all", "video:1"), Some(1_700_000_000.0));
    assert_eq!(store.zcard("news:all").await.unwrap(), 0);
}

// =============================================================================
// SQL-backed Feeds
// =============================================================================

fn sqlite_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("feed_cache_engine_{}_{}.db", name, uuid::Uuid::new_v4()))
}

fn remove_sqlite(path: &std::path::Path) {
    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(format!("{}-wal", path.display()));
    let _ = std::fs::remove_file(format!("{}-shm", path.display()));
}

#[tokio::test]
async fn sqlite_backed_feeds_create_list_fall_back_and_delete() {
    let path = sqlite_path("feeds");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let store = Arc::new(InMemoryStore::new());
    let feeds = Feeds::from_parts(
        &FeedCacheConfig::default(),
        store.clone(),
        Arc::new(SqlSource::<NewsRecord>::new(&url).await.unwrap()),
        Arc::new(SqlSource::<VideoRecord>::new(&url).await.unwrap()),
    )
    .unwrap();

    let single = feeds
        .news
        .create(json!({
            "title": "First",
            "summary": "s",
            "source": "https://example.com/news/first",
            "timestamp": "2026-01-01T00:00:00Z"
        }))
        .await
        .unwrap();
    let CreateResponse::Single(first) = single else {
        panic!("expected a single snapshot");
    };
    assert_eq!(first.id, 1);

    let batch = feeds
        .news
        .create(json!([
            {"title": "Second", "summary": "s", "source": "https://example.com/news/second", "timestamp": "2026-02-01T00:00:00Z"},
            {"title": "Third", "summary": "s", "source": "https://example.com/news/third", "timestamp": "2026-03-01T00:00:00Z"}
        ]))
        .await
        .unwrap();
    let CreateResponse::Batch { created, items } = batch else {
        panic!("expected a batch response");
    };
    assert_eq!(created, 2);
    assert_eq!(ids(&items), vec![2, 3]);

    let cached = feeds.news.list(&ListParams::page(1, 10)).await.unwrap();
    assert_eq!(cached.origin, Origin::Cache);
    assert_eq!(ids(cached.body.items()), vec![3, 2, 1]);

    let far = ListParams::page(i64::MAX as u64, 10);
    let cached_far = feeds.news.list(&far).await.unwrap();
    assert!(cached_far.body.items().is_empty());

    store.set_available(false);

    let fallback = feeds.news.list(&ListParams::page(1, 10)).await.unwrap();
    assert_eq!(fallback.origin, Origin::Source);
    assert_eq!(fallback.body, cached.body);

    let fallback_far = feeds.news.list(&far).await.unwrap();
    assert_eq!(fallback_far.origin, Origin::Source);
    assert_eq!(fallback_far.body, cached_far.body);

    store.set_available(true);

    feeds.news.remove(1).await.unwrap();
    assert!(matches!(feeds.news.remove(1).await, Err(FeedError::NotFound(1))));

    let removed = feeds
        .news
        .remove_batch(&DeleteBatchRequest { ids: vec![2, 404] })
        .await
        .unwrap();
    assert_eq!(removed.count, Some(1));
    assert_eq!(removed.not_found, vec![404]);

    let remaining = feeds.news.list(&ListParams::page(1, 10)).await.unwrap();
    assert_eq!(ids(remaining.body.items()), vec![3]);
    assert_eq!(remaining.body.total(), 1);

    remove_sqlite(&path);
}

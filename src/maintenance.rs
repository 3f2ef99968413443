// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Operator-facing cache maintenance: warm, flush, stats.
//!
//! Collections register once at startup in a [`CollectionRegistry`], which
//! is then handed to whatever needs lookup by key (admin endpoints, the
//! `warm-cache` job). All operations are safe to run alongside live
//! traffic; a read racing a flush may see a partial page.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{CacheError, CacheStats, SortedSetCache};
use crate::record::FeedRecord;
use crate::service::FeedError;
use crate::source::SourceError;

/// Type-erased handle to one collection's cache.
#[async_trait]
pub trait CacheMaintenance: Send + Sync {
    /// Registry key (the collection prefix).
    fn key(&self) -> &str;

    fn label(&self) -> &str;

    async fn warm(&self) -> Result<usize, CacheError>;

    async fn flush(&self) -> Result<usize, CacheError>;

    async fn stats(&self) -> Result<CacheStats, CacheError>;

    /// Row count in the record source.
    async fn source_total(&self) -> Result<u64, SourceError>;
}

#[async_trait]
impl<R: FeedRecord> CacheMaintenance for SortedSetCache<R> {
    fn key(&self) -> &str {
        self.collection().prefix()
    }

    fn label(&self) -> &str {
        self.collection().label()
    }

    async fn warm(&self) -> Result<usize, CacheError> {
        SortedSetCache::warm(self).await
    }

    async fn flush(&self) -> Result<usize, CacheError> {
        SortedSetCache::flush(self).await
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        SortedSetCache::stats(self).await
    }

    async fn source_total(&self) -> Result<u64, SourceError> {
        self.source().count().await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarmResponse {
    pub warmed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlushResponse {
    pub flushed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsResponse {
    pub total_items: u64,
    pub store_used_memory: String,
    pub store_peak_memory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_total: Option<u64>,
}

/// Outcome of one collection in [`CollectionRegistry::warm_all`].
#[derive(Debug)]
pub struct WarmReport {
    pub key: String,
    pub result: Result<usize, CacheError>,
    pub elapsed: Duration,
}

#[derive(Default)]
pub struct CollectionRegistry {
    entries: Vec<Arc<dyn CacheMaintenance>>,
}

impl CollectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection. Prefixes must be unique: collections never share keyspace.
    pub fn register(&mut self, handle: Arc<dyn CacheMaintenance>) -> Result<(), FeedError> {
        if self.entries.iter().any(|e| e.key() == handle.key()) {
            return Err(FeedError::DuplicateCollection(handle.key().to_string()));
        }
        self.entries.push(handle);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&Arc<dyn CacheMaintenance>, FeedError> {
        self.entries
            .iter()
            .find(|e| e.key() == key)
            .ok_or_else(|| FeedError::UnknownCollection(key.to_string()))
    }

    /// Registered collections, in registration order.
    #[must_use]
    pub fn entries(&self) -> &[Arc<dyn CacheMaintenance>] {
        &self.entries
    }

    pub async fn warm(&self, key: &str) -> Result<WarmResponse, FeedError> {
        let warmed = self.get(key)?.warm().await?;
        Ok(WarmResponse { warmed })
    }

    pub async fn flush(&self, key: &str) -> Result<FlushResponse, FeedError> {
        self.get(key)?.flush().await?;
        Ok(FlushResponse { flushed: true })
    }

    /// Cache stats plus the source row count when the source answers.
    pub async fn stats(&self, key: &str) -> Result<StatsResponse, FeedError> {
        let handle = self.get(key)?;
        let stats = handle.stats().await?;

        let db_total = match handle.source_total().await {
            Ok(total) => Some(total),
            Err(e) => {
                warn!(collection = %key, error = %e, "Source count unavailable for stats");
                None
            }
        };

        Ok(StatsResponse {
            total_items: stats.total_items,
            store_used_memory: stats.store_used_memory,
            store_peak_memory: stats.store_peak_memory,
            db_total,
        })
    }

    /// Warm every collection. A failure is logged and the rest still run.
    pub async fn warm_all(&self) -> Vec<WarmReport> {
        let mut reports = Vec::with_capacity(self.entries.len());

        for handle in &self.entries {
            let start = Instant::now();
            let result = handle.warm().await;
            let elapsed = start.elapsed();

            match &result {
                Ok(count) => info!(
                    collection = %handle.key(),
                    count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "{} cache warmed",
                    handle.label()
                ),
                Err(e) => warn!(
                    collection = %handle.key(),
                    error = %e,
                    "{} cache warm failed, will lazy-warm on first request",
                    handle.label()
                ),
            }

            reports.push(WarmReport {
                key: handle.key().to_string(),
                result,
                elapsed,
            });
        }

        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Collection;
    use crate::config::CollectionConfig;
    use crate::record::{news_snapshot, video_snapshot, NewsRecord, VideoRecord};
    use crate::source::InMemorySource;
    use crate::storage::InMemoryStore;
    use chrono::{TimeZone, Utc};

    fn news(id: i64) -> NewsRecord {
        NewsRecord {
            id,
            title: format!("Story {}", id),
            summary: "summary".into(),
            source: format!("https://example.com/{}", id),
            imageurl: None,
            timestamp: Some(Utc.timestamp_opt(id, 0).unwrap()),
            score: None,
            topic_id: None,
            category_id: None,
        }
    }

    fn video(id: i64) -> VideoRecord {
        VideoRecord {
            id,
            title: Some(format!("Clip {}", id)),
            videourl: None,
            source: None,
            publisher_id: None,
            timestamp: None,
            score: None,
            thumbnailurl: None,
        }
    }

    struct Fixture {
        registry: CollectionRegistry,
        store: Arc<InMemoryStore>,
        videos: Arc<InMemorySource<VideoRecord>>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let news_source = Arc::new(InMemorySource::with_records((1..=3).map(news)));
        let videos = Arc::new(InMemorySource::with_records((1..=2).map(video)));

        let news_cache = SortedSetCache::new(
            Collection::new(&CollectionConfig::new("news", "News"), news_snapshot),
            store.clone(),
            news_source,
        );
        let video_cache = SortedSetCache::new(
            Collection::new(&CollectionConfig::new("video", "Videos"), video_snapshot),
            store.clone(),
            videos.clone(),
        );

        let mut registry = CollectionRegistry::new();
        registry.register(Arc::new(news_cache)).unwrap();
        registry.register(Arc::new(video_cache)).unwrap();
        Fixture { registry, store, videos }
    }

    #[tokio::test]
    async fn test_warm_flush_stats_by_key() {
        let Fixture { registry, .. } = fixture();

        assert_eq!(registry.warm("news").await.unwrap(), WarmResponse { warmed: 3 });

        let stats = registry.stats("news").await.unwrap();
        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.db_total, Some(3));

        assert_eq!(registry.flush("news").await.unwrap(), FlushResponse { flushed: true });
        assert_eq!(registry.stats("news").await.unwrap().total_items, 0);
        // Flushing one collection leaves the other alone
        registry.warm("video").await.unwrap();
        registry.flush("news").await.unwrap();
        assert_eq!(registry.stats("video").await.unwrap().total_items, 2);
    }

    #[tokio::test]
    async fn test_unknown_and_duplicate_keys() {
        let Fixture { mut registry, store, .. } = fixture();

        assert!(matches!(registry.warm("podcasts").await, Err(FeedError::UnknownCollection(_))));

        let again = SortedSetCache::new(
            Collection::new(&CollectionConfig::new("news", "News again"), news_snapshot),
            store,
            Arc::new(InMemorySource::<NewsRecord>::new()),
        );
        assert!(matches!(
            registry.register(Arc::new(again)),
            Err(FeedError::DuplicateCollection(_))
        ));
        assert_eq!(registry.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_stats_omit_db_total_when_source_down() {
        let Fixture { registry, videos, .. } = fixture();
        registry.warm("video").await.unwrap();
        videos.set_available(false);

        let stats = registry.stats("video").await.unwrap();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.db_total, None);
        assert!(serde_json::to_value(&stats).unwrap().get("db_total").is_none());
    }

    #[tokio::test]
    async fn test_warm_all_continues_past_failures() {
        let Fixture { registry, store, videos } = fixture();
        videos.set_available(false);

        let reports = registry.warm_all().await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].key, "news");
        assert!(matches!(reports[0].result, Ok(3)));
        assert!(matches!(reports[1].result, Err(CacheError::Source(_))));
        assert!(store.get_raw("news:obj:1").is_some());
    }
}

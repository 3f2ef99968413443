// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Startup wiring for the news and video feeds.
//!
//! One Redis connection manager and one SQL pool are shared by both
//! collections; each collection gets its own prefix, cache and service.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::collection::Collection;
use crate::config::{CollectionConfig, FeedCacheConfig};
use crate::engine::SortedSetCache;
use crate::maintenance::CollectionRegistry;
use crate::record::{news_snapshot, video_snapshot, NewsRecord, VideoRecord};
use crate::service::{FeedError, FeedService};
use crate::source::{connect_pool, RecordSource, SourceError, SqlSource};
use crate::storage::{RedisStore, SortedSetStore, StoreError};

pub const NEWS_PREFIX: &str = "news";
pub const VIDEO_PREFIX: &str = "video";

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Registry(#[from] FeedError),
}

pub struct Feeds {
    pub news: FeedService<NewsRecord>,
    pub videos: FeedService<VideoRecord>,
    pub registry: CollectionRegistry,
}

impl Feeds {
    /// Connect to Redis and the SQL database named in `config`.
    pub async fn connect(config: &FeedCacheConfig) -> Result<Self, ConnectError> {
        let redis_url = config
            .redis_url
            .as_deref()
            .ok_or(ConnectError::MissingSetting("redis_url"))?;
        let sql_url = config
            .sql_url
            .as_deref()
            .ok_or(ConnectError::MissingSetting("sql_url"))?;

        let store = RedisStore::new(redis_url).await?;
        info!("Connected to Redis");

        let pool = connect_pool(sql_url).await?;
        let is_sqlite = sql_url.starts_with("sqlite:");
        let news_source = SqlSource::<NewsRecord>::with_pool(pool.clone(), is_sqlite).await?;
        let video_source = SqlSource::<VideoRecord>::with_pool(pool, is_sqlite).await?;
        info!(sqlite = is_sqlite, "Connected to SQL");

        Self::from_parts(config, Arc::new(store), Arc::new(news_source), Arc::new(video_source))
    }

    /// Build from already-constructed backends.
    pub fn from_parts(
        config: &FeedCacheConfig,
        store: Arc<dyn SortedSetStore>,
        news_source: Arc<dyn RecordSource<NewsRecord>>,
        video_source: Arc<dyn RecordSource<VideoRecord>>,
    ) -> Result<Self, ConnectError> {
        let news_collection = Collection::new(
            &CollectionConfig::new(NEWS_PREFIX, "News").with_ttl_secs(config.ttl_secs),
            news_snapshot,
        );
        let video_collection = Collection::new(
            &CollectionConfig::new(VIDEO_PREFIX, "Videos").with_ttl_secs(config.ttl_secs),
            video_snapshot,
        );

        let news_cache = Arc::new(SortedSetCache::new(news_collection, store.clone(), news_source).with_config(config));
        let video_cache = Arc::new(SortedSetCache::new(video_collection, store, video_source).with_config(config));

        let mut registry = CollectionRegistry::new();
        registry.register(news_cache.clone())?;
        registry.register(video_cache.clone())?;

        Ok(Self {
            news: FeedService::new(news_cache, config),
            videos: FeedService::new(video_cache, config),
            registry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ListParams;
    use crate::source::InMemorySource;
    use crate::storage::InMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_connect_requires_urls() {
        let err = Feeds::connect(&FeedCacheConfig::default()).await.err();
        assert!(matches!(err, Some(ConnectError::MissingSetting("redis_url"))));
    }

    #[tokio::test]
    async fn test_collections_share_store_without_sharing_keys() {
        let store = Arc::new(InMemoryStore::new());
        let feeds = Feeds::from_parts(
            &FeedCacheConfig::default(),
            store.clone(),
            Arc::new(InMemorySource::<NewsRecord>::new()),
            Arc::new(InMemorySource::<VideoRecord>::new()),
        )
        .unwrap();

        feeds
            .news
            .create(json!({"title": "N", "summary": "s", "source": "https://example.com/n"}))
            .await
            .unwrap();
        feeds.videos.create(json!({"title": "V"})).await.unwrap();

        assert!(store.get_raw("news:obj:1").is_some());
        assert!(store.get_raw("video:obj:1").is_some());

        let keys: Vec<&str> = feeds.registry.entries().iter().map(|e| e.key()).collect();
        assert_eq!(keys, vec!["news", "video"]);

        let videos = feeds.videos.list(&ListParams::default()).await.unwrap();
        assert_eq!(videos.body.total(), 1);
    }
}

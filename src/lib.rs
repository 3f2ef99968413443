// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Feed Cache
//!
//! A read-through, write-through sorted-set cache for paginated feeds
//! (news, videos) backed by a relational database.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       FeedService<R>                        │
//! │  • list(page, limit, all) with identical source fallback   │
//! │  • create / remove: source first, cache mirror best-effort │
//! │  • circuit breaker around cache reads                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SortedSetCache<R>                        │
//! │  • P:all      sorted set, score = epoch seconds            │
//! │  • P:obj:<id> JSON snapshot with TTL                       │
//! │  • lazy warm, self-healing backfill of lost snapshots      │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//! ┌──────────────────────────┐     ┌──────────────────────────┐
//! │  SortedSetStore          │     │  RecordSource<R>         │
//! │  Redis / in-memory       │     │  MySQL, SQLite / memory  │
//! └──────────────────────────┘     └──────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use feed_cache::{FeedCacheConfig, Feeds, ListParams};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = FeedCacheConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         sql_url: Some("sqlite:feeds.db?mode=rwc".into()),
//!         ..Default::default()
//!     };
//!
//!     let feeds = Feeds::connect(&config).await.expect("Failed to connect");
//!     feeds.registry.warm_all().await;
//!
//!     let served = feeds.news.list(&ListParams::page(1, 10)).await.unwrap();
//!     println!("{} of {} items ({:?})", served.body.items().len(), served.body.total(), served.origin);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: The [`SortedSetCache`] (warm, read, write, delete, backfill)
//! - [`service`]: [`FeedService`] read orchestrator and write paths
//! - [`maintenance`]: [`CollectionRegistry`] and operator triggers
//! - [`storage`]: Key-value store backends (Redis, memory)
//! - [`source`]: Record sources (SQL, memory)
//! - [`record`]: Record types and snapshots
//! - [`resilience`]: Circuit breaker and retry logic

pub mod collection;
pub mod config;
pub mod engine;
pub mod feeds;
pub mod maintenance;
pub mod metrics;
pub mod record;
pub mod resilience;
pub mod service;
pub mod source;
pub mod storage;

pub use collection::{timestamp_score, Collection};
pub use config::{CollectionConfig, FeedCacheConfig};
pub use engine::{AllItems, CacheError, CacheStats, Page, SortedSetCache};
pub use feeds::{ConnectError, Feeds};
pub use maintenance::{CacheMaintenance, CollectionRegistry, FlushResponse, StatsResponse, WarmReport, WarmResponse};
pub use metrics::LatencyTimer;
pub use record::{DecodeError, FeedRecord, NewsDraft, NewsRecord, Snapshot, VideoDraft, VideoRecord};
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitCounts, CircuitError};
pub use resilience::retry::RetryConfig;
pub use service::{
    CreateResponse, DeleteBatchRequest, DeleteResponse, FeedError, FeedService, ListParams, ListQuery, ListResponse,
    Origin, Served,
};
pub use source::{InMemorySource, RecordSource, SourceError, SqlSource};
pub use storage::{InMemoryStore, RedisStore, SortedSetStore, StoreError};

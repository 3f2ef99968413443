// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sorted-set cache engine.
//!
//! A [`SortedSetCache`] owns one collection's two structures in the
//! key-value store and keeps them populated from the record source.
//!
//! ```text
//!   get_paginated(page, limit)
//!          │
//!          ▼
//!   ensure() ── index empty? ──► warm() ◄── RecordSource::list_recent (chunked)
//!          │
//!          ▼
//!   ZREVRANGE P:all ──► MGET P:obj:<id>... ──► missing/corrupt? ──► backfill
//!                                                                  │
//!                             RecordSource::fetch_by_ids ◄─────────┘
//!                             SET P:obj:<id> EX ttl (repair)
//! ```
//!
//! # Consistency
//!
//! Index and snapshot writes for one operation go out as a single pipeline.
//! That is not a transaction, so an index entry can outlive its snapshot
//! (TTL expiry, eviction, a crash mid-batch). Reads repair that lazily
//! through backfill; they never fail because of it.

mod backfill;
pub mod types;
mod writes;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::collection::Collection;
use crate::config::FeedCacheConfig;
use crate::metrics::{self, LatencyTimer};
use crate::record::FeedRecord;
use crate::source::RecordSource;
use crate::storage::SortedSetStore;

pub use types::{page_count, page_offset, AllItems, CacheError, CacheStats, Page};

fn to_index(n: u64) -> isize {
    isize::try_from(n).unwrap_or(isize::MAX)
}

/// Read-through, write-through cache for one collection.
pub struct SortedSetCache<R: FeedRecord> {
    collection: Collection<R>,
    store: Arc<dyn SortedSetStore>,
    source: Arc<dyn RecordSource<R>>,
    warm_read_chunk: usize,
    warm_flush_every: usize,
    /// Collapses concurrent lazy warms into one.
    warm_lock: Mutex<()>,
}

impl<R: FeedRecord> SortedSetCache<R> {
    pub fn new(collection: Collection<R>, store: Arc<dyn SortedSetStore>, source: Arc<dyn RecordSource<R>>) -> Self {
        let defaults = FeedCacheConfig::default();
        Self {
            collection,
            store,
            source,
            warm_read_chunk: defaults.warm_read_chunk,
            warm_flush_every: defaults.warm_flush_every,
            warm_lock: Mutex::new(()),
        }
    }

    /// Apply the warm chunk sizes from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &FeedCacheConfig) -> Self {
        self.warm_read_chunk = config.warm_read_chunk.max(1);
        self.warm_flush_every = config.warm_flush_every.max(1);
        self
    }

    #[must_use]
    pub fn collection(&self) -> &Collection<R> {
        &self.collection
    }

    /// The authoritative source this cache fronts.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn RecordSource<R>> {
        &self.source
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SortedSetStore> {
        &self.store
    }

    /// True iff the index has at least one entry.
    pub async fn is_populated(&self) -> Result<bool, CacheError> {
        Ok(self.store.zcard(&self.collection.index_key()).await? > 0)
    }

    /// Warm if the index is empty. Returns the warmed count when this call warmed.
    ///
    /// Concurrent callers that all see an empty index queue on a local lock and
    /// re-check, so only the first one warms. Other processes may still warm
    /// in parallel; warm is idempotent, so that only costs work.
    pub async fn ensure(&self) -> Result<Option<usize>, CacheError> {
        if self.is_populated().await? {
            return Ok(None);
        }

        let _guard = self.warm_lock.lock().await;
        if self.is_populated().await? {
            return Ok(None);
        }

        info!(collection = %self.collection.prefix(), "Index empty, warming lazily");
        self.warm().await.map(Some)
    }

    /// One page, newest first.
    ///
    /// Out-of-range pages return no items but the real `total` and `pages`.
    #[instrument(skip(self), fields(collection = %self.collection.prefix()))]
    pub async fn get_paginated(&self, page: u64, limit: u64) -> Result<Page, CacheError> {
        let _timer = LatencyTimer::new(self.collection.prefix(), "get_paginated");
        self.ensure().await?;

        let index = self.collection.index_key();
        let total = self.store.zcard(&index).await?;
        let start = page_offset(page, limit);

        let items = if limit == 0 || start >= total {
            vec![]
        } else {
            let stop = start.saturating_add(limit - 1);
            let members = self.store.zrevrange(&index, to_index(start), to_index(stop)).await?;
            self.resolve(&members).await?
        };

        Ok(Page {
            items,
            total,
            page,
            limit,
            pages: page_count(total, limit),
        })
    }

    /// The newest `max_items` entries.
    #[instrument(skip(self), fields(collection = %self.collection.prefix()))]
    pub async fn get_all(&self, max_items: u64) -> Result<AllItems, CacheError> {
        let _timer = LatencyTimer::new(self.collection.prefix(), "get_all");
        self.ensure().await?;

        let index = self.collection.index_key();
        let total = self.store.zcard(&index).await?;

        let items = if max_items == 0 {
            vec![]
        } else {
            let members = self.store.zrevrange(&index, 0, to_index(max_items - 1)).await?;
            self.resolve(&members).await?
        };

        Ok(AllItems { items, total })
    }

    /// Index cardinality plus store memory telemetry.
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let total_items = self.store.zcard(&self.collection.index_key()).await?;
        let memory = self.store.memory_info().await?;
        metrics::set_index_items(self.collection.prefix(), total_items);

        Ok(CacheStats {
            total_items,
            store_used_memory: memory.used_memory,
            store_peak_memory: memory.peak_memory,
        })
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request-facing feed service.
//!
//! Reads go to the cache first and fall back to the record source on any
//! cache failure; both paths produce the same body, so a caller can only
//! tell them apart through [`Served::origin`]. Writes go to the source
//! first and are mirrored into the cache best-effort: a mirror failure is
//! logged and never fails the request.

pub mod query;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::FeedCacheConfig;
use crate::engine::{page_count, page_offset, AllItems, CacheError, Page, SortedSetCache};
use crate::metrics;
use crate::record::{FeedRecord, Snapshot};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
use crate::source::SourceError;

pub use query::{ListParams, ListQuery, PageLimits};
pub use types::{
    CreateResponse, DeleteBatchRequest, DeleteResponse, Deleted, FeedError, ListResponse, Origin, Served,
};

pub struct FeedService<R: FeedRecord> {
    cache: Arc<SortedSetCache<R>>,
    limits: PageLimits,
    breaker: CircuitBreaker,
}

impl<R: FeedRecord> FeedService<R> {
    pub fn new(cache: Arc<SortedSetCache<R>>, config: &FeedCacheConfig) -> Self {
        let breaker = CircuitBreaker::new(
            format!("{}_cache", cache.collection().prefix()),
            CircuitConfig::from_config(config),
        );
        Self {
            cache,
            limits: PageLimits::from_config(config),
            breaker,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<SortedSetCache<R>> {
        &self.cache
    }

    #[must_use]
    pub fn limits(&self) -> PageLimits {
        self.limits
    }

    fn prefix(&self) -> &str {
        self.cache.collection().prefix()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // READ PATH
    // ═══════════════════════════════════════════════════════════════════════════

    /// Serve a list request from the cache, or from the source if the cache fails.
    pub async fn list(&self, params: &ListParams) -> Result<Served<ListResponse>, FeedError> {
        let query = ListQuery::from_params(params, &self.limits);

        let cached = self.breaker.call(|| self.read_cache(query)).await;
        let (body, origin) = match cached {
            Ok(body) => (body, Origin::Cache),
            Err(err) => {
                match err {
                    CircuitError::Rejected => {
                        debug!(collection = %self.prefix(), "Cache circuit open, reading from source");
                    }
                    CircuitError::Inner(e) => {
                        error!(collection = %self.prefix(), error = %e, "Cache read failed, falling back to source");
                    }
                }
                metrics::record_fallback(self.prefix());

                let body = self.read_source(query).await.map_err(|e| {
                    error!(collection = %self.prefix(), error = %e, "Source fallback failed");
                    FeedError::ServiceUnavailable(e.to_string())
                })?;
                (body, Origin::Source)
            }
        };

        metrics::record_read(self.prefix(), origin.as_str());
        Ok(Served { body, origin })
    }

    async fn read_cache(&self, query: ListQuery) -> Result<ListResponse, CacheError> {
        match query {
            ListQuery::Page { page, limit } => self.cache.get_paginated(page, limit).await.map(ListResponse::Page),
            ListQuery::All { max_items } => self.cache.get_all(max_items).await.map(ListResponse::All),
        }
    }

    /// Same ordering and page arithmetic as the cache path, straight from the source.
    async fn read_source(&self, query: ListQuery) -> Result<ListResponse, SourceError> {
        let source = self.cache.source();
        let total = source.count().await?;

        match query {
            ListQuery::Page { page, limit } => {
                let records = source.list_recent(page_offset(page, limit), limit).await?;
                Ok(ListResponse::Page(Page {
                    items: self.snapshots(&records),
                    total,
                    page,
                    limit,
                    pages: page_count(total, limit),
                }))
            }
            ListQuery::All { max_items } => {
                let records = source.list_recent(0, max_items).await?;
                Ok(ListResponse::All(AllItems {
                    items: self.snapshots(&records),
                    total,
                }))
            }
        }
    }

    fn snapshots(&self, records: &[R]) -> Vec<Snapshot> {
        records.iter().map(|r| self.cache.collection().snapshot(r)).collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // WRITE PATH
    // ═══════════════════════════════════════════════════════════════════════════

    /// Create one record (JSON object) or many (JSON array).
    ///
    /// Every element is validated before anything is written.
    pub async fn create(&self, payload: Value) -> Result<CreateResponse, FeedError> {
        match payload {
            Value::Array(elements) => {
                let drafts = elements
                    .into_iter()
                    .enumerate()
                    .map(|(i, element)| parse_draft::<R>(element).map_err(|e| FeedError::Validation(format!("item {}: {}", i, e))))
                    .collect::<Result<Vec<_>, _>>()?;

                let records = self.cache.source().insert_many(drafts).await?;
                self.mirror_add(&records).await;
                info!(collection = %self.prefix(), count = records.len(), "Created records");

                Ok(CreateResponse::Batch {
                    created: records.len(),
                    items: self.snapshots(&records),
                })
            }
            Value::Object(_) => {
                let draft = parse_draft::<R>(payload).map_err(FeedError::Validation)?;
                let records = self.cache.source().insert_many(vec![draft]).await?;
                self.mirror_add(&records).await;

                let snapshot = records
                    .first()
                    .map(|r| self.cache.collection().snapshot(r))
                    .ok_or_else(|| FeedError::ServiceUnavailable("source returned no record for insert".into()))?;
                info!(collection = %self.prefix(), id = snapshot.id, "Created record");
                Ok(CreateResponse::Single(snapshot))
            }
            _ => Err(FeedError::Validation("expected a JSON object or an array of objects".into())),
        }
    }

    /// Delete one record. Unknown ids are `NotFound` and leave the cache alone.
    pub async fn remove(&self, id: i64) -> Result<DeleteResponse, FeedError> {
        let deleted = self.cache.source().delete_by_ids(&[id]).await?;
        if deleted.is_empty() {
            return Err(FeedError::NotFound(id));
        }

        self.mirror_delete(&deleted).await;
        info!(collection = %self.prefix(), id, "Deleted record");
        Ok(DeleteResponse {
            deleted: Deleted::One(id),
            count: None,
            not_found: vec![],
        })
    }

    /// Delete many records; ids the source does not know are reported back.
    pub async fn remove_batch(&self, request: &DeleteBatchRequest) -> Result<DeleteResponse, FeedError> {
        if request.ids.is_empty() {
            return Err(FeedError::Validation("Provide a non-empty 'ids' array".into()));
        }

        let found = self.cache.source().delete_by_ids(&request.ids).await?;
        let found_set: HashSet<i64> = found.iter().copied().collect();
        let not_found: Vec<i64> = request.ids.iter().copied().filter(|id| !found_set.contains(id)).collect();

        if !found.is_empty() {
            self.mirror_delete(&found).await;
        }

        info!(collection = %self.prefix(), count = found.len(), missing = not_found.len(), "Deleted records");
        Ok(DeleteResponse {
            count: Some(found.len()),
            deleted: Deleted::Many(found),
            not_found,
        })
    }

    /// Mirror new records into the cache.
    ///
    /// A cold index is warmed first (the source already holds the new rows),
    /// otherwise the index would hold only these records and look populated.
    async fn mirror_add(&self, records: &[R]) {
        let result = match self.cache.ensure().await {
            Ok(_) => self.cache.add_many(records).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(collection = %self.prefix(), count = records.len(), error = %e, "Failed to mirror new records into cache");
            metrics::record_mirror_failure(self.prefix(), "add");
        }
    }

    async fn mirror_delete(&self, ids: &[i64]) {
        if let Err(e) = self.cache.delete_many(ids).await {
            warn!(collection = %self.prefix(), count = ids.len(), error = %e, "Failed to remove records from cache");
            metrics::record_mirror_failure(self.prefix(), "delete");
        }
    }
}

fn parse_draft<R: FeedRecord>(value: Value) -> Result<R::Draft, String> {
    let draft: R::Draft = serde_json::from_value(value).map_err(|e| e.to_string())?;
    R::validate(&draft)?;
    Ok(draft)
}

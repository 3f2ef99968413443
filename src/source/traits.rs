// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::FeedRecord;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Database unreachable (connect/acquire/timeout).
    #[error("Record source unavailable: {0}")]
    Unavailable(String),
    /// The query itself failed or returned unusable rows.
    #[error("Record source query failed: {0}")]
    Query(String),
    /// A uniqueness constraint rejected the write.
    #[error("Record conflicts with an existing row: {0}")]
    Conflict(String),
}

/// Authoritative store of feed records.
///
/// Recency order is `timestamp DESC` with untimed records last, then
/// `id DESC`.
#[async_trait]
pub trait RecordSource<R: FeedRecord>: Send + Sync {
    /// One page of records in recency order.
    async fn list_recent(&self, offset: u64, limit: u64) -> Result<Vec<R>, SourceError>;

    /// Records whose id is in `ids`. Unknown ids are skipped; order is unspecified.
    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<R>, SourceError>;

    async fn count(&self) -> Result<u64, SourceError>;

    /// Insert drafts, returning the stored records with their assigned ids.
    async fn insert_many(&self, drafts: Vec<R::Draft>) -> Result<Vec<R>, SourceError>;

    /// Delete the given ids, returning the ids that existed (in input order).
    async fn delete_by_ids(&self, ids: &[i64]) -> Result<Vec<i64>, SourceError>;
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the sorted-set cache engine.

use serde::Serialize;
use thiserror::Error;

use crate::record::Snapshot;
use crate::source::SourceError;
use crate::storage::StoreError;

/// Engine failure. Decode errors never appear here: an undecodable
/// snapshot is treated as missing and backfilled.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("Failed to encode snapshot: {0}")]
    Encode(String),
}

/// One page of a feed, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<Snapshot>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
}

/// Unpaginated read, capped by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllItems {
    pub items: Vec<Snapshot>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_items: u64,
    pub store_used_memory: String,
    pub store_peak_memory: String,
}

/// `ceil(total / limit)`, or 0 when `limit` is 0.
#[must_use]
pub fn page_count(total: u64, limit: u64) -> u64 {
    if limit == 0 {
        0
    } else {
        total.div_ceil(limit)
    }
}

/// Offset of the first item on `page` (pages start at 1; 0 is read as 1).
#[must_use]
pub fn page_offset(page: u64, limit: u64) -> u64 {
    page.max(1).saturating_sub(1).saturating_mul(limit)
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request and response shapes for the feed service.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{AllItems, CacheError, Page};
use crate::record::Snapshot;
use crate::source::SourceError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    /// Malformed request; nothing was written.
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Record {0} not found")]
    NotFound(i64),
    /// Neither the cache nor the record source could serve the request.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    /// A maintenance operation on the cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),
    #[error("Collection prefix already registered: {0}")]
    DuplicateCollection(String),
}

impl From<SourceError> for FeedError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Conflict(msg) => FeedError::Validation(msg),
            other => FeedError::ServiceUnavailable(other.to_string()),
        }
    }
}

/// List body: identical for the cache path and the source fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ListResponse {
    Page(Page),
    All(AllItems),
}

impl ListResponse {
    #[must_use]
    pub fn items(&self) -> &[Snapshot] {
        match self {
            Self::Page(page) => &page.items,
            Self::All(all) => &all.items,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        match self {
            Self::Page(page) => page.total,
            Self::All(all) => all.total,
        }
    }
}

/// Diagnostic marker: which layer answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Cache,
    Source,
}

impl Origin {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Source => "source",
        }
    }
}

/// A response body plus the layer that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Served<T> {
    pub body: T,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CreateResponse {
    Single(Snapshot),
    Batch { created: usize, items: Vec<Snapshot> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Deleted {
    One(i64),
    Many(Vec<i64>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteResponse {
    pub deleted: Deleted,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub not_found: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeleteBatchRequest {
    #[serde(default)]
    pub ids: Vec<i64>,
}

impl DeleteBatchRequest {
    /// Parse a `{"ids": [..]}` body.
    pub fn from_value(body: serde_json::Value) -> Result<Self, FeedError> {
        serde_json::from_value(body).map_err(|_| FeedError::Validation("Provide a non-empty 'ids' array".into()))
    }
}

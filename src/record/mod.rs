// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Feed records and their cached snapshots.
//!
//! A [`FeedRecord`] is one row of an authoritative feed (news item, video).
//! Records are created from a validated [`FeedRecord::Draft`] and cached as a
//! [`Snapshot`].

pub mod news;
pub mod snapshot;
pub mod video;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

pub use news::{news_snapshot, NewsDraft, NewsRecord};
pub use snapshot::{DecodeError, Snapshot};
pub use video::{video_snapshot, VideoDraft, VideoRecord};

/// A record that can live in a sorted-set feed cache.
pub trait FeedRecord: Clone + Send + Sync + 'static {
    /// Create payload accepted from clients.
    type Draft: DeserializeOwned + Send + Sync + 'static;

    fn id(&self) -> i64;

    /// Recency timestamp. `None` sorts last.
    fn timestamp(&self) -> Option<DateTime<Utc>>;

    /// Reject malformed drafts before they reach the source or the cache.
    fn validate(draft: &Self::Draft) -> Result<(), String>;

    /// Materialize a draft. A missing timestamp defaults to `now`.
    fn from_draft(id: i64, draft: Self::Draft, now: DateTime<Utc>) -> Self;

    #[must_use]
    fn with_id(self, id: i64) -> Self;
}

pub(crate) fn check_finite(field: &str, value: Option<f64>) -> Result<(), String> {
    match value {
        Some(v) if !v.is_finite() => Err(format!("'{}' must be a finite number", field)),
        _ => Ok(()),
    }
}

pub(crate) fn check_not_blank(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("'{}' may not be blank", field))
    } else {
        Ok(())
    }
}

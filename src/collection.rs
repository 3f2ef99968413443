// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Collection: one named cache namespace with its scoring and snapshot rules.
//!
//! Key layout for prefix `P`:
//! ```text
//! P:all        sorted set, members "P:<id>", score = epoch seconds (0.0 if untimed)
//! P:obj:<id>   string, JSON snapshot, expires after the collection TTL
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CollectionConfig;
use crate::record::{FeedRecord, Snapshot};

pub type ScoreFn<R> = Arc<dyn Fn(&R) -> f64 + Send + Sync>;
pub type SnapshotFn<R> = Arc<dyn Fn(&R) -> Snapshot + Send + Sync>;

/// Default scoring: timestamp as fractional epoch seconds, `0.0` when absent.
pub fn timestamp_score<R: FeedRecord>(record: &R) -> f64 {
    record
        .timestamp()
        .map_or(0.0, |ts| ts.timestamp_micros() as f64 / 1_000_000.0)
}

pub struct Collection<R> {
    prefix: String,
    label: String,
    ttl: Duration,
    score_fn: ScoreFn<R>,
    snapshot_fn: SnapshotFn<R>,
}

impl<R: FeedRecord> Collection<R> {
    /// Create a collection scored by record timestamp.
    pub fn new(
        config: &CollectionConfig,
        snapshot_fn: impl Fn(&R) -> Snapshot + Send + Sync + 'static,
    ) -> Self {
        Self {
            prefix: config.prefix.clone(),
            label: config.label.clone(),
            ttl: Duration::from_secs(config.ttl_secs),
            score_fn: Arc::new(timestamp_score::<R>),
            snapshot_fn: Arc::new(snapshot_fn),
        }
    }

    /// Replace the scoring strategy.
    #[must_use]
    pub fn with_score(mut self, score_fn: impl Fn(&R) -> f64 + Send + Sync + 'static) -> Self {
        self.score_fn = Arc::new(score_fn);
        self
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Key of the ordering index.
    #[must_use]
    pub fn index_key(&self) -> String {
        format!("{}:all", self.prefix)
    }

    /// Index member for a record id.
    #[must_use]
    pub fn member(&self, id: i64) -> String {
        format!("{}:{}", self.prefix, id)
    }

    /// Key holding the snapshot of a record id.
    #[must_use]
    pub fn snapshot_key(&self, id: i64) -> String {
        format!("{}:obj:{}", self.prefix, id)
    }

    /// Record id encoded in an index member, if it belongs to this collection.
    #[must_use]
    pub fn parse_member(&self, member: &str) -> Option<i64> {
        member
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .and_then(|id| id.parse().ok())
    }

    #[must_use]
    pub fn score(&self, record: &R) -> f64 {
        (self.score_fn)(record)
    }

    #[must_use]
    pub fn snapshot(&self, record: &R) -> Snapshot {
        (self.snapshot_fn)(record)
    }
}

impl<R> Clone for Collection<R> {
    fn clone(&self) -> Self {
        Self {
            prefix: self.prefix.clone(),
            label: self.label.clone(),
            ttl: self.ttl,
            score_fn: Arc::clone(&self.score_fn),
            snapshot_fn: Arc::clone(&self.snapshot_fn),
        }
    }
}

impl<R> fmt::Debug for Collection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("prefix", &self.prefix)
            .field("label", &self.label)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{news_snapshot, NewsRecord};
    use chrono::{TimeZone, Utc};

    fn news(id: i64, ts: Option<i64>) -> NewsRecord {
        NewsRecord {
            id,
            title: format!("n{}", id),
            summary: String::new(),
            source: format!("https://example.com/{}", id),
            imageurl: None,
            timestamp: ts.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
            score: None,
            topic_id: None,
            category_id: None,
        }
    }

    fn collection() -> Collection<NewsRecord> {
        Collection::new(&CollectionConfig::new("news", "News"), news_snapshot)
    }

    #[test]
    fn test_key_layout() {
        let c = collection();
        assert_eq!(c.index_key(), "news:all");
        assert_eq!(c.member(42), "news:42");
        assert_eq!(c.snapshot_key(42), "news:obj:42");
    }

    #[test]
    fn test_parse_member() {
        let c = collection();
        assert_eq!(c.parse_member("news:42"), Some(42));
        assert_eq!(c.parse_member("video:42"), None);
        assert_eq!(c.parse_member("newsy:42"), None);
        assert_eq!(c.parse_member("news:abc"), None);
    }

    #[test]
    fn test_timestamp_score() {
        let c = collection();
        assert_eq!(c.score(&news(1, Some(1_700_000_000))), 1_700_000_000.0);
        assert_eq!(c.score(&news(2, None)), 0.0);
    }

    #[test]
    fn test_custom_score() {
        let c = collection().with_score(|n: &NewsRecord| n.id as f64);
        assert_eq!(c.score(&news(8, Some(1))), 8.0);
    }

    #[test]
    fn test_ttl_from_config() {
        let c = Collection::new(&CollectionConfig::new("video", "Videos").with_ttl_secs(90), news_snapshot);
        assert_eq!(c.ttl(), Duration::from_secs(90));
    }
}

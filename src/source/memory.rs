// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::traits::{RecordSource, SourceError};
use crate::record::FeedRecord;

/// Recency order shared by every source: newest first, untimed last, then id desc.
pub fn recency_order<R: FeedRecord>(a: &R, b: &R) -> Ordering {
    match (a.timestamp(), b.timestamp()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.id().cmp(&a.id()))
}

/// In-process record source with auto-increment ids.
pub struct InMemorySource<R: FeedRecord> {
    records: RwLock<BTreeMap<i64, R>>,
    next_id: AtomicI64,
    available: AtomicBool,
    id_queries: AtomicUsize,
}

impl<R: FeedRecord> InMemorySource<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            available: AtomicBool::new(true),
            id_queries: AtomicUsize::new(0),
        }
    }

    /// Seed records with fixed ids (keeps the id sequence ahead of them).
    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let source = Self::new();
        for record in records {
            source.upsert(record);
        }
        source
    }

    /// Insert or replace a record directly, bypassing validation.
    pub fn upsert(&self, record: R) {
        self.next_id.fetch_max(record.id() + 1, AtomicOrdering::SeqCst);
        self.records.write().insert(record.id(), record);
    }

    /// Remove a record directly (simulates an upstream delete the cache never hears about).
    pub fn remove(&self, id: i64) -> Option<R> {
        self.records.write().remove(&id)
    }

    /// Toggle a simulated database outage.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    /// Number of `fetch_by_ids` calls served so far.
    #[must_use]
    pub fn id_queries(&self) -> usize {
        self.id_queries.load(AtomicOrdering::SeqCst)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.available.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(SourceError::Unavailable("database is down".into()))
        }
    }
}

impl<R: FeedRecord> Default for InMemorySource<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: FeedRecord> RecordSource<R> for InMemorySource<R> {
    async fn list_recent(&self, offset: u64, limit: u64) -> Result<Vec<R>, SourceError> {
        self.check_available()?;
        let mut all: Vec<R> = self.records.read().values().cloned().collect();
        all.sort_by(recency_order);
        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<R>, SourceError> {
        self.check_available()?;
        self.id_queries.fetch_add(1, AtomicOrdering::SeqCst);
        let records = self.records.read();
        // Iterate the map, not the input: order follows the source, like an IN query
        Ok(records
            .values()
            .filter(|r| ids.contains(&r.id()))
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, SourceError> {
        self.check_available()?;
        Ok(self.records.read().len() as u64)
    }

    async fn insert_many(&self, drafts: Vec<R::Draft>) -> Result<Vec<R>, SourceError> {
        self.check_available()?;
        let now = Utc::now();
        let mut records = self.records.write();
        let mut inserted = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
            let record = R::from_draft(id, draft, now);
            records.insert(id, record.clone());
            inserted.push(record);
        }
        Ok(inserted)
    }

    async fn delete_by_ids(&self, ids: &[i64]) -> Result<Vec<i64>, SourceError> {
        self.check_available()?;
        let mut records = self.records.write();
        let mut deleted = Vec::new();
        for id in ids {
            if records.remove(id).is_some() {
                deleted.push(*id);
            }
        }
        Ok(deleted)
    }
}

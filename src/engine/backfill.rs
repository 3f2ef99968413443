// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Member resolution and self-healing backfill.
//!
//! A page of index members is resolved with one MGET. Members whose
//! snapshot is gone (expired, evicted) or unreadable are fetched from the
//! source in one query, written back with a fresh TTL, and slotted into
//! their original position so the page keeps index order. Ids the source
//! no longer knows are dropped from the page.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::{CacheError, SortedSetCache};
use crate::metrics;
use crate::record::{FeedRecord, Snapshot};
use crate::storage::Pipeline;

impl<R: FeedRecord> SortedSetCache<R> {
    /// Resolve index members to snapshots, in member order.
    pub(super) async fn resolve(&self, members: &[String]) -> Result<Vec<Snapshot>, CacheError> {
        let ids: Vec<i64> = members
            .iter()
            .filter_map(|member| {
                let id = self.collection.parse_member(member);
                if id.is_none() {
                    warn!(collection = %self.collection.prefix(), member = %member, "Skipping malformed index member");
                }
                id
            })
            .collect();

        if ids.is_empty() {
            return Ok(vec![]);
        }

        let keys: Vec<String> = ids.iter().map(|id| self.collection.snapshot_key(*id)).collect();
        let values = self.store.mget(&keys).await?;

        let mut slots: Vec<Option<Snapshot>> = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();

        for ((id, key), value) in ids.iter().zip(&keys).zip(values) {
            let decoded = value.and_then(|raw| match Snapshot::decode(key, *id, &raw) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(error = %e, "Discarding undecodable snapshot");
                    None
                }
            });
            if decoded.is_none() {
                missing.push(*id);
            }
            slots.push(decoded);
        }

        if !missing.is_empty() {
            let mut recovered = self.backfill(&missing).await?;
            for (slot, id) in slots.iter_mut().zip(&ids) {
                if slot.is_none() {
                    *slot = recovered.remove(id);
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Recompute snapshots for `ids` from the source and write them back.
    async fn backfill(&self, ids: &[i64]) -> Result<HashMap<i64, Snapshot>, CacheError> {
        warn!(
            collection = %self.collection.prefix(),
            missing = ids.len(),
            "Backfilling missing snapshots from source"
        );

        let records = self.source.fetch_by_ids(ids).await?;
        let ttl_secs = self.collection.ttl().as_secs();

        let mut pipeline = Pipeline::new();
        let mut recovered = HashMap::with_capacity(records.len());
        for record in &records {
            let snapshot = self.collection.snapshot(record);
            let encoded = snapshot.encode().map_err(|e| CacheError::Encode(e.to_string()))?;
            pipeline.set_ex(self.collection.snapshot_key(record.id()), encoded, ttl_secs);
            recovered.insert(record.id(), snapshot);
        }

        self.store.execute(&pipeline).await?;
        metrics::record_backfill(self.collection.prefix(), recovered.len());

        if recovered.len() < ids.len() {
            debug!(
                collection = %self.collection.prefix(),
                dropped = ids.len() - recovered.len(),
                "Indexed ids no longer in source, dropped from page"
            );
        }

        Ok(recovered)
    }
}

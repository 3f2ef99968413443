// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Warm, write-through and invalidation.

use tracing::{debug, info, instrument};

use super::{CacheError, SortedSetCache};
use crate::metrics::{self, LatencyTimer};
use crate::record::FeedRecord;
use crate::storage::Pipeline;

impl<R: FeedRecord> SortedSetCache<R> {
    /// Stage the index entry and snapshot for one record.
    fn stage(&self, pipeline: &mut Pipeline, record: &R) -> Result<(), CacheError> {
        let encoded = self
            .collection
            .snapshot(record)
            .encode()
            .map_err(|e| CacheError::Encode(e.to_string()))?;

        pipeline.set_ex(
            self.collection.snapshot_key(record.id()),
            encoded,
            self.collection.ttl().as_secs(),
        );
        pipeline.zadd(
            self.collection.index_key(),
            self.collection.member(record.id()),
            self.collection.score(record),
        );
        Ok(())
    }

    /// Repopulate the collection from the source, newest first.
    ///
    /// Reads `warm_read_chunk` records per source query and flushes a pipeline
    /// every `warm_flush_every` records. Existing entries are overwritten, not
    /// cleared: ids deleted upstream stay indexed until `delete` or `flush`.
    #[instrument(skip(self), fields(collection = %self.collection.prefix()))]
    pub async fn warm(&self) -> Result<usize, CacheError> {
        let _timer = LatencyTimer::new(self.collection.prefix(), "warm");
        let chunk = self.warm_read_chunk as u64;

        let mut pipeline = Pipeline::new();
        let mut staged = 0usize;
        let mut written = 0usize;
        let mut offset = 0u64;

        loop {
            let records = self.source.list_recent(offset, chunk).await?;
            let fetched = records.len();

            for record in &records {
                self.stage(&mut pipeline, record)?;
                staged += 1;
                written += 1;

                if staged >= self.warm_flush_every {
                    self.store.execute(&pipeline).await?;
                    pipeline = Pipeline::new();
                    staged = 0;
                }
            }

            offset += fetched as u64;
            if (fetched as u64) < chunk {
                break;
            }
        }

        self.store.execute(&pipeline).await?;

        metrics::record_warmed(self.collection.prefix(), written);
        info!(collection = %self.collection.prefix(), count = written, "Warmed collection");
        Ok(written)
    }

    /// Write-through for one record. Re-adding an id overwrites its score and snapshot.
    pub async fn add(&self, record: &R) -> Result<(), CacheError> {
        self.add_many(std::slice::from_ref(record)).await.map(|_| ())
    }

    /// Write-through for many records in one pipeline.
    pub async fn add_many(&self, records: &[R]) -> Result<usize, CacheError> {
        if records.is_empty() {
            return Ok(0);
        }
        let _timer = LatencyTimer::new(self.collection.prefix(), "add");

        let mut pipeline = Pipeline::new();
        for record in records {
            self.stage(&mut pipeline, record)?;
        }
        self.store.execute(&pipeline).await?;

        debug!(collection = %self.collection.prefix(), count = records.len(), "Added records to cache");
        Ok(records.len())
    }

    /// Same as [`Self::add`]; last write wins.
    pub async fn update(&self, record: &R) -> Result<(), CacheError> {
        self.add(record).await?;
        debug!(collection = %self.collection.prefix(), id = record.id(), "Updated cached record");
        Ok(())
    }

    /// Drop one id from the index and snapshot store. Unknown ids are a no-op.
    pub async fn delete(&self, id: i64) -> Result<(), CacheError> {
        self.delete_many(&[id]).await
    }

    pub async fn delete_many(&self, ids: &[i64]) -> Result<(), CacheError> {
        if ids.is_empty() {
            return Ok(());
        }
        let _timer = LatencyTimer::new(self.collection.prefix(), "delete");

        let index = self.collection.index_key();
        let mut pipeline = Pipeline::new();
        for id in ids {
            pipeline.zrem(index.clone(), self.collection.member(*id));
            pipeline.del(self.collection.snapshot_key(*id));
        }
        self.store.execute(&pipeline).await?;

        debug!(collection = %self.collection.prefix(), count = ids.len(), "Removed records from cache");
        Ok(())
    }

    /// Delete every snapshot plus the index. Returns how many entries were indexed.
    ///
    /// The next read finds an empty index and warms again.
    #[instrument(skip(self), fields(collection = %self.collection.prefix()))]
    pub async fn flush(&self) -> Result<usize, CacheError> {
        let _timer = LatencyTimer::new(self.collection.prefix(), "flush");
        let index = self.collection.index_key();
        let members = self.store.zrange(&index, 0, -1).await?;

        let mut pipeline = Pipeline::new();
        for member in &members {
            if let Some(id) = self.collection.parse_member(member) {
                pipeline.del(self.collection.snapshot_key(id));
            }
        }
        pipeline.del(index);
        self.store.execute(&pipeline).await?;

        metrics::set_index_items(self.collection.prefix(), 0);
        info!(collection = %self.collection.prefix(), count = members.len(), "Flushed collection");
        Ok(members.len())
    }
}

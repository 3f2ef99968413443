// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Connection refused, dropped or timed out.
    #[error("Key-value store unavailable: {0}")]
    Unavailable(String),
    /// The store answered with something we did not expect.
    #[error("Key-value store protocol error: {0}")]
    Protocol(String),
}

/// One write in a pipelined batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    ZAdd { key: String, member: String, score: f64 },
    ZRem { key: String, member: String },
    SetEx { key: String, value: String, ttl_secs: u64 },
    Del { key: String },
}

/// Write batch submitted to the store back-to-back.
///
/// Not a transaction: a failure mid-batch can leave earlier ops applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    ops: Vec<StoreOp>,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zadd(&mut self, key: impl Into<String>, member: impl Into<String>, score: f64) -> &mut Self {
        self.ops.push(StoreOp::ZAdd { key: key.into(), member: member.into(), score });
        self
    }

    pub fn zrem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.ops.push(StoreOp::ZRem { key: key.into(), member: member.into() });
        self
    }

    /// SET with expiry. A zero TTL is raised to one second (stores reject `EX 0`).
    pub fn set_ex(&mut self, key: impl Into<String>, value: impl Into<String>, ttl_secs: u64) -> &mut Self {
        self.ops.push(StoreOp::SetEx { key: key.into(), value: value.into(), ttl_secs: ttl_secs.max(1) });
        self
    }

    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(StoreOp::Del { key: key.into() });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn ops(&self) -> &[StoreOp] {
        &self.ops
    }
}

/// Memory telemetry as reported by the store (human-readable, not computed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryInfo {
    pub used_memory: String,
    pub peak_memory: String,
}

impl MemoryInfo {
    pub fn unknown() -> Self {
        Self {
            used_memory: "unknown".into(),
            peak_memory: "unknown".into(),
        }
    }
}

/// Sorted-set capable key-value store.
///
/// Range indices follow Redis semantics: inclusive, negative values count
/// from the end, out-of-range yields an empty list.
#[async_trait]
pub trait SortedSetStore: Send + Sync {
    /// Members ordered by score ascending (ties: member ascending).
    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError>;

    /// Members ordered by score descending (ties: member descending).
    async fn zrevrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError>;

    async fn zcard(&self, key: &str) -> Result<u64, StoreError>;

    /// Fetch many string values in one round trip, in key order.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    /// Apply a write batch in one round trip.
    async fn execute(&self, pipeline: &Pipeline) -> Result<(), StoreError>;

    async fn memory_info(&self) -> Result<MemoryInfo, StoreError>;
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the feed cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `feed_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `collection`: the collection prefix (news, video)
//! - `origin`: cache, source
//! - `operation`: warm, get_paginated, add, delete, flush, ...

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

// ═══════════════════════════════════════════════════════════════════════════
// READS - Where each list response came from
// ═══════════════════════════════════════════════════════════════════════════

/// Record a served list read
pub fn record_read(collection: &str, origin: &str) {
    counter!(
        "feed_cache_reads_total",
        "collection" => collection.to_string(),
        "origin" => origin.to_string()
    )
    .increment(1);
}

/// Record a read that skipped or failed the cache and went to the source
pub fn record_fallback(collection: &str) {
    counter!(
        "feed_cache_fallback_total",
        "collection" => collection.to_string()
    )
    .increment(1);
}

/// Record snapshots recomputed from the source during a read
pub fn record_backfill(collection: &str, count: usize) {
    counter!(
        "feed_cache_backfill_total",
        "collection" => collection.to_string()
    )
    .increment(count as u64);
}

// ═══════════════════════════════════════════════════════════════════════════
// WRITES - Warm volume and mirror health
// ═══════════════════════════════════════════════════════════════════════════

/// Record records written by a warm
pub fn record_warmed(collection: &str, count: usize) {
    counter!(
        "feed_cache_warmed_items",
        "collection" => collection.to_string()
    )
    .increment(count as u64);
}

/// Record a source write whose cache mirror failed
pub fn record_mirror_failure(collection: &str, operation: &str) {
    counter!(
        "feed_cache_mirror_failures_total",
        "collection" => collection.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Set current index cardinality
pub fn set_index_items(collection: &str, count: u64) {
    gauge!(
        "feed_cache_index_items",
        "collection" => collection.to_string()
    )
    .set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// LATENCY
// ═══════════════════════════════════════════════════════════════════════════

/// Record operation latency
pub fn record_latency(collection: &str, operation: &str, duration: Duration) {
    histogram!(
        "feed_cache_operation_seconds",
        "collection" => collection.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record circuit breaker call outcome
pub fn record_circuit_call(circuit: &str, outcome: &str) {
    counter!(
        "feed_cache_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    collection: String,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(collection: &str, operation: &'static str) -> Self {
        Self {
            collection: collection.to_string(),
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(&self.collection, self.operation, self.start.elapsed());
    }
}

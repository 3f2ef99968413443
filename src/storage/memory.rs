// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process sorted-set store.
//!
//! Mirrors the subset of Redis semantics the cache relies on: score-ordered
//! ranges with lexicographic tie-breaks, TTL expiry on string keys, and
//! pipelines applied under one lock. Used by tests and local runs; it can
//! also simulate an outage ([`InMemoryStore::set_available`]) and eviction
//! ([`InMemoryStore::evict`]).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::traits::{MemoryInfo, Pipeline, SortedSetStore, StoreError, StoreOp};

#[derive(Debug, Clone)]
struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

pub struct InMemoryStore {
    strings: DashMap<String, StringEntry>,
    sorted_sets: RwLock<HashMap<String, HashMap<String, f64>>>,
    available: AtomicBool,
    /// High-water mark of `used_bytes`, sampled when memory is reported.
    peak_bytes: AtomicUsize,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            strings: DashMap::new(),
            sorted_sets: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            peak_bytes: AtomicUsize::new(0),
        }
    }

    /// Toggle a simulated outage: while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    /// Drop a string key as if it had expired or been evicted.
    pub fn evict(&self, key: &str) -> bool {
        self.strings.remove(key).is_some()
    }

    /// Write a raw string value without expiry (e.g. to plant a corrupt payload).
    pub fn put_raw(&self, key: &str, value: &str) {
        self.strings.insert(key.to_string(), StringEntry { value: value.to_string(), expires_at: None });
    }

    /// Live string value, if any.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.strings
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Remaining time-to-live of a string key.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.strings
            .get(key)
            .and_then(|entry| entry.expires_at)
            .and_then(|at| at.checked_duration_since(now))
    }

    /// Score of a sorted-set member.
    #[must_use]
    pub fn score(&self, key: &str, member: &str) -> Option<f64> {
        self.sorted_sets.read().get(key).and_then(|set| set.get(member).copied())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get_raw(key).is_some() || self.sorted_sets.read().contains_key(key)
    }

    /// Number of live string keys.
    #[must_use]
    pub fn string_count(&self) -> usize {
        let now = Instant::now();
        self.strings.iter().filter(|entry| entry.is_live(now)).count()
    }

    /// Clear everything.
    pub fn clear(&self) {
        self.strings.clear();
        self.sorted_sets.write().clear();
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn used_bytes(&self) -> usize {
        let strings: usize = self.strings.iter().map(|e| e.key().len() + e.value().value.len()).sum();
        let sets: usize = self
            .sorted_sets
            .read()
            .iter()
            .map(|(key, set)| key.len() + set.keys().map(|m| m.len() + 8).sum::<usize>())
            .sum();
        strings + sets
    }

    /// Members in ascending (score, member) order.
    fn ordered_members(&self, key: &str) -> Vec<String> {
        let sets = self.sorted_sets.read();
        let Some(set) = sets.get(key) else {
            return vec![];
        };
        let mut entries: Vec<(&String, f64)> = set.iter().map(|(m, s)| (m, *s)).collect();
        entries.sort_by(|a, b| match a.1.total_cmp(&b.1) {
            Ordering::Equal => a.0.cmp(b.0),
            other => other,
        });
        entries.into_iter().map(|(m, _)| m.clone()).collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve Redis-style inclusive indices against a length.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

fn slice(members: Vec<String>, start: isize, stop: isize) -> Vec<String> {
    match resolve_range(members.len(), start, stop) {
        Some((from, to)) => members[from..=to].to_vec(),
        None => vec![],
    }
}

/// Format bytes the way `INFO memory` does (`1.50K`, `2.00M`).
fn human_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];
    if bytes < 1024 {
        return format!("{}B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2}{}", value, UNITS[unit])
}

#[async_trait]
impl SortedSetStore for InMemoryStore {
    async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        Ok(slice(self.ordered_members(key), start, stop))
    }

    async fn zrevrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let mut members = self.ordered_members(key);
        members.reverse();
        Ok(slice(members, start, stop))
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self.sorted_sets.read().get(key).map_or(0, |set| set.len() as u64))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        self.check_available()?;
        Ok(keys.iter().map(|key| self.get_raw(key)).collect())
    }

    async fn execute(&self, pipeline: &Pipeline) -> Result<(), StoreError> {
        self.check_available()?;
        let now = Instant::now();
        {
            let mut sets = self.sorted_sets.write();
            for op in pipeline.ops() {
                match op {
                    StoreOp::ZAdd { key, member, score } => {
                        sets.entry(key.clone()).or_default().insert(member.clone(), *score);
                    }
                    StoreOp::ZRem { key, member } => {
                        if let Some(set) = sets.get_mut(key) {
                            set.remove(member);
                            if set.is_empty() {
                                sets.remove(key);
                            }
                        }
                    }
                    StoreOp::SetEx { key, value, ttl_secs } => {
                        self.strings.insert(
                            key.clone(),
                            StringEntry {
                                value: value.clone(),
                                expires_at: Some(now + Duration::from_secs(*ttl_secs)),
                            },
                        );
                    }
                    StoreOp::Del { key } => {
                        self.strings.remove(key);
                        sets.remove(key);
                    }
                }
            }
        }
        Ok(())
    }

    async fn memory_info(&self) -> Result<MemoryInfo, StoreError> {
        self.check_available()?;
        let used = self.used_bytes();
        let peak = self.peak_bytes.fetch_max(used, AtomicOrdering::Relaxed).max(used);
        Ok(MemoryInfo {
            used_memory: human_bytes(used),
            peak_memory: human_bytes(peak),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        let mut p = Pipeline::new();
        p.zadd("z", "a", 3.0).zadd("z", "b", 1.0).zadd("z", "c", 2.0).zadd("z", "d", 2.0);
        store.execute(&p).await.unwrap();
        store
    }

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, 1, 2), Some((1, 2)));
        assert_eq!(resolve_range(5, 3, 100), Some((3, 4)));
        assert_eq!(resolve_range(5, 5, 9), None);
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(5, 2, 1), None);
    }

    #[tokio::test]
    async fn test_zrange_orders_by_score_then_member() {
        let store = seeded().await;
        assert_eq!(store.zrange("z", 0, -1).await.unwrap(), vec!["b", "c", "d", "a"]);
        assert_eq!(store.zrevrange("z", 0, -1).await.unwrap(), vec!["a", "d", "c", "b"]);
        assert_eq!(store.zrevrange("z", 1, 2).await.unwrap(), vec!["d", "c"]);
        assert!(store.zrevrange("z", 10, 20).await.unwrap().is_empty());
        assert!(store.zrange("missing", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zadd_updates_score_without_duplicates() {
        let store = seeded().await;
        let mut p = Pipeline::new();
        p.zadd("z", "b", 10.0);
        store.execute(&p).await.unwrap();

        assert_eq!(store.zcard("z").await.unwrap(), 4);
        assert_eq!(store.zrevrange("z", 0, 0).await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_zrem_and_del() {
        let store = seeded().await;
        let mut p = Pipeline::new();
        p.zrem("z", "a").zrem("z", "missing");
        store.execute(&p).await.unwrap();
        assert_eq!(store.zcard("z").await.unwrap(), 3);

        let mut p = Pipeline::new();
        p.del("z");
        store.execute(&p).await.unwrap();
        assert_eq!(store.zcard("z").await.unwrap(), 0);
        assert!(!store.contains_key("z"));
    }

    #[tokio::test]
    async fn test_set_ex_and_mget() {
        let store = InMemoryStore::new();
        let mut p = Pipeline::new();
        p.set_ex("k1", "v1", 60).set_ex("k2", "v2", 60);
        store.execute(&p).await.unwrap();

        let values = store
            .mget(&["k1".to_string(), "nope".to_string(), "k2".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("v1".to_string()), None, Some("v2".to_string())]);

        let ttl = store.ttl("k1").unwrap();
        assert!(ttl <= Duration::from_secs(60) && ttl > Duration::from_secs(55));
    }

    #[tokio::test]
    async fn test_evict_removes_value() {
        let store = InMemoryStore::new();
        let mut p = Pipeline::new();
        p.set_ex("k", "v", 60);
        store.execute(&p).await.unwrap();

        assert!(store.evict("k"));
        assert_eq!(store.get_raw("k"), None);
        assert!(!store.evict("k"));
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let store = seeded().await;
        store.set_available(false);

        assert!(matches!(store.zcard("z").await, Err(StoreError::Unavailable(_))));
        assert!(store.mget(&["k".to_string()]).await.is_err());
        assert!(store.execute(&Pipeline::new()).await.is_err());
        assert!(store.memory_info().await.is_err());

        store.set_available(true);
        assert_eq!(store.zcard("z").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_memory_info_reports_human_sizes() {
        let store = InMemoryStore::new();
        store.put_raw("big", &"x".repeat(4096));
        let info = store.memory_info().await.unwrap();
        assert!(info.used_memory.ends_with('K'));
        assert!(info.peak_memory.ends_with('K'));
    }

    #[tokio::test]
    async fn test_peak_memory_survives_deletes() {
        let store = InMemoryStore::new();
        store.put_raw("big", &"x".repeat(4096));
        let before = store.memory_info().await.unwrap();

        let mut p = Pipeline::new();
        p.del("big");
        store.execute(&p).await.unwrap();
        let after = store.memory_info().await.unwrap();

        assert_eq!(after.used_memory, "0B");
        assert_eq!(after.peak_memory, before.peak_memory);
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512B");
        assert_eq!(human_bytes(1536), "1.50K");
        assert_eq!(human_bytes(2 * 1024 * 1024), "2.00M");
    }
}

//! In-process L1 cache tier.
//!
//! Bounded, process-local map with TTL and least-recently-used eviction.
//! Never touches the network; stores decoded values directly, so the
//! compression/encryption envelope applied to the remote tier is invisible
//! here. Safe for concurrent use from many request workers.

use dashmap::DashMap;
use metrics::{counter, gauge};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::{CacheStore, KeyScanner, MemoryBacked};
use crate::error::Result;

/// L1 entry with access tracking.
struct L1Entry {
    value: Value,
    stored_at: Instant,
    ttl: Option<Duration>,
    last_access: Instant,
}

impl L1Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            value,
            stored_at: now,
            ttl,
            last_access: now,
        }
    }

    fn is_expired(&self) -> bool {
        self.ttl
            .map(|ttl| self.stored_at.elapsed() >= ttl)
            .unwrap_or(false)
    }

    fn remaining_ttl(&self) -> Option<Duration> {
        self.ttl.and_then(|ttl| ttl.checked_sub(self.stored_at.elapsed()))
    }
}

/// Snapshot of L1 occupancy and counters.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct L1Stats {
    pub entries: u64,
    pub capacity: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded in-memory cache with LRU eviction and lazy TTL expiry.
pub struct L1MemoryCache {
    entries: DashMap<String, L1Entry>,
    lru_order: Mutex<VecDeque<String>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl L1MemoryCache {
    /// Create a cache bounded to `max_entries` live entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            lru_order: Mutex::new(VecDeque::with_capacity(max_entries)),
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Maximum number of entries this tier admits.
    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Count of non-expired entries.
    pub fn occupancy(&self) -> usize {
        self.entries.iter().filter(|e| !e.value().is_expired()).count()
    }

    /// Snapshot counters and occupancy.
    pub fn stats(&self) -> L1Stats {
        let stats = L1Stats {
            entries: self.occupancy() as u64,
            capacity: self.max_entries as u64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        };
        gauge!("recall_l1_entries").set(stats.entries as f64);
        stats
    }

    /// Remove every expired entry eagerly.
    ///
    /// Expiry is otherwise lazy (checked on read); operators can call this
    /// from a maintenance loop to reclaim memory for write-once workloads.
    pub fn purge_expired(&self) -> u64 {
        let mut keys_to_remove = Vec::new();
        for entry in self.entries.iter() {
            if entry.value().is_expired() {
                keys_to_remove.push(entry.key().clone());
            }
        }

        let mut purged = 0;
        for key in keys_to_remove {
            if self.entries.remove(&key).is_some() {
                purged += 1;
            }
        }

        if purged > 0 {
            debug!(purged, "purged expired L1 entries");
        }
        purged
    }

    /// Evict least-recently-used entries if at capacity.
    async fn maybe_evict(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }

        let to_evict = (self.max_entries / 10).max(1);
        let mut evicted = 0;

        let mut lru = self.lru_order.lock().await;
        while evicted < to_evict && !lru.is_empty() {
            if let Some(key) = lru.pop_front() {
                if self.entries.remove(&key).is_some() {
                    evicted += 1;
                }
            }
        }
        drop(lru);

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            counter!("recall_l1_evictions_total").increment(evicted as u64);
            debug!(evicted, "evicted least-recently-used L1 entries");
        }
    }

    /// Move `key` to the most-recently-used position.
    async fn touch_lru(&self, key: &str) {
        let mut lru = self.lru_order.lock().await;
        lru.retain(|k| k != key);
        lru.push_back(key.to_string());
    }
}

#[async_trait::async_trait]
impl CacheStore for L1MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!("recall_l1_misses_total", "reason" => "expired").increment(1);
                return None;
            }

            entry.last_access = Instant::now();
            let value = entry.value.clone();
            drop(entry);

            self.touch_lru(key).await;
            self.hits.fetch_add(1, Ordering::Relaxed);
            counter!("recall_l1_hits_total").increment(1);
            Some(value)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            counter!("recall_l1_misses_total", "reason" => "not_found").increment(1);
            None
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) {
        self.maybe_evict().await;

        self.entries
            .insert(key.to_string(), L1Entry::new(value.clone(), ttl));
        self.touch_lru(key).await;
        counter!("recall_l1_sets_total").increment(1);
    }

    async fn delete(&self, key: &str) -> bool {
        let deleted = self.entries.remove(key).is_some();
        if deleted {
            counter!("recall_l1_deletes_total").increment(1);
        }
        deleted
    }

    async fn clear(&self) {
        self.entries.clear();
        self.lru_order.lock().await.clear();
        counter!("recall_l1_clears_total").increment(1);
    }
}

#[async_trait::async_trait]
impl KeyScanner for L1MemoryCache {
    /// Chunked key iteration over a sorted snapshot.
    ///
    /// Matches the remote tier's SCAN semantics: bounded batches, approximate
    /// under concurrent modification. The cursor is an offset into the
    /// sorted key snapshot.
    async fn scan_keys(&self, cursor: u64, count: usize) -> Result<(u64, Vec<String>)> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired())
            .map(|e| e.key().clone())
            .collect();
        keys.sort();

        let start = cursor as usize;
        if start >= keys.len() {
            return Ok((0, Vec::new()));
        }

        let end = (start + count.max(1)).min(keys.len());
        let batch = keys[start..end].to_vec();
        let next_cursor = if end >= keys.len() { 0 } else { end as u64 };
        Ok((next_cursor, batch))
    }

    async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        self.entries
            .get(key)
            .filter(|e| !e.is_expired())
            .and_then(|e| e.remaining_ttl())
    }
}

impl MemoryBacked for L1MemoryCache {
    fn memory_cache(&self) -> &L1MemoryCache {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = L1MemoryCache::new(100);

        cache.set("k1", &json!({"answer": 42}), None).await;
        assert_eq!(cache.get("k1").await, Some(json!({"answer": 42})));

        assert!(cache.delete("k1").await);
        assert!(!cache.delete("k1").await);
        assert_eq!(cache.get("k1").await, None);
    }

    #[tokio::test]
    async fn test_ttl_expiry_is_a_miss() {
        let cache = L1MemoryCache::new(100);

        cache
            .set("short", &json!("v"), Some(Duration::from_millis(50)))
            .await;
        assert_eq!(cache.get("short").await, Some(json!("v")));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get("short").await, None);
    }

    #[tokio::test]
    async fn test_lru_eviction_bounds_occupancy() {
        let cache = L1MemoryCache::new(5);

        for i in 0..10 {
            cache.set(&format!("key-{}", i), &json!(i), None).await;
        }

        let stats = cache.stats();
        assert!(stats.entries <= 5);
        assert!(stats.evictions > 0);
    }

    #[tokio::test]
    async fn test_recently_used_survives_eviction() {
        let cache = L1MemoryCache::new(4);

        for i in 0..4 {
            cache.set(&format!("key-{}", i), &json!(i), None).await;
        }
        // Touch key-0 so key-1 becomes the eviction candidate.
        assert!(cache.get("key-0").await.is_some());

        cache.set("key-4", &json!(4), None).await;
        assert!(cache.get("key-0").await.is_some());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = L1MemoryCache::new(100);

        cache
            .set("gone", &json!(1), Some(Duration::from_millis(10)))
            .await;
        cache.set("kept", &json!(2), None).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.occupancy(), 1);
    }

    #[tokio::test]
    async fn test_scan_keys_walks_everything_in_chunks() {
        let cache = L1MemoryCache::new(100);
        for i in 0..25 {
            cache.set(&format!("key-{:02}", i), &json!(i), None).await;
        }

        let mut seen = Vec::new();
        let mut cursor = 0;
        loop {
            let (next, batch) = cache.scan_keys(cursor, 10).await.unwrap();
            seen.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        assert_eq!(seen.len(), 25);
    }

    #[tokio::test]
    async fn test_remaining_ttl() {
        let cache = L1MemoryCache::new(100);
        cache
            .set("t", &json!(1), Some(Duration::from_secs(60)))
            .await;

        let remaining = cache.remaining_ttl("t").await.unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(58));

        assert_eq!(cache.remaining_ttl("absent").await, None);
    }

    #[tokio::test]
    async fn test_stats_counters() {
        let cache = L1MemoryCache::new(100);

        cache.set("k", &json!(1), None).await;
        cache.get("k").await;
        cache.get("missing").await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let cache = std::sync::Arc::new(L1MemoryCache::new(1000));
        let mut handles = Vec::new();

        for worker in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    let key = format!("w{}-k{}", worker, i);
                    cache.set(&key, &json!(i), None).await;
                    assert_eq!(cache.get(&key).await, Some(json!(i)));
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }
}

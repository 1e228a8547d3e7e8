//! Tiered operation-result caching.
//!
//! This module provides the caching engine for expensive, non-deterministic
//! text-processing calls: a fast in-process L1 tier backed by a durable
//! Redis-compatible remote tier, with transparent compression, transparent
//! at-rest encryption, and deterministic key derivation.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        TieredCache                             │
//! ├────────────────────────────────────────────────────────────────┤
//! │  KeyBuilder     CompressionCodec      EncryptionLayer          │
//! │  (fingerprint)  (gzip ≥ threshold)    (AES-256-GCM, optional)  │
//! │         │                │                     │               │
//! │         ▼                ▼                     ▼               │
//! │  ┌──────────────┐              ┌─────────────────────────────┐ │
//! │  │ L1MemoryCache│  promotion   │      RemoteCacheClient      │ │
//! │  │ (LRU + TTL)  │ ◄─────────── │ (Redis, throttled reconnect)│ │
//! │  └──────────────┘              └─────────────────────────────┘ │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The remote tier is always optional at the call level: total remote
//! unavailability degrades the cache to a memory-only cache with unchanged
//! external behavior. The cache is an optimization, never a dependency.

pub mod codec;
pub mod crypto;
pub mod entry;
pub mod key;
pub mod memory;
pub mod remote;

pub use codec::CompressionCodec;
pub use crypto::EncryptionLayer;
pub use entry::CacheEntry;
pub use key::{CacheKey, KeyBuilder};
pub use memory::{L1MemoryCache, L1Stats};
pub use remote::{ConnectionSnapshot, RemoteCacheClient};

use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::CacheSettings;
use crate::error::{RecallError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Capability Traits
// ═══════════════════════════════════════════════════════════════════════════════

/// The contract cache consumers depend on.
///
/// A miss is an expected, common outcome, modeled as `None` — never an
/// error. Data-path operations do not return errors at all: infrastructure
/// failures are absorbed inside the implementation.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a value. `None` means miss.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store a value. `ttl: None` applies the implementation's default TTL.
    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>);

    /// Remove a value; returns whether anything was removed.
    async fn delete(&self, key: &str) -> bool;

    /// Remove every value.
    async fn clear(&self);
}

/// Chunked key enumeration, for administrative batch operations.
///
/// SCAN semantics: bounded batches, cursor `0` terminates, approximate under
/// concurrent modification.
#[async_trait::async_trait]
pub trait KeyScanner: Send + Sync {
    /// One scan step: returns the next cursor (0 = done) and a key batch.
    async fn scan_keys(&self, cursor: u64, count: usize) -> Result<(u64, Vec<String>)>;

    /// Remaining TTL for a key, if it exists and carries one.
    async fn remaining_ttl(&self, key: &str) -> Option<Duration>;
}

/// Capability marker: this cache owns an in-process memory tier.
pub trait MemoryBacked {
    fn memory_cache(&self) -> &L1MemoryCache;
}

/// Capability marker: this cache owns a remote tier client.
pub trait RemoteBacked {
    fn remote_client(&self) -> &RemoteCacheClient;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct TieredCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    l1_hits: AtomicU64,
    remote_hits: AtomicU64,
    promotions: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

/// Snapshot of cache activity for health and monitoring endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TieredCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub l1_hits: u64,
    pub remote_hits: u64,
    pub promotions: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub hit_rate: f64,
    pub l1: L1Stats,
    pub connection: ConnectionSnapshot,
}

impl TieredCacheStats {
    fn calculate_hit_rate(&mut self) {
        let total = self.hits + self.misses;
        self.hit_rate = if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        };
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tiered Cache
// ═══════════════════════════════════════════════════════════════════════════════

/// Two-tier cache orchestrator.
///
/// Composes the key builder, compression codec, encryption layer, L1 memory
/// tier, and remote client behind the [`CacheStore`] contract. Owns its
/// tiers exclusively for its lifetime; construct via
/// [`TieredCache::from_settings`] and drive the lifecycle explicitly:
/// construct → `connect` → … → `disconnect`.
pub struct TieredCache {
    settings: CacheSettings,
    l1: L1MemoryCache,
    remote: RemoteCacheClient,
    codec: CompressionCodec,
    crypto: EncryptionLayer,
    counters: TieredCounters,
}

impl TieredCache {
    /// Build a cache from validated settings.
    ///
    /// This is the factory entry point: no global state, no hidden
    /// singletons. Fails fast with a configuration error listing every
    /// violation when the settings are invalid.
    pub fn from_settings(settings: CacheSettings) -> Result<Self> {
        settings.validate()?;

        let codec = CompressionCodec::new(
            settings.compression_threshold_bytes,
            settings.compression_level,
        )?;
        let crypto = EncryptionLayer::new(settings.encryption_key.as_deref())?;
        let l1 = L1MemoryCache::new(settings.l1_max_entries);
        let remote = RemoteCacheClient::new(&settings);

        Ok(Self {
            settings,
            l1,
            remote,
            codec,
            crypto,
            counters: TieredCounters::default(),
        })
    }

    /// Attempt to connect the remote tier.
    ///
    /// Returns `Ok(false)` on failure — never an error — unless
    /// `fail_on_connection_error` is set, in which case the underlying
    /// infrastructure error surfaces. Idempotent when already connected.
    pub async fn connect(&self) -> Result<bool> {
        match self.remote.connect_checked().await {
            Ok(()) => Ok(true),
            Err(e) if self.settings.fail_on_connection_error => Err(e),
            Err(e) => {
                debug!(error = %e, "remote tier unavailable, degrading to L1-only operation");
                Ok(false)
            }
        }
    }

    /// Disconnect the remote tier; the cache transparently falls back to
    /// L1-only operation.
    pub async fn disconnect(&self) {
        self.remote.disconnect().await;
    }

    /// Whether the remote tier is currently connected.
    pub fn is_remote_connected(&self) -> bool {
        self.remote.is_connected()
    }

    /// The settings this cache was built from.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Snapshot hit/miss counters, L1 occupancy, and connection state.
    pub fn stats(&self) -> TieredCacheStats {
        let mut stats = TieredCacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            l1_hits: self.counters.l1_hits.load(Ordering::Relaxed),
            remote_hits: self.counters.remote_hits.load(Ordering::Relaxed),
            promotions: self.counters.promotions.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            hit_rate: 0.0,
            l1: self.l1.stats(),
            connection: self.remote.snapshot(),
        };
        stats.calculate_hit_rate();
        stats
    }

    /// Get a cached value, or compute and cache it.
    ///
    /// The factory runs only on a miss; its result is written through the
    /// normal `set` path (remote best-effort, L1 always).
    pub async fn get_or_insert_with<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        factory: F,
    ) -> Value
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Value>,
    {
        if let Some(value) = CacheStore::get(self, key).await {
            return value;
        }

        let value = factory().await;
        CacheStore::set(self, key, &value, ttl).await;
        value
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Remote tier encode/decode
    // ─────────────────────────────────────────────────────────────────────────

    /// Encode a value into the remote wire form:
    /// serialize → compress (≥ threshold) → encrypt → envelope.
    fn encode_entry(&self, value: &Value, ttl: Option<Duration>) -> Result<Vec<u8>> {
        let serialized = serde_json::to_vec(value)?;
        let (payload, compressed) = self.codec.maybe_compress(&serialized)?;
        let encrypted = self.crypto.is_enabled();
        let payload = self.crypto.encrypt(&payload)?;

        CacheEntry::new(payload, compressed, encrypted, ttl).to_wire()
    }

    /// Decode remote wire bytes back into a value, in the exact inverse
    /// order of the write path: decrypt → decompress → deserialize.
    fn decode_entry(&self, bytes: &[u8]) -> Result<(Value, Option<Duration>)> {
        let entry = CacheEntry::from_wire(bytes)?;
        if entry.is_expired() {
            return Err(RecallError::new(
                crate::error::ErrorCode::DeserializationError,
                "Remote entry outlived its recorded TTL",
            ));
        }

        let payload = if entry.encrypted {
            if !self.crypto.is_enabled() {
                return Err(RecallError::decryption_failed());
            }
            self.crypto.decrypt(&entry.payload)?
        } else {
            entry.payload.clone()
        };

        let payload = if entry.compressed {
            self.codec.decompress(&payload)?
        } else {
            payload
        };

        let value: Value = serde_json::from_slice(&payload)?;
        Ok((value, entry.remaining_ttl()))
    }

    /// Fetch and decode from the remote tier. Any failure is returned as an
    /// error for the caller to absorb.
    async fn remote_fetch(&self, key: &str) -> Result<Option<(Value, Option<Duration>)>> {
        match self.remote.get_bytes(key).await? {
            Some(bytes) => Ok(Some(self.decode_entry(&bytes)?)),
            None => Ok(None),
        }
    }

    fn record_error(&self, context: &str, key: &str, error: &RecallError) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        counter!("recall_cache_errors_total", "context" => context.to_string()).increment(1);
        warn!(key, context, error = %error, "remote tier operation failed, continuing without it");
    }
}

#[async_trait::async_trait]
impl CacheStore for TieredCache {
    /// L1 first (fast path, no network); on L1 miss, the remote tier; remote
    /// hits are promoted into L1. Any remote error — timeout, corrupt
    /// payload, decode failure — is logged and treated as a miss.
    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &str) -> Option<Value> {
        if self.settings.enable_l1 {
            if let Some(value) = self.l1.get(key).await {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
                counter!("recall_cache_hits_total", "tier" => "l1").increment(1);
                return Some(value);
            }
        }

        if self.remote.is_connected() {
            match self.remote_fetch(key).await {
                Ok(Some((value, remaining_ttl))) => {
                    if self.settings.enable_l1 {
                        self.l1.set(key, &value, remaining_ttl).await;
                        self.counters.promotions.fetch_add(1, Ordering::Relaxed);
                        counter!("recall_cache_promotions_total").increment(1);
                    }
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    self.counters.remote_hits.fetch_add(1, Ordering::Relaxed);
                    counter!("recall_cache_hits_total", "tier" => "remote").increment(1);
                    return Some(value);
                }
                Ok(None) => {}
                Err(e) => self.record_error("get", key, &e),
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        counter!("recall_cache_misses_total").increment(1);
        None
    }

    /// Write to the remote tier when connected (best effort, failures
    /// swallowed) and always to L1, so a temporarily-disconnected remote
    /// tier does not defeat locally-originated writes.
    #[instrument(skip(self, value), fields(key = %key))]
    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) {
        let effective_ttl = ttl.or_else(|| Some(self.settings.default_ttl()));

        if self.remote.is_connected() {
            match self.encode_entry(value, effective_ttl) {
                Ok(wire) => {
                    if let Err(e) = self.remote.set_bytes(key, &wire, effective_ttl).await {
                        self.record_error("set", key, &e);
                    }
                }
                Err(e) => self.record_error("encode", key, &e),
            }
        }

        if self.settings.enable_l1 {
            self.l1.set(key, value, effective_ttl).await;
        }

        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        counter!("recall_cache_sets_total").increment(1);
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &str) -> bool {
        let l1_deleted = if self.settings.enable_l1 {
            self.l1.delete(key).await
        } else {
            false
        };

        let remote_deleted = if self.remote.is_connected() {
            match self.remote.delete(key).await {
                Ok(deleted) => deleted,
                Err(e) => {
                    self.record_error("delete", key, &e);
                    false
                }
            }
        } else {
            false
        };

        if l1_deleted || remote_deleted {
            self.counters.deletes.fetch_add(1, Ordering::Relaxed);
            counter!("recall_cache_deletes_total").increment(1);
        }
        l1_deleted || remote_deleted
    }

    #[instrument(skip(self))]
    async fn clear(&self) {
        if self.settings.enable_l1 {
            self.l1.clear().await;
        }

        if self.remote.is_connected() {
            if let Err(e) = self.remote.clear().await {
                self.record_error("clear", "*", &e);
            }
        }
    }
}

#[async_trait::async_trait]
impl KeyScanner for TieredCache {
    /// Prefer the remote tier (the authoritative keyspace) when connected;
    /// fall back to the L1 snapshot otherwise.
    async fn scan_keys(&self, cursor: u64, count: usize) -> Result<(u64, Vec<String>)> {
        if self.remote.is_connected() {
            self.remote.scan_keys(cursor, count).await
        } else if self.settings.enable_l1 {
            self.l1.scan_keys(cursor, count).await
        } else {
            Err(RecallError::validation(
                "Cache has no scannable tier: remote disconnected and L1 disabled",
            ))
        }
    }

    async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        if self.remote.is_connected() {
            match self.remote.remaining_ttl(key).await {
                Ok(ttl) => return ttl,
                Err(e) => self.record_error("ttl", key, &e),
            }
        }
        if self.settings.enable_l1 {
            return self.l1.remaining_ttl(key).await;
        }
        None
    }
}

impl MemoryBacked for TieredCache {
    fn memory_cache(&self) -> &L1MemoryCache {
        &self.l1
    }
}

impl RemoteBacked for TieredCache {
    fn remote_client(&self) -> &RemoteCacheClient {
        &self.remote
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn offline_settings() -> CacheSettings {
        CacheSettings {
            remote_url: "redis://192.0.2.1:1".to_string(),
            connect_timeout_ms: 200,
            command_timeout_ms: 200,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_l1_round_trip_without_remote() {
        let cache = TieredCache::from_settings(offline_settings()).unwrap();

        let value = json!({"summary": "short text", "confidence": 0.93});
        cache.set("op:abc", &value, None).await;
        assert_eq!(cache.get("op:abc").await, Some(value));
    }

    #[tokio::test]
    async fn test_graceful_degradation_when_remote_unreachable() {
        let cache = TieredCache::from_settings(offline_settings()).unwrap();

        assert_eq!(cache.connect().await.unwrap(), false);

        cache.set("k", &json!("still works"), None).await;
        assert_eq!(cache.get("k").await, Some(json!("still works")));

        let stats = cache.stats();
        assert!(!stats.connection.connected);
    }

    #[tokio::test]
    async fn test_fail_on_connection_error_surfaces() {
        let settings = CacheSettings {
            fail_on_connection_error: true,
            ..offline_settings()
        };
        let cache = TieredCache::from_settings(settings).unwrap();

        let err = cache.connect().await.unwrap_err();
        assert!(err.is_infrastructure());
    }

    #[tokio::test]
    async fn test_delete_reports_whether_anything_was_removed() {
        let cache = TieredCache::from_settings(offline_settings()).unwrap();

        cache.set("k", &json!(1), None).await;
        assert!(cache.delete("k").await);
        assert!(!cache.delete("k").await);
    }

    #[tokio::test]
    async fn test_clear_empties_l1() {
        let cache = TieredCache::from_settings(offline_settings()).unwrap();

        cache.set("a", &json!(1), None).await;
        cache.set("b", &json!(2), None).await;
        cache.clear().await;

        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, None);
    }

    #[tokio::test]
    async fn test_get_or_insert_with_runs_factory_once() {
        let cache = TieredCache::from_settings(offline_settings()).unwrap();
        let calls = std::sync::atomic::AtomicU32::new(0);

        let first = cache
            .get_or_insert_with("k", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                json!("computed")
            })
            .await;
        let second = cache
            .get_or_insert_with("k", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                json!("recomputed")
            })
            .await;

        assert_eq!(first, json!("computed"));
        assert_eq!(second, json!("computed"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let cache = TieredCache::from_settings(offline_settings()).unwrap();

        cache.set("k", &json!(1), None).await;
        cache.get("k").await;
        cache.get("absent").await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.l1_hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_encode_decode_round_trip_plain() {
        let cache = TieredCache::from_settings(offline_settings()).unwrap();
        let value = json!({"nested": {"list": [1, 2, 3], "s": "x"}});

        let wire = cache.encode_entry(&value, Some(Duration::from_secs(60))).unwrap();
        let (decoded, remaining) = cache.decode_entry(&wire).unwrap();

        assert_eq!(decoded, value);
        assert!(remaining.unwrap() <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_encode_decode_round_trip_compressed_and_encrypted() {
        use base64::Engine as _;
        let settings = CacheSettings {
            encryption_key: Some(base64::engine::general_purpose::STANDARD.encode([3u8; 32])),
            compression_threshold_bytes: 64,
            ..offline_settings()
        };
        let cache = TieredCache::from_settings(settings).unwrap();
        let value = json!({"text": "compressible ".repeat(200)});

        let wire = cache.encode_entry(&value, None).unwrap();
        let entry = CacheEntry::from_wire(&wire).unwrap();
        assert!(entry.compressed);
        assert!(entry.encrypted);

        let (decoded, _) = cache.decode_entry(&wire).unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn test_decode_under_wrong_key_fails() {
        use base64::Engine as _;
        let b64 = |b: u8| base64::engine::general_purpose::STANDARD.encode([b; 32]);

        let writer = TieredCache::from_settings(CacheSettings {
            encryption_key: Some(b64(1)),
            ..offline_settings()
        })
        .unwrap();
        let reader = TieredCache::from_settings(CacheSettings {
            encryption_key: Some(b64(2)),
            ..offline_settings()
        })
        .unwrap();

        let wire = writer.encode_entry(&json!("secret"), None).unwrap();
        assert!(reader.decode_entry(&wire).is_err());
    }

    #[tokio::test]
    async fn test_decode_corrupt_wire_fails_cleanly() {
        let cache = TieredCache::from_settings(offline_settings()).unwrap();
        assert!(cache.decode_entry(b"{\"broken\": true").is_err());
        assert!(cache.decode_entry(b"\x00\x01\x02").is_err());
    }

    #[tokio::test]
    async fn test_scan_falls_back_to_l1_when_offline() {
        let cache = TieredCache::from_settings(offline_settings()).unwrap();
        for i in 0..5 {
            cache.set(&format!("key-{}", i), &json!(i), None).await;
        }

        let (cursor, keys) = cache.scan_keys(0, 100).await.unwrap();
        assert_eq!(cursor, 0);
        assert_eq!(keys.len(), 5);
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected_at_construction() {
        let settings = CacheSettings {
            compression_level: 99,
            ..Default::default()
        };
        assert!(TieredCache::from_settings(settings).is_err());
    }
}

#![allow(clippy::result_large_err)]
//! # Recall Core
//!
//! Tiered operation-result cache engine for AI-backed text-processing
//! services: expensive, non-deterministic inference results are stored
//! under deterministic fingerprints so identical requests never repeat the
//! expensive call.
//!
//! ## Architecture
//!
//! - **Tiered Cache**: in-process L1 (LRU + TTL) over a durable
//!   Redis-compatible remote tier, with promotion on remote hits
//! - **Key Derivation**: collision-resistant fingerprints of
//!   (operation, text, options), order-insensitive for option maps
//! - **Transparent Compression**: gzip above a size threshold
//! - **At-Rest Encryption**: optional AES-256-GCM with fail-fast key
//!   validation
//! - **Graceful Degradation**: total remote unavailability degrades to a
//!   memory-only cache, never an error for the consumer
//! - **Migration**: chunked backup/restore artifacts and
//!   cross-implementation migration with resumable progress
//! - **Benchmarking**: synthetic workload runner with latency percentiles
//!   and threshold-based regression detection

pub mod bench;
pub mod cache;
pub mod config;
pub mod error;
pub mod migration;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, RecallError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bench::{
        BenchmarkResult, CacheBenchmark, ComparisonResult, RegressionDetector,
        RegressionSeverity, RegressionThresholds, TrendDirection,
    };
    pub use crate::cache::{
        CacheEntry, CacheKey, CacheStore, CompressionCodec, ConnectionSnapshot, EncryptionLayer,
        KeyBuilder, KeyScanner, L1MemoryCache, L1Stats, MemoryBacked, RemoteBacked,
        RemoteCacheClient, TieredCache, TieredCacheStats,
    };
    pub use crate::config::CacheSettings;
    pub use crate::error::{
        ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, RecallError, Result,
    };
    pub use crate::migration::{
        BackupManifest, KeyError, MigrationManager, MigrationResult, RestoreReport,
    };
}

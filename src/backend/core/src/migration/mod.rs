//! Bulk backup, restore, and cross-implementation migration.
//!
//! All three operations iterate the keyspace with chunked scans so a large
//! dataset never blocks the underlying store for the whole job, and all
//! three are cancellable at chunk boundaries, leaving the cache consistent
//! (no partial writes visible as corrupt entries).
//!
//! Backups are a single gzip artifact of JSON lines: a versioned header
//! line followed by one record per key. Values are stored decoded, so an
//! artifact written by one deployment (with its compression threshold and
//! encryption key) restores cleanly into another.

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, KeyScanner};
use crate::error::{RecallError, Result};

/// Artifact format identifier in the backup header.
const BACKUP_FORMAT: &str = "recall-backup";
/// Current artifact format version.
const BACKUP_VERSION: u32 = 1;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Types
// ═══════════════════════════════════════════════════════════════════════════════

/// A per-key failure recorded during a batch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyError {
    pub key: String,
    pub reason: String,
}

/// Outcome of a backup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub format_version: u32,
    pub key_count: u64,
    pub total_bytes: u64,
    pub compressed_bytes: u64,
    pub errors: Vec<KeyError>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Outcome of a restore run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    pub restored: u64,
    pub skipped: u64,
    pub errors: Vec<KeyError>,
    pub duration_ms: u64,
    /// False when the run was cancelled before reaching the end of the
    /// artifact; everything restored so far remains valid.
    pub completed: bool,
}

/// Outcome of a cross-implementation migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    pub total_keys: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// `succeeded / total_keys`; 1.0 by convention for empty migrations.
    pub success_rate: f64,
    pub duration_ms: u64,
    /// Index of the last fully-processed scan chunk, for resuming after a
    /// partial failure or cancellation.
    pub last_completed_chunk: Option<u64>,
    /// False when the run was cancelled mid-keyspace.
    pub completed: bool,
    pub errors: Vec<KeyError>,
}

impl MigrationResult {
    fn finalize(mut self) -> Self {
        self.success_rate = if self.total_keys == 0 {
            1.0
        } else {
            self.succeeded as f64 / self.total_keys as f64
        };
        self
    }
}

/// One record line in the backup artifact.
#[derive(Debug, Serialize, Deserialize)]
struct BackupRecord {
    key: String,
    value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupHeader {
    format: String,
    version: u32,
    created_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Migration Manager
// ═══════════════════════════════════════════════════════════════════════════════

/// Drives backup, restore, and migration against anything satisfying the
/// cache contract. Holds no cache state of its own.
#[derive(Debug, Clone)]
pub struct MigrationManager {
    chunk_size: usize,
    scan_count: usize,
    key_filter: Option<Regex>,
    verify_writes: bool,
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationManager {
    pub fn new() -> Self {
        Self {
            chunk_size: 100,
            scan_count: 100,
            key_filter: None,
            verify_writes: false,
        }
    }

    /// Number of keys processed between cancellation checks.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// SCAN batch size hint passed to the underlying store.
    pub fn with_scan_count(mut self, scan_count: usize) -> Self {
        self.scan_count = scan_count.max(1);
        self
    }

    /// Restrict backup/migration to keys matching a pattern.
    pub fn with_key_filter(mut self, filter: Regex) -> Self {
        self.key_filter = Some(filter);
        self
    }

    /// Read each migrated key back from the target and compare values.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_writes = verify;
        self
    }

    fn key_matches(&self, key: &str) -> bool {
        self.key_filter
            .as_ref()
            .map(|re| re.is_match(key))
            .unwrap_or(true)
    }

    /// Collect the full (filtered) key list in scan-sized batches.
    async fn collect_keys<C: KeyScanner + ?Sized>(&self, cache: &C) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next_cursor, batch) = cache.scan_keys(cursor, self.scan_count).await?;
            keys.extend(batch.into_iter().filter(|k| self.key_matches(k)));
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
            // Chunked scanning: yield between batches so this background job
            // never monopolizes the store or the executor.
            tokio::task::yield_now().await;
        }
        Ok(keys)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Backup
    // ─────────────────────────────────────────────────────────────────────────

    /// Serialize every (filtered) key, value, and remaining TTL into a
    /// single compressed backup artifact.
    ///
    /// Individual per-key read errors are recorded in the manifest and do
    /// not abort the backup. Cancellation aborts at a chunk boundary and
    /// removes the partial artifact.
    pub async fn create_backup<C>(
        &self,
        cache: &C,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<BackupManifest>
    where
        C: CacheStore + KeyScanner,
    {
        let started_at = Utc::now();
        let keys = self.collect_keys(cache).await?;
        info!(keys = keys.len(), dest = %destination.display(), "starting cache backup");

        let file = File::create(destination)?;
        let mut encoder = GzEncoder::new(file, Compression::default());

        let header = BackupHeader {
            format: BACKUP_FORMAT.to_string(),
            version: BACKUP_VERSION,
            created_at: started_at,
        };
        let header_line = serde_json::to_string(&header)?;
        writeln!(encoder, "{}", header_line)?;

        let mut key_count = 0u64;
        let mut total_bytes = 0u64;
        let mut errors = Vec::new();

        for chunk in keys.chunks(self.chunk_size) {
            if cancel.is_cancelled() {
                drop(encoder);
                let _ = std::fs::remove_file(destination);
                warn!("backup cancelled, partial artifact removed");
                return Err(RecallError::cancelled("backup"));
            }

            for key in chunk {
                match cache.get(key).await {
                    Some(value) => {
                        let ttl_secs = cache
                            .remaining_ttl(key)
                            .await
                            .map(|ttl| ttl.as_secs());
                        let record = BackupRecord {
                            key: key.clone(),
                            value,
                            ttl_secs,
                        };
                        let line = serde_json::to_string(&record)?;
                        total_bytes += line.len() as u64;
                        writeln!(encoder, "{}", line)?;
                        key_count += 1;
                    }
                    None => {
                        errors.push(KeyError {
                            key: key.clone(),
                            reason: "read returned no value".to_string(),
                        });
                    }
                }
            }
            tokio::task::yield_now().await;
        }

        let file = encoder.finish()?;
        file.sync_all()?;
        let compressed_bytes = file.metadata()?.len();

        let manifest = BackupManifest {
            format_version: BACKUP_VERSION,
            key_count,
            total_bytes,
            compressed_bytes,
            errors,
            started_at,
            completed_at: Utc::now(),
        };
        info!(
            keys = manifest.key_count,
            errors = manifest.errors.len(),
            compressed_bytes = manifest.compressed_bytes,
            "backup complete"
        );
        Ok(manifest)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Restore
    // ─────────────────────────────────────────────────────────────────────────

    /// Re-apply keys, values, and TTLs from a backup artifact.
    ///
    /// Unknown or corrupt records are skipped and reported, never fatal; a
    /// corrupt header or unsupported version aborts the whole restore with a
    /// validation error before anything is written.
    pub async fn restore<C>(
        &self,
        cache: &C,
        source: &Path,
        cancel: &CancellationToken,
    ) -> Result<RestoreReport>
    where
        C: CacheStore,
    {
        let started = Instant::now();
        let file = File::open(source)
            .map_err(|e| RecallError::corrupt_artifact(source.display().to_string(), e.to_string()))?;
        let reader = BufReader::new(GzDecoder::new(file));
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| {
                RecallError::corrupt_artifact(source.display().to_string(), "artifact is empty")
            })?
            .map_err(|e| RecallError::corrupt_artifact(source.display().to_string(), e.to_string()))?;
        let header: BackupHeader = serde_json::from_str(&header_line).map_err(|e| {
            RecallError::corrupt_artifact(source.display().to_string(), format!("bad header: {}", e))
        })?;

        if header.format != BACKUP_FORMAT {
            return Err(RecallError::corrupt_artifact(
                source.display().to_string(),
                format!("unknown format {:?}", header.format),
            ));
        }
        if header.version != BACKUP_VERSION {
            return Err(RecallError::unsupported_artifact_version(
                header.version,
                BACKUP_VERSION,
            ));
        }

        let mut restored = 0u64;
        let mut skipped = 0u64;
        let mut errors = Vec::new();
        let mut completed = true;
        let mut line_no = 1u64;

        for line in lines {
            line_no += 1;
            if restored % self.chunk_size as u64 == 0 && cancel.is_cancelled() {
                completed = false;
                warn!(restored, "restore cancelled at chunk boundary");
                break;
            }

            let line = match line {
                Ok(line) if !line.trim().is_empty() => line,
                Ok(_) => continue,
                Err(e) => {
                    skipped += 1;
                    errors.push(KeyError {
                        key: format!("line {}", line_no),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match serde_json::from_str::<BackupRecord>(&line) {
                Ok(record) => {
                    let ttl = record.ttl_secs.map(Duration::from_secs);
                    cache.set(&record.key, &record.value, ttl).await;
                    restored += 1;
                }
                Err(e) => {
                    skipped += 1;
                    errors.push(KeyError {
                        key: format!("line {}", line_no),
                        reason: format!("corrupt record: {}", e),
                    });
                }
            }
        }

        let report = RestoreReport {
            restored,
            skipped,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
            completed,
        };
        info!(
            restored = report.restored,
            skipped = report.skipped,
            "restore complete"
        );
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Migration
    // ─────────────────────────────────────────────────────────────────────────

    /// Copy every (filtered) key from `source` to `target`, preserving
    /// value and remaining TTL.
    ///
    /// Failures are tracked per key; the result reports the last fully
    /// processed chunk so a caller can resume by retrying only what failed.
    pub async fn migrate<S, T>(
        &self,
        source: &S,
        target: &T,
        cancel: &CancellationToken,
    ) -> Result<MigrationResult>
    where
        S: CacheStore + KeyScanner,
        T: CacheStore,
    {
        let started = Instant::now();
        let keys = self.collect_keys(source).await?;
        info!(keys = keys.len(), "starting cache migration");

        let mut result = MigrationResult {
            total_keys: keys.len() as u64,
            succeeded: 0,
            failed: 0,
            success_rate: 0.0,
            duration_ms: 0,
            last_completed_chunk: None,
            completed: true,
            errors: Vec::new(),
        };

        for (chunk_index, chunk) in keys.chunks(self.chunk_size).enumerate() {
            if cancel.is_cancelled() {
                result.completed = false;
                warn!(chunk = chunk_index, "migration cancelled at chunk boundary");
                break;
            }

            for key in chunk {
                let Some(value) = source.get(key).await else {
                    result.failed += 1;
                    result.errors.push(KeyError {
                        key: key.clone(),
                        reason: "source read returned no value".to_string(),
                    });
                    continue;
                };
                let ttl = source.remaining_ttl(key).await;

                target.set(key, &value, ttl).await;

                if self.verify_writes {
                    match target.get(key).await {
                        Some(written) if written == value => result.succeeded += 1,
                        Some(_) => {
                            result.failed += 1;
                            result.errors.push(KeyError {
                                key: key.clone(),
                                reason: "target readback returned a different value".to_string(),
                            });
                        }
                        None => {
                            result.failed += 1;
                            result.errors.push(KeyError {
                                key: key.clone(),
                                reason: "target readback returned no value".to_string(),
                            });
                        }
                    }
                } else {
                    result.succeeded += 1;
                }
            }

            result.last_completed_chunk = Some(chunk_index as u64);
            debug!(chunk = chunk_index, "migration chunk complete");
            tokio::task::yield_now().await;
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        let result = result.finalize();
        info!(
            total = result.total_keys,
            succeeded = result.succeeded,
            failed = result.failed,
            "migration complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_is_one_for_empty_migration() {
        let result = MigrationResult {
            total_keys: 0,
            succeeded: 0,
            failed: 0,
            success_rate: 0.0,
            duration_ms: 0,
            last_completed_chunk: None,
            completed: true,
            errors: Vec::new(),
        }
        .finalize();

        assert_eq!(result.success_rate, 1.0);
    }

    #[test]
    fn test_success_rate_fraction() {
        let result = MigrationResult {
            total_keys: 4,
            succeeded: 3,
            failed: 1,
            success_rate: 0.0,
            duration_ms: 0,
            last_completed_chunk: Some(0),
            completed: true,
            errors: Vec::new(),
        }
        .finalize();

        assert!((result.success_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_builder_clamps_zero_sizes() {
        let manager = MigrationManager::new().with_chunk_size(0).with_scan_count(0);
        assert_eq!(manager.chunk_size, 1);
        assert_eq!(manager.scan_count, 1);
    }

    #[test]
    fn test_key_filter() {
        let manager =
            MigrationManager::new().with_key_filter(Regex::new("^summarize:").unwrap());
        assert!(manager.key_matches("summarize:abc"));
        assert!(!manager.key_matches("sentiment:abc"));
    }
}

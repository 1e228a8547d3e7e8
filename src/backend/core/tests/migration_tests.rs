//! Integration tests for backup, restore, and migration.
//!
//! All scenarios run against the L1 tier (which satisfies the same
//! `CacheStore + KeyScanner` contract as a connected tiered cache), so the
//! suite needs no live remote store.

use recall_core::cache::{CacheStore, L1MemoryCache};
use recall_core::error::ErrorCode;
use recall_core::migration::MigrationManager;
use regex::Regex;
use serde_json::json;
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Utilities
// ============================================================================

async fn populated_cache(keys: usize) -> L1MemoryCache {
    let cache = L1MemoryCache::new(keys * 2);
    for i in 0..keys {
        let key = format!("summarize:key-{:04}", i);
        let value = json!({"index": i, "summary": format!("result {}", i)});
        cache.set(&key, &value, Some(Duration::from_secs(600))).await;
    }
    cache
}

fn artifact_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join(name)
}

// ============================================================================
// Backup + Restore
// ============================================================================

#[tokio::test]
async fn test_backup_then_restore_round_trip() {
    let source = populated_cache(40).await;
    let dir = tempfile::tempdir().unwrap();
    let path = artifact_path(&dir, "cache.backup.gz");
    let manager = MigrationManager::new().with_chunk_size(10);
    let cancel = CancellationToken::new();

    let manifest = manager.create_backup(&source, &path, &cancel).await.unwrap();
    assert_eq!(manifest.key_count, 40);
    assert!(manifest.errors.is_empty());
    assert!(manifest.compressed_bytes > 0);
    assert!(manifest.compressed_bytes < manifest.total_bytes);
    assert!(manifest.completed_at >= manifest.started_at);

    let target = L1MemoryCache::new(100);
    let report = manager.restore(&target, &path, &cancel).await.unwrap();
    assert_eq!(report.restored, 40);
    assert_eq!(report.skipped, 0);
    assert!(report.completed);

    for i in 0..40 {
        let key = format!("summarize:key-{:04}", i);
        let restored = target.get(&key).await.unwrap();
        assert_eq!(restored["index"], json!(i));
    }
}

#[tokio::test]
async fn test_backup_preserves_remaining_ttl() {
    let source = L1MemoryCache::new(10);
    source
        .set("k", &json!("v"), Some(Duration::from_secs(500)))
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = artifact_path(&dir, "ttl.backup.gz");
    let manager = MigrationManager::new();
    let cancel = CancellationToken::new();

    manager.create_backup(&source, &path, &cancel).await.unwrap();

    let target = L1MemoryCache::new(10);
    manager.restore(&target, &path, &cancel).await.unwrap();

    use recall_core::cache::KeyScanner;
    let remaining = target.remaining_ttl("k").await.unwrap();
    assert!(remaining <= Duration::from_secs(500));
    assert!(remaining > Duration::from_secs(490));
}

#[tokio::test]
async fn test_selective_backup_with_key_filter() {
    let cache = L1MemoryCache::new(20);
    cache.set("summarize:a", &json!(1), None).await;
    cache.set("summarize:b", &json!(2), None).await;
    cache.set("sentiment:c", &json!(3), None).await;

    let dir = tempfile::tempdir().unwrap();
    let path = artifact_path(&dir, "filtered.backup.gz");
    let manager =
        MigrationManager::new().with_key_filter(Regex::new("^summarize:").unwrap());
    let cancel = CancellationToken::new();

    let manifest = manager.create_backup(&cache, &path, &cancel).await.unwrap();
    assert_eq!(manifest.key_count, 2);
}

#[tokio::test]
async fn test_restore_skips_corrupt_records() {
    let source = populated_cache(5).await;
    let dir = tempfile::tempdir().unwrap();
    let path = artifact_path(&dir, "mixed.backup.gz");
    let manager = MigrationManager::new();
    let cancel = CancellationToken::new();
    manager.create_backup(&source, &path, &cancel).await.unwrap();

    // Append a corrupt record to the artifact.
    let bytes = std::fs::read(&path).unwrap();
    let mut decompressed = Vec::new();
    use std::io::Read;
    flate2::read::GzDecoder::new(&bytes[..])
        .read_to_end(&mut decompressed)
        .unwrap();
    decompressed.extend_from_slice(b"{\"key\": \"broken\", \"value\": \n");

    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    encoder.write_all(&decompressed).unwrap();
    encoder.finish().unwrap();

    let target = L1MemoryCache::new(100);
    let report = manager.restore(&target, &path, &cancel).await.unwrap();
    assert_eq!(report.restored, 5);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.errors.len(), 1);
}

#[tokio::test]
async fn test_restore_rejects_unknown_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = artifact_path(&dir, "future.backup.gz");

    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    writeln!(
        encoder,
        "{}",
        json!({"format": "recall-backup", "version": 99, "created_at": "2026-01-01T00:00:00Z"})
    )
    .unwrap();
    encoder.finish().unwrap();

    let target = L1MemoryCache::new(10);
    let manager = MigrationManager::new();
    let err = manager
        .restore(&target, &path, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedArtifactVersion);
}

#[tokio::test]
async fn test_restore_rejects_garbage_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = artifact_path(&dir, "garbage.bin");
    std::fs::write(&path, b"this is not a gzip json-lines artifact").unwrap();

    let target = L1MemoryCache::new(10);
    let manager = MigrationManager::new();
    let err = manager
        .restore(&target, &path, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.code().is_validation());
}

#[tokio::test]
async fn test_cancelled_backup_removes_partial_artifact() {
    let source = populated_cache(50).await;
    let dir = tempfile::tempdir().unwrap();
    let path = artifact_path(&dir, "cancelled.backup.gz");
    let manager = MigrationManager::new().with_chunk_size(5);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = manager.create_backup(&source, &path, &cancel).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Cancelled);
    assert!(!path.exists());
}

// ============================================================================
// Migration
// ============================================================================

#[tokio::test]
async fn test_migration_fidelity_250_keys() {
    let source = populated_cache(250).await;
    let target = L1MemoryCache::new(600);
    let manager = MigrationManager::new().with_chunk_size(50).with_verification(true);

    let result = manager
        .migrate(&source, &target, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.total_keys, 250);
    assert_eq!(result.succeeded, 250);
    assert_eq!(result.failed, 0);
    assert_eq!(result.success_rate, 1.0);
    assert!(result.completed);
    assert_eq!(result.last_completed_chunk, Some(4));
    assert!(result.errors.is_empty());

    use recall_core::cache::KeyScanner;
    for i in 0..250 {
        let key = format!("summarize:key-{:04}", i);
        let migrated = target.get(&key).await.unwrap();
        assert_eq!(migrated["summary"], json!(format!("result {}", i)));

        let remaining = target.remaining_ttl(&key).await.unwrap();
        assert!(remaining <= Duration::from_secs(600));
        assert!(remaining > Duration::from_secs(580));
    }
}

#[tokio::test]
async fn test_empty_migration_has_success_rate_one() {
    let source = L1MemoryCache::new(10);
    let target = L1MemoryCache::new(10);
    let manager = MigrationManager::new();

    let result = manager
        .migrate(&source, &target, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.total_keys, 0);
    assert_eq!(result.success_rate, 1.0);
    assert!(result.completed);
    assert_eq!(result.last_completed_chunk, None);
}

#[tokio::test]
async fn test_cancelled_migration_reports_partial_progress() {
    let source = populated_cache(50).await;
    let target = L1MemoryCache::new(200);
    let manager = MigrationManager::new().with_chunk_size(10);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = manager.migrate(&source, &target, &cancel).await.unwrap();
    assert!(!result.completed);
    assert_eq!(result.succeeded, 0);
    assert_eq!(result.last_completed_chunk, None);
}

#[tokio::test]
async fn test_filtered_migration_copies_only_matches() {
    let source = L1MemoryCache::new(20);
    source.set("summarize:a", &json!(1), None).await;
    source.set("sentiment:b", &json!(2), None).await;
    let target = L1MemoryCache::new(20);

    let manager =
        MigrationManager::new().with_key_filter(Regex::new("^sentiment:").unwrap());
    let result = manager
        .migrate(&source, &target, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.total_keys, 1);
    assert_eq!(target.get("sentiment:b").await, Some(json!(2)));
    assert_eq!(target.get("summarize:a").await, None);
}

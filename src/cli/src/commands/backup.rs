//! Backup command.

use anyhow::Result;
use clap::Args;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use crate::commands::{cancel_on_ctrl_c, connected_cache};
use crate::output::{self, OutputFormat};
use recall_core::config::CacheSettings;
use recall_core::migration::MigrationManager;

#[derive(Args)]
pub struct BackupArgs {
    /// Destination path for the compressed backup artifact
    pub destination: PathBuf,

    /// Keys processed between cancellation checks
    #[arg(long, default_value_t = 100)]
    pub chunk_size: usize,

    /// SCAN batch size hint for the remote store
    #[arg(long, default_value_t = 100)]
    pub scan_count: usize,

    /// Only back up keys matching this regex
    #[arg(long)]
    pub pattern: Option<String>,
}

#[derive(Tabled, Serialize)]
struct ErrorRow {
    key: String,
    reason: String,
}

pub async fn execute(args: &BackupArgs, settings: CacheSettings, format: OutputFormat) -> Result<()> {
    let cache = connected_cache(settings).await?;
    let cancel = cancel_on_ctrl_c();

    let mut manager = MigrationManager::new()
        .with_chunk_size(args.chunk_size)
        .with_scan_count(args.scan_count);
    if let Some(ref pattern) = args.pattern {
        manager = manager.with_key_filter(Regex::new(pattern)?);
    }

    let manifest = manager
        .create_backup(&cache, &args.destination, &cancel)
        .await?;
    cache.disconnect().await;

    match format {
        OutputFormat::Table => {
            output::print_header("Backup Manifest");
            output::print_detail("Artifact", args.destination.display());
            output::print_detail("Keys", manifest.key_count);
            output::print_detail("Raw bytes", manifest.total_bytes);
            output::print_detail("Compressed bytes", manifest.compressed_bytes);
            output::print_detail(
                "Duration",
                format!(
                    "{}ms",
                    (manifest.completed_at - manifest.started_at).num_milliseconds()
                ),
            );
            if manifest.errors.is_empty() {
                output::print_success("backup completed with no per-key errors");
            } else {
                output::print_warning(&format!(
                    "{} keys could not be read",
                    manifest.errors.len()
                ));
                let rows: Vec<ErrorRow> = manifest
                    .errors
                    .iter()
                    .map(|e| ErrorRow {
                        key: e.key.clone(),
                        reason: e.reason.clone(),
                    })
                    .collect();
                output::print_list(&rows, format);
            }
        }
        _ => output::print_item(&manifest, format),
    }

    Ok(())
}

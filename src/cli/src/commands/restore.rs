//! Restore command.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::commands::{cancel_on_ctrl_c, connected_cache};
use crate::output::{self, OutputFormat};
use recall_core::config::CacheSettings;
use recall_core::migration::MigrationManager;

#[derive(Args)]
pub struct RestoreArgs {
    /// Backup artifact to restore
    pub source: PathBuf,

    /// Keys processed between cancellation checks
    #[arg(long, default_value_t = 100)]
    pub chunk_size: usize,
}

pub async fn execute(args: &RestoreArgs, settings: CacheSettings, format: OutputFormat) -> Result<()> {
    let cache = connected_cache(settings).await?;
    let cancel = cancel_on_ctrl_c();

    let manager = MigrationManager::new().with_chunk_size(args.chunk_size);
    let report = manager.restore(&cache, &args.source, &cancel).await?;
    cache.disconnect().await;

    match format {
        OutputFormat::Table => {
            output::print_header("Restore Report");
            output::print_detail("Artifact", args.source.display());
            output::print_detail("Restored", report.restored);
            output::print_detail("Skipped", report.skipped);
            output::print_detail("Duration", format!("{}ms", report.duration_ms));
            if !report.completed {
                output::print_warning("restore was cancelled before reaching the end of the artifact");
            } else if report.skipped == 0 {
                output::print_success("restore completed cleanly");
            } else {
                output::print_warning(&format!("{} corrupt records skipped", report.skipped));
            }
        }
        _ => output::print_item(&report, format),
    }

    Ok(())
}

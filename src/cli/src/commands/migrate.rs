//! Cross-store migration command.

use anyhow::Result;
use clap::Args;
use regex::Regex;
use serde::Serialize;
use tabled::Tabled;

use crate::commands::{cancel_on_ctrl_c, connected_cache};
use crate::output::{self, OutputFormat};
use recall_core::config::CacheSettings;
use recall_core::migration::MigrationManager;

#[derive(Args)]
pub struct MigrateArgs {
    /// Remote URL of the migration target
    pub target_url: String,

    /// Key namespace prefix in the target store (defaults to the source prefix)
    #[arg(long)]
    pub target_prefix: Option<String>,

    /// Keys processed between cancellation checks
    #[arg(long, default_value_t = 100)]
    pub chunk_size: usize,

    /// Only migrate keys matching this regex
    #[arg(long)]
    pub pattern: Option<String>,

    /// Read each key back from the target and compare values
    #[arg(long)]
    pub verify: bool,
}

#[derive(Tabled, Serialize)]
struct ErrorRow {
    key: String,
    reason: String,
}

pub async fn execute(args: &MigrateArgs, settings: CacheSettings, format: OutputFormat) -> Result<()> {
    let mut target_settings = settings.clone();
    target_settings.remote_url = args.target_url.clone();
    if let Some(ref prefix) = args.target_prefix {
        target_settings.key_prefix = prefix.clone();
    }

    let source = connected_cache(settings).await?;
    let target = connected_cache(target_settings).await?;
    let cancel = cancel_on_ctrl_c();

    let mut manager = MigrationManager::new()
        .with_chunk_size(args.chunk_size)
        .with_verification(args.verify);
    if let Some(ref pattern) = args.pattern {
        manager = manager.with_key_filter(Regex::new(pattern)?);
    }

    let result = manager.migrate(&source, &target, &cancel).await?;
    source.disconnect().await;
    target.disconnect().await;

    match format {
        OutputFormat::Table => {
            output::print_header("Migration Result");
            output::print_detail("Target", &args.target_url);
            output::print_detail("Total keys", result.total_keys);
            output::print_detail("Succeeded", result.succeeded);
            output::print_detail("Failed", result.failed);
            output::print_detail(
                "Success rate",
                format!("{:.1}%", result.success_rate * 100.0),
            );
            output::print_detail("Duration", format!("{}ms", result.duration_ms));
            if let Some(chunk) = result.last_completed_chunk {
                output::print_detail("Last completed chunk", chunk);
            }
            if !result.completed {
                output::print_warning(
                    "migration was cancelled; rerun to continue from the reported chunk",
                );
            } else if result.failed == 0 {
                output::print_success("migration completed cleanly");
            } else {
                output::print_warning(&format!("{} keys failed", result.failed));
            }
            if !result.errors.is_empty() {
                let rows: Vec<ErrorRow> = result
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
        _ => output::print_item(&result, format),
    }

    Ok(())
}

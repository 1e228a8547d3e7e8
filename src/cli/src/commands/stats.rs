//! Cache statistics command.

use anyhow::Result;
use clap::Args;

use crate::commands::connected_cache;
use crate::output::{self, OutputFormat};
use recall_core::config::CacheSettings;

#[derive(Args)]
pub struct StatsArgs {
    /// Skip the connection attempt and report on the cold instance
    #[arg(long)]
    offline: bool,
}

pub async fn execute(args: &StatsArgs, settings: CacheSettings, format: OutputFormat) -> Result<()> {
    let cache = if args.offline {
        recall_core::cache::TieredCache::from_settings(settings)?
    } else {
        connected_cache(settings).await?
    };

    let stats = cache.stats();

    match format {
        OutputFormat::Table => {
            output::print_header("Cache Statistics");
            output::print_detail("Remote URL", &cache.settings().remote_url);
            output::print_detail(
                "Connection",
                if stats.connection.connected {
                    "connected"
                } else {
                    "disconnected"
                },
            );
            if let Some(ms) = stats.connection.ms_since_last_attempt {
                output::print_detail("Last attempt", format!("{}ms ago", ms));
            }
            output::print_detail("Hits", stats.hits);
            output::print_detail("Misses", stats.misses);
            output::print_detail("Hit rate", format!("{:.1}%", stats.hit_rate * 100.0));
            output::print_detail("L1 hits", stats.l1_hits);
            output::print_detail("Remote hits", stats.remote_hits);
            output::print_detail("Promotions", stats.promotions);
            output::print_detail("Errors", stats.errors);
            output::print_detail(
                "L1 occupancy",
                format!("{}/{}", stats.l1.entries, stats.l1.capacity),
            );
            output::print_detail("L1 evictions", stats.l1.evictions);
        }
        _ => output::print_item(&stats, format),
    }

    cache.disconnect().await;
    Ok(())
}

//! CLI command implementations.

pub mod backup;
pub mod bench;
pub mod config;
pub mod migrate;
pub mod restore;
pub mod stats;

use recall_core::cache::TieredCache;
use recall_core::config::CacheSettings;
use tokio_util::sync::CancellationToken;

use crate::output;

/// Build a cache from settings and attempt to connect the remote tier.
///
/// Connection failure is not fatal (the cache degrades to L1-only), but the
/// operator is told about it.
pub async fn connected_cache(settings: CacheSettings) -> anyhow::Result<TieredCache> {
    let cache = TieredCache::from_settings(settings)?;
    if !cache.connect().await? {
        output::print_warning(&format!(
            "remote store {} is unreachable; operating on the in-process tier only",
            cache.settings().remote_url
        ));
    }
    Ok(cache)
}

/// A cancellation token wired to Ctrl-C, for long-running batch commands.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            output::print_warning("cancellation requested, stopping at the next chunk boundary");
            handle.cancel();
        }
    });
    cancel
}

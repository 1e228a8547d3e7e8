//! Recall CLI - Command-line interface for operating Recall caches.
//!
//! Provides commands for cache statistics, backup, restore, migration,
//! benchmarking, and configuration validation.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{backup, bench, config, migrate, restore, stats};
use output::OutputFormat;
use recall_core::config::CacheSettings;
use recall_core::telemetry::{init_logging, LogFormat, LoggingConfig};

/// Recall - Tiered Operation-Result Cache CLI
#[derive(Parser)]
#[command(
    name = "recall",
    version = "0.1.0",
    about = "Recall - Tiered Operation-Result Cache",
    long_about = "CLI tool for operating Recall caches: statistics, backup, restore, \
                  cross-store migration, benchmarking, and configuration validation.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Configuration file (falls back to RECALL__* environment variables)
    #[arg(short, long, global = true, env = "RECALL_CONFIG")]
    config: Option<String>,

    /// Remote store URL override
    #[arg(long, global = true, env = "RECALL_REMOTE_URL")]
    remote_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cache statistics and connection state
    Stats(stats::StatsArgs),

    /// Back up the cache into a compressed artifact
    Backup(backup::BackupArgs),

    /// Restore a backup artifact into the cache
    Restore(restore::RestoreArgs),

    /// Migrate all keys to another remote store
    Migrate(migrate::MigrateArgs),

    /// Benchmarking operations
    #[command(subcommand)]
    Bench(bench::BenchCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

fn load_settings(cli: &Cli) -> Result<CacheSettings> {
    let mut settings = match cli.config.as_deref() {
        Some(path) => CacheSettings::from_file(path)?,
        None => CacheSettings::load().unwrap_or_default(),
    };
    if let Some(ref url) = cli.remote_url {
        settings.remote_url = url.clone();
    }
    settings.validate()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    init_logging(&LoggingConfig {
        level: "warn".to_string(),
        format: LogFormat::Compact,
        ..Default::default()
    });

    let format = cli.output;
    let result = match &cli.command {
        Commands::Stats(args) => {
            let settings = load_settings(&cli)?;
            stats::execute(args, settings, format).await
        }
        Commands::Backup(args) => {
            let settings = load_settings(&cli)?;
            backup::execute(args, settings, format).await
        }
        Commands::Restore(args) => {
            let settings = load_settings(&cli)?;
            restore::execute(args, settings, format).await
        }
        Commands::Migrate(args) => {
            let settings = load_settings(&cli)?;
            migrate::execute(args, settings, format).await
        }
        Commands::Bench(cmd) => {
            let settings = load_settings(&cli)?;
            bench::execute(cmd, settings, format).await
        }
        Commands::Config(cmd) => config::execute(cmd, &cli.config, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

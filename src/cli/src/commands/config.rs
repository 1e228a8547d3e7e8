//! Configuration management commands.

use anyhow::Result;
use clap::Subcommand;

use crate::output::{self, OutputFormat};
use recall_core::config::CacheSettings;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the effective configuration and report every violation
    Validate,

    /// Show the effective configuration (encryption key redacted)
    Show,
}

fn effective_settings(config_path: &Option<String>) -> Result<CacheSettings> {
    Ok(match config_path.as_deref() {
        Some(path) => CacheSettings::from_file(path)?,
        None => CacheSettings::load().unwrap_or_default(),
    })
}

pub async fn execute(
    cmd: &ConfigCommands,
    config_path: &Option<String>,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        ConfigCommands::Validate => {
            let settings = effective_settings(config_path)?;
            match settings.validate() {
                Ok(()) => output::print_success("configuration is valid"),
                Err(e) => {
                    output::print_error(e.user_message());
                    if let Some(violations) = e.details().context.get("violations") {
                        if let Some(list) = violations.as_array() {
                            for violation in list {
                                output::print_detail(
                                    "violation",
                                    violation.as_str().unwrap_or_default(),
                                );
                            }
                        }
                    }
                    std::process::exit(1);
                }
            }
        }
        ConfigCommands::Show => {
            let mut settings = effective_settings(config_path)?;
            if settings.encryption_key.is_some() {
                settings.encryption_key = Some("<redacted>".to_string());
            }

            match format {
                OutputFormat::Table => {
                    output::print_header("Effective Configuration");
                    output::print_detail("remote_url", &settings.remote_url);
                    output::print_detail("default_ttl_seconds", settings.default_ttl_seconds);
                    output::print_detail("enable_l1", settings.enable_l1);
                    output::print_detail("l1_max_entries", settings.l1_max_entries);
                    output::print_detail(
                        "compression_threshold_bytes",
                        settings.compression_threshold_bytes,
                    );
                    output::print_detail("compression_level", settings.compression_level);
                    output::print_detail(
                        "encryption_key",
                        settings.encryption_key.as_deref().unwrap_or("<unset>"),
                    );
                    output::print_detail(
                        "fail_on_connection_error",
                        settings.fail_on_connection_error,
                    );
                    output::print_detail("key_prefix", &settings.key_prefix);
                    output::print_detail("connect_timeout_ms", settings.connect_timeout_ms);
                    output::print_detail("command_timeout_ms", settings.command_timeout_ms);
                    output::print_detail("reconnect_throttle_ms", settings.reconnect_throttle_ms);
                }
                _ => print_settings(&settings, format),
            }
        }
    }

    Ok(())
}

fn print_settings(settings: &CacheSettings, format: OutputFormat) {
    // CacheSettings is Deserialize-only in the core crate; render through a
    // JSON value for machine-readable output.
    let value = serde_json::json!({
        "remote_url": settings.remote_url,
        "default_ttl_seconds": settings.default_ttl_seconds,
        "enable_l1": settings.enable_l1,
        "l1_max_entries": settings.l1_max_entries,
        "compression_threshold_bytes": settings.compression_threshold_bytes,
        "compression_level": settings.compression_level,
        "encryption_key": settings.encryption_key,
        "fail_on_connection_error": settings.fail_on_connection_error,
        "key_prefix": settings.key_prefix,
        "connect_timeout_ms": settings.connect_timeout_ms,
        "command_timeout_ms": settings.command_timeout_ms,
        "reconnect_throttle_ms": settings.reconnect_throttle_ms,
    });
    output::print_item(&value, format);
}

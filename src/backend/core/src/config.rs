//! Configuration management.
//!
//! All cache behavior is driven by a single typed [`CacheSettings`] struct.
//! Validation happens once, at construction, via [`CacheSettings::validate`],
//! which reports every violation at once instead of failing on the first.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{ErrorDetails, RecallError, Result};

/// Settings for a tiered cache instance.
///
/// Loadable from the environment (`RECALL__` prefix) or a config file, and
/// constructible in code for tests and embedded use.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Remote key-value store connection URL
    #[serde(default = "default_remote_url")]
    pub remote_url: String,

    /// Default TTL applied to entries written without an explicit TTL
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,

    /// Enable the in-process L1 tier
    #[serde(default = "default_enable_l1")]
    pub enable_l1: bool,

    /// Maximum number of entries held by the L1 tier
    #[serde(default = "default_l1_max_entries")]
    pub l1_max_entries: usize,

    /// Payloads at or above this size are compressed before storage
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold_bytes: usize,

    /// Compression level (1 = fastest, 9 = best ratio)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// Optional base64-encoded 32-byte symmetric encryption key.
    /// When absent, entries are stored unencrypted (local/testing only).
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Surface connection errors from `connect()` instead of degrading
    /// to L1-only operation. Defaults to false: graceful fallback wins.
    #[serde(default)]
    pub fail_on_connection_error: bool,

    /// Namespace prefix applied to every key in the remote store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Remote connection establishment timeout
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-command timeout for remote operations
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Minimum interval between physical reconnect attempts after a failure
    #[serde(default = "default_reconnect_throttle_ms")]
    pub reconnect_throttle_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            remote_url: default_remote_url(),
            default_ttl_seconds: default_ttl_seconds(),
            enable_l1: default_enable_l1(),
            l1_max_entries: default_l1_max_entries(),
            compression_threshold_bytes: default_compression_threshold(),
            compression_level: default_compression_level(),
            encryption_key: None,
            fail_on_connection_error: false,
            key_prefix: default_key_prefix(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            reconnect_throttle_ms: default_reconnect_throttle_ms(),
        }
    }
}

// Default value functions
fn default_remote_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_ttl_seconds() -> u64 {
    3600
}
fn default_enable_l1() -> bool {
    true
}
fn default_l1_max_entries() -> usize {
    10_000
}
fn default_compression_threshold() -> usize {
    1024
}
fn default_compression_level() -> u32 {
    6
}
fn default_key_prefix() -> String {
    "recall:".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_command_timeout_ms() -> u64 {
    2_000
}
fn default_reconnect_throttle_ms() -> u64 {
    10_000
}

impl CacheSettings {
    /// Load configuration from environment variables (`RECALL__` prefix).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("RECALL").separator("__"))
            .build()?;

        let settings: CacheSettings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("RECALL").separator("__"))
            .build()?;

        let settings: CacheSettings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every field, collecting all violations into one error.
    ///
    /// Misconfiguration is a deployment defect: it must be caught at startup,
    /// with every problem listed, not discovered one field at a time.
    pub fn validate(&self) -> Result<()> {
        let mut violations: Vec<String> = Vec::new();

        if self.remote_url.is_empty() {
            violations.push("remote_url must not be empty".to_string());
        } else if !self.remote_url.starts_with("redis://")
            && !self.remote_url.starts_with("rediss://")
            && !self.remote_url.starts_with("unix://")
        {
            violations.push(format!(
                "remote_url has unsupported scheme: {}",
                self.remote_url
            ));
        }

        if self.default_ttl_seconds == 0 {
            violations.push("default_ttl_seconds must be greater than zero".to_string());
        }

        if self.enable_l1 && self.l1_max_entries == 0 {
            violations.push("l1_max_entries must be greater than zero when enable_l1 is set".to_string());
        }

        if !(1..=9).contains(&self.compression_level) {
            violations.push(format!(
                "compression_level {} is out of range (expected 1-9)",
                self.compression_level
            ));
        }

        if let Some(ref key) = self.encryption_key {
            use base64::Engine as _;
            match base64::engine::general_purpose::STANDARD.decode(key) {
                Ok(bytes) if bytes.len() == 32 => {}
                Ok(bytes) => violations.push(format!(
                    "encryption_key decodes to {} bytes, expected 32 (generate one with: openssl rand -base64 32)",
                    bytes.len()
                )),
                Err(_) => violations.push(
                    "encryption_key is not valid base64 (generate one with: openssl rand -base64 32)"
                        .to_string(),
                ),
            }
        }

        if self.command_timeout_ms == 0 {
            violations.push("command_timeout_ms must be greater than zero".to_string());
        }
        if self.connect_timeout_ms == 0 {
            violations.push("connect_timeout_ms must be greater than zero".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(RecallError::configuration(format!(
                "Invalid cache settings: {}",
                violations.join("; ")
            ))
            .with_details(ErrorDetails::new().with_context("violations", &violations)))
        }
    }

    /// Default TTL as a [`Duration`].
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    /// Remote connection timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Remote command timeout as a [`Duration`].
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Reconnect throttle window as a [`Duration`].
    pub fn reconnect_throttle(&self) -> Duration {
        Duration::from_millis(self.reconnect_throttle_ms)
    }
}

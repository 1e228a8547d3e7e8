//! Production-grade error handling for Recall.
//!
//! This module provides:
//! - Comprehensive error types with context and chaining
//! - Error codes for machine-readable consumer handling
//! - User-friendly messages vs detailed internal messages
//! - Error logging with tracing integration
//! - Metrics integration for error tracking
//!
//! The propagation policy follows the "cache is an optimization, never a
//! dependency" rule: infrastructure failures (`is_infrastructure()`) are
//! caught at the [`crate::cache::TieredCache`] boundary and converted to a
//! miss or a no-op; only configuration and validation errors surface to
//! callers, and only outside the hot data path.
//!
//! # Usage
//!
//! ```rust,ignore
//! use recall_core::error::{RecallError, Result, ErrorContext};
//!
//! fn my_function() -> Result<()> {
//!     some_operation()
//!         .context("Failed to perform operation")?;
//!     Ok(())
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Recall operations.
pub type Result<T> = std::result::Result<T, RecallError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by consumers for programmatic error
/// handling (retry decisions, alerting, admin tooling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Serialization Errors (2200-2299)
    SerializationError,
    DeserializationError,
    DecompressionFailed,
    DecryptionFailed,

    // Infrastructure Errors (3000-3099)
    ConnectionFailed,
    CommandTimeout,
    RemoteStoreError,
    NetworkError,

    // Validation Errors (4100-4199)
    ValidationError,
    InvalidInput,
    CorruptArtifact,
    UnsupportedArtifactVersion,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,
    InvalidEncryptionKey,
    InvalidCompressionLevel,

    // Internal Errors (9000-9099)
    InternalError,
    Cancelled,
    UnknownError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            // Serialization Errors
            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,
            Self::DecompressionFailed => 2202,
            Self::DecryptionFailed => 2203,

            // Infrastructure Errors
            Self::ConnectionFailed => 3000,
            Self::CommandTimeout => 3001,
            Self::RemoteStoreError => 3002,
            Self::NetworkError => 3003,

            // Validation Errors
            Self::ValidationError => 4100,
            Self::InvalidInput => 4101,
            Self::CorruptArtifact => 4102,
            Self::UnsupportedArtifactVersion => 4103,

            // Configuration Errors
            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,
            Self::InvalidEncryptionKey => 5003,
            Self::InvalidCompressionLevel => 5004,

            // Internal Errors
            Self::InternalError => 9000,
            Self::Cancelled => 9001,
            Self::UnknownError => 9099,
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed
                | Self::CommandTimeout
                | Self::RemoteStoreError
                | Self::NetworkError
        )
    }

    /// Check if this error represents a remote-tier infrastructure failure.
    ///
    /// Infrastructure failures are never propagated past the cache boundary:
    /// the read path converts them to a miss, the write path to a no-op.
    pub const fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed
                | Self::CommandTimeout
                | Self::RemoteStoreError
                | Self::NetworkError
                | Self::DecompressionFailed
                | Self::DecryptionFailed
                | Self::DeserializationError
        )
    }

    /// Check if this error indicates a deployment defect caught at startup.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationError
                | Self::MissingConfiguration
                | Self::InvalidConfiguration
                | Self::InvalidEncryptionKey
                | Self::InvalidCompressionLevel
                | Self::SerializationError
        )
    }

    /// Check if this error indicates malformed administrative input.
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationError
                | Self::InvalidInput
                | Self::CorruptArtifact
                | Self::UnsupportedArtifactVersion
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            2200..=2299 => "serialization",
            3000..=3099 => "infrastructure",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging and alerting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected operational noise (corrupt entries, validation failures)
    Low,
    /// Operational issues (timeouts, transient store errors)
    Medium,
    /// System errors (serialization bugs, unexpected store failures)
    High,
    /// Critical errors requiring immediate attention
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            // Low severity - expected operational noise
            ErrorCode::ValidationError
            | ErrorCode::InvalidInput
            | ErrorCode::CorruptArtifact
            | ErrorCode::DecompressionFailed
            | ErrorCode::DecryptionFailed
            | ErrorCode::Cancelled => Self::Low,

            // Medium severity - operational
            ErrorCode::CommandTimeout
            | ErrorCode::RemoteStoreError
            | ErrorCode::NetworkError
            | ErrorCode::DeserializationError
            | ErrorCode::UnsupportedArtifactVersion => Self::Medium,

            // High severity - system errors
            ErrorCode::SerializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration
            | ErrorCode::InvalidEncryptionKey
            | ErrorCode::InvalidCompressionLevel => Self::High,

            // Critical severity
            ErrorCode::ConnectionFailed | ErrorCode::InternalError | ErrorCode::UnknownError => {
                Self::Critical
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (cache key, artifact path, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Suggested action for resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_action = Some(suggestion.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Recall.
///
/// This error type supports:
/// - Structured error codes for machine consumption
/// - Error chaining with context
/// - User-friendly vs internal messages
/// - Metrics integration
#[derive(Error, Debug)]
pub struct RecallError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for RecallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl RecallError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    /// Create a cancelled error for an administrative operation stopped
    /// mid-run at a chunk boundary.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        let op = operation.into();
        Self::new(ErrorCode::Cancelled, format!("{} was cancelled", op))
            .with_details(ErrorDetails::new().with_entity("operation", op))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Check if this error is a remote-tier infrastructure failure.
    pub fn is_infrastructure(&self) -> bool {
        self.code.is_infrastructure()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    /// Record error metrics.
    fn record_metrics(&self) {
        counter!(
            "recall_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
            "retryable" => self.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| RecallError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| RecallError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| RecallError::new(ErrorCode::InvalidInput, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| RecallError::new(code, "Value not present"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<redis::RedisError> for RecallError {
    fn from(error: redis::RedisError) -> Self {
        let (code, user_msg) = if error.is_connection_refusal() || error.is_connection_dropped() {
            (
                ErrorCode::ConnectionFailed,
                "Unable to connect to remote cache store",
            )
        } else if error.is_timeout() {
            (ErrorCode::CommandTimeout, "Remote cache operation timed out")
        } else {
            (ErrorCode::RemoteStoreError, "A remote cache error occurred")
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<serde_json::Error> for RecallError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string())
            .with_source(error)
    }
}

impl From<tokio::time::error::Elapsed> for RecallError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::with_internal(
            ErrorCode::CommandTimeout,
            "Operation timed out",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<std::io::Error> for RecallError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, user_msg) = match error.kind() {
            ErrorKind::NotFound => (ErrorCode::InvalidInput, "File or resource not found"),
            ErrorKind::TimedOut => (ErrorCode::CommandTimeout, "Operation timed out"),
            ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
                (ErrorCode::NetworkError, "Connection failed")
            }
            ErrorKind::InvalidData => (ErrorCode::CorruptArtifact, "Data is corrupt or malformed"),
            _ => (ErrorCode::InternalError, "An I/O error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<config::ConfigError> for RecallError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => (
                ErrorCode::MissingConfiguration,
                "Required configuration not found",
            ),
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (
                ErrorCode::ConfigurationError,
                "Configuration error occurred",
            ),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Convenience Constructors for Domain Errors
// ═══════════════════════════════════════════════════════════════════════════════

impl RecallError {
    /// Create a remote connection failure error.
    pub fn connection_failed(url: &str, reason: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ConnectionFailed,
            "Unable to connect to remote cache store",
            reason,
        )
        .with_context("remote_url", url)
    }

    /// Create a command timeout error.
    pub fn command_timeout(command: &str, timeout_ms: u64) -> Self {
        Self::new(
            ErrorCode::CommandTimeout,
            format!("Remote command {} exceeded {}ms", command, timeout_ms),
        )
        .with_context("timeout_ms", timeout_ms)
    }

    /// Create an invalid encryption key error with remediation guidance.
    pub fn invalid_encryption_key(reason: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InvalidEncryptionKey,
            "Encryption key is malformed: expected a base64-encoded 32-byte key",
            reason,
        )
        .with_details(
            ErrorDetails::new()
                .with_suggestion("Generate a valid key with: openssl rand -base64 32"),
        )
    }

    /// Create an invalid compression level error.
    pub fn invalid_compression_level(level: u32) -> Self {
        Self::new(
            ErrorCode::InvalidCompressionLevel,
            format!("Compression level {} is out of range (expected 1-9)", level),
        )
        .with_context("level", level)
    }

    /// Create a decompression failure error.
    pub fn decompression_failed(reason: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::DecompressionFailed,
            "Stored payload failed to decompress",
            reason,
        )
    }

    /// Create a decryption failure error.
    pub fn decryption_failed() -> Self {
        Self::new(
            ErrorCode::DecryptionFailed,
            "Stored payload failed authenticated decryption (wrong key or corrupt data)",
        )
    }

    /// Create a corrupt artifact error.
    pub fn corrupt_artifact(path: impl Into<String>, reason: impl Into<String>) -> Self {
        let path = path.into();
        Self::with_internal(
            ErrorCode::CorruptArtifact,
            format!("Backup artifact is corrupt: {}", path),
            reason,
        )
        .with_details(ErrorDetails::new().with_entity("artifact", path))
    }

    /// Create an unsupported artifact version error.
    pub fn unsupported_artifact_version(found: u32, supported: u32) -> Self {
        Self::new(
            ErrorCode::UnsupportedArtifactVersion,
            format!(
                "Backup artifact version {} is not supported (expected {})",
                found, supported
            ),
        )
        .with_context("found_version", found)
        .with_context("supported_version", supported)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

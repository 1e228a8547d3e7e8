//! Cache entry envelope.
//!
//! The remote tier stores a serialized [`CacheEntry`]: the (possibly
//! compressed, possibly encrypted) payload bytes plus the flags needed to
//! reverse those transforms on read. The L1 tier never sees this envelope;
//! it holds decoded values directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// A cached entry with storage metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Serialized payload (after compression/encryption as flagged)
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,

    /// Whether the payload was compressed before storage
    pub compressed: bool,

    /// Whether the payload was encrypted before storage
    pub encrypted: bool,

    /// Time-to-live
    #[serde(with = "duration_serde")]
    pub ttl: Option<Duration>,

    /// When this entry was created
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an envelope around already-transformed payload bytes.
    pub fn new(payload: Vec<u8>, compressed: bool, encrypted: bool, ttl: Option<Duration>) -> Self {
        Self {
            payload,
            compressed,
            encrypted,
            ttl,
            stored_at: Utc::now(),
        }
    }

    /// Check if the entry has expired.
    pub fn is_expired(&self) -> bool {
        if let Some(ttl) = self.ttl {
            let elapsed = Utc::now()
                .signed_duration_since(self.stored_at)
                .to_std()
                .unwrap_or(Duration::MAX);
            elapsed >= ttl
        } else {
            false
        }
    }

    /// Get the remaining TTL.
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.ttl.and_then(|ttl| {
            let elapsed = Utc::now()
                .signed_duration_since(self.stored_at)
                .to_std()
                .ok()?;
            ttl.checked_sub(elapsed)
        })
    }

    /// Serialize to the wire form stored in the remote tier.
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse from the wire form.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => d.as_secs().serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<u64> = Option::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

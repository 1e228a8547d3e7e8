//! Deterministic cache key generation.
//!
//! Keys fingerprint the triple (operation, input text, options). Identical
//! inputs always produce the identical key; any difference in operation,
//! text, or options produces a different key with overwhelming probability
//! (SHA-256, 256-bit fingerprints).
//!
//! The operation name is kept as a readable prefix so operators can reason
//! about keyspace composition (`summarize:ab12...`), while text and options
//! are hashed so arbitrarily large inputs never inflate key size.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// A derived cache key.
///
/// Opaque to consumers; the embedded operation is exposed for introspection
/// and selective administration (pattern-filtered backups).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    key: String,
    operation: String,
}

impl CacheKey {
    /// Get the full key string.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Get the operation this key was derived for.
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

/// Builder deriving stable, collision-resistant cache keys.
///
/// Pure and deterministic: no I/O, no randomness, no clock access.
#[derive(Debug, Clone, Default)]
pub struct KeyBuilder;

impl KeyBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Derive a cache key from (operation, text, options).
    ///
    /// The three inputs are fingerprinted in separate, delimited segments so
    /// differently-shaped but textually similar inputs cannot collide:
    /// `("summarize", "ab", ...)` and `("summarizea", "b", ...)` hash
    /// different segments. Option maps are canonicalized (sorted keys)
    /// before hashing so insertion order never changes the key.
    pub fn build(
        &self,
        operation: &str,
        text: &str,
        options: &BTreeMap<String, serde_json::Value>,
    ) -> CacheKey {
        let text_fingerprint = hex_sha256(text.as_bytes());
        let options_fingerprint = hex_sha256(canonical_options(options).as_bytes());

        let mut hasher = Sha256::new();
        hasher.update(b"op=");
        hasher.update(operation.as_bytes());
        hasher.update(b"\x1ftext=");
        hasher.update(text_fingerprint.as_bytes());
        hasher.update(b"\x1fopts=");
        hasher.update(options_fingerprint.as_bytes());
        let fingerprint = hex::encode(hasher.finalize());

        CacheKey {
            key: format!("{}:{}", operation, fingerprint),
            operation: operation.to_string(),
        }
    }

    /// Derive a key from a loosely-typed options value.
    ///
    /// Non-object values are treated as an empty options map; this is the
    /// entry point for callers holding raw request JSON.
    pub fn build_from_value(
        &self,
        operation: &str,
        text: &str,
        options: &serde_json::Value,
    ) -> CacheKey {
        let map: BTreeMap<String, serde_json::Value> = options
            .as_object()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        self.build(operation, text, &map)
    }
}

fn canonical_options(options: &BTreeMap<String, serde_json::Value>) -> String {
    // BTreeMap iterates in sorted key order, so serialization is canonical.
    serde_json::to_string(options).unwrap_or_default()
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts(pairs: &[(&str, serde_json::Value)]) -> BTreeMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_key_is_deterministic() {
        let builder = KeyBuilder::new();
        let options = opts(&[("max_length", json!(50))]);

        let a = builder.build("summarize", "hello", &options);
        let b = builder.build("summarize", "hello", &options);
        assert_eq!(a, b);
    }

    #[test]
    fn test_operation_changes_key() {
        let builder = KeyBuilder::new();
        let options = opts(&[("max_length", json!(50))]);

        let a = builder.build("summarize", "hello", &options);
        let b = builder.build("sentiment", "hello", &options);
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_text_changes_key() {
        let builder = KeyBuilder::new();
        let options = BTreeMap::new();

        let a = builder.build("summarize", "hello", &options);
        let b = builder.build("summarize", "hello!", &options);
        assert_ne!(a, b);
    }

    #[test]
    fn test_options_change_key() {
        let builder = KeyBuilder::new();

        let a = builder.build("summarize", "hello", &opts(&[("max_length", json!(50))]));
        let b = builder.build("summarize", "hello", &opts(&[("max_length", json!(51))]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_option_order_does_not_change_key() {
        let builder = KeyBuilder::new();

        let a = builder.build(
            "summarize",
            "hello",
            &opts(&[("a", json!(1)), ("b", json!(2))]),
        );
        let b = builder.build(
            "summarize",
            "hello",
            &opts(&[("b", json!(2)), ("a", json!(1))]),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_inputs_hash_deterministically() {
        let builder = KeyBuilder::new();
        let empty = BTreeMap::new();

        let a = builder.build("summarize", "", &empty);
        let b = builder.build("summarize", "", &empty);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("summarize:"));
    }

    #[test]
    fn test_shape_shifting_does_not_collide() {
        // Moving a character between operation and text must change the key:
        // each segment is fingerprinted independently.
        let builder = KeyBuilder::new();
        let empty = BTreeMap::new();

        let a = builder.build("summarize", "xhello", &empty);
        let b = builder.build("summarizex", "hello", &empty);
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_large_text_bounds_key_size() {
        let builder = KeyBuilder::new();
        let huge = "lorem ipsum ".repeat(100_000);

        let key = builder.build("summarize", &huge, &BTreeMap::new());
        assert!(key.as_str().len() < 128);
    }

    #[test]
    fn test_build_from_value_matches_map_build() {
        let builder = KeyBuilder::new();
        let from_value =
            builder.build_from_value("classify", "text", &json!({"labels": ["a", "b"]}));
        let from_map = builder.build(
            "classify",
            "text",
            &opts(&[("labels", json!(["a", "b"]))]),
        );
        assert_eq!(from_value, from_map);

        let non_object = builder.build_from_value("classify", "text", &json!(null));
        let empty = builder.build("classify", "text", &BTreeMap::new());
        assert_eq!(non_object, empty);
    }
}

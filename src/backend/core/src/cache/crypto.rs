//! At-rest encryption for cached payloads.
//!
//! AES-256-GCM authenticated encryption via `ring`. Each sealing uses a
//! fresh random 96-bit nonce, prepended to the ciphertext, so the stored
//! form is `nonce || ciphertext || tag`. Data sealed under one key fails
//! authentication under any other key.
//!
//! Construction with no key degrades to pass-through and logs a prominent
//! warning once: acceptable only for local and test deployments.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{debug, warn};

use crate::error::{RecallError, Result};

/// Symmetric encryption layer for cache payloads.
pub struct EncryptionLayer {
    key: Option<LessSafeKey>,
    rng: SystemRandom,
}

impl std::fmt::Debug for EncryptionLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionLayer")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl EncryptionLayer {
    /// Create an encryption layer from an optional base64-encoded 32-byte key.
    ///
    /// - `None` disables encryption (pass-through) with a logged warning.
    /// - A malformed key fails construction with remediation guidance, so
    ///   misconfiguration is caught at startup rather than at first write.
    /// - A valid key is verified with one self-test round trip before the
    ///   layer declares itself ready.
    pub fn new(encoded_key: Option<&str>) -> Result<Self> {
        let Some(encoded) = encoded_key else {
            warn!(
                "cache encryption is DISABLED: no encryption_key configured; \
                 cached values will be stored in plaintext (local/testing use only)"
            );
            return Ok(Self {
                key: None,
                rng: SystemRandom::new(),
            });
        };

        let key_bytes = BASE64
            .decode(encoded)
            .map_err(|e| RecallError::invalid_encryption_key(format!("base64 decode: {}", e)))?;

        if key_bytes.len() != 32 {
            return Err(RecallError::invalid_encryption_key(format!(
                "decoded to {} bytes, expected 32",
                key_bytes.len()
            )));
        }

        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| RecallError::invalid_encryption_key("key rejected by AEAD backend"))?;

        let layer = Self {
            key: Some(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        };
        layer.self_test()?;
        debug!("cache encryption enabled (AES-256-GCM)");
        Ok(layer)
    }

    /// Whether payloads will actually be encrypted.
    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Encrypt payload bytes. Pass-through when encryption is disabled.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let Some(ref key) = self.key else {
            return Ok(plaintext.to_vec());
        };

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| RecallError::internal("system RNG failed to produce a nonce"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| RecallError::internal("AEAD seal failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    /// Decrypt payload bytes. Pass-through when encryption is disabled.
    ///
    /// Fails with a typed error when the data was sealed under a different
    /// key or has been tampered with; the orchestrator treats that as a
    /// cache miss.
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        let Some(ref key) = self.key else {
            return Ok(sealed.to_vec());
        };

        if sealed.len() < NONCE_LEN {
            return Err(RecallError::decryption_failed());
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| RecallError::decryption_failed())?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| RecallError::decryption_failed())?;
        Ok(plaintext.to_vec())
    }

    /// One encrypt/decrypt round trip executed at construction.
    fn self_test(&self) -> Result<()> {
        let probe = b"recall-encryption-self-test";
        let sealed = self.encrypt(probe)?;
        let opened = self.decrypt(&sealed)?;
        if opened != probe {
            return Err(RecallError::internal(
                "encryption self-test round trip produced different bytes",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn key_b64(byte: u8) -> String {
        BASE64.encode([byte; 32])
    }

    #[test]
    fn test_disabled_layer_passes_through() {
        let layer = EncryptionLayer::new(None).unwrap();
        assert!(!layer.is_enabled());

        let sealed = layer.encrypt(b"plaintext").unwrap();
        assert_eq!(sealed, b"plaintext");
        assert_eq!(layer.decrypt(&sealed).unwrap(), b"plaintext");
    }

    #[test]
    fn test_round_trip_with_key() {
        let key = key_b64(42);
        let layer = EncryptionLayer::new(Some(&key)).unwrap();
        assert!(layer.is_enabled());

        let sealed = layer.encrypt(b"secret inference result").unwrap();
        assert_ne!(sealed, b"secret inference result");
        assert_eq!(layer.decrypt(&sealed).unwrap(), b"secret inference result");
    }

    #[test]
    fn test_cross_key_decryption_fails() {
        let layer_a = EncryptionLayer::new(Some(&key_b64(1))).unwrap();
        let layer_b = EncryptionLayer::new(Some(&key_b64(2))).unwrap();

        let sealed = layer_a.encrypt(b"only for key A").unwrap();
        let err = layer_b.decrypt(&sealed).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DecryptionFailed);
    }

    #[test]
    fn test_nonces_are_unique_per_sealing() {
        let layer = EncryptionLayer::new(Some(&key_b64(9))).unwrap();

        let a = layer.encrypt(b"same plaintext").unwrap();
        let b = layer.encrypt(b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_key_fails_construction() {
        let err = EncryptionLayer::new(Some("not-base64!!!")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidEncryptionKey);

        let short = BASE64.encode([0u8; 16]);
        let err = EncryptionLayer::new(Some(&short)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidEncryptionKey);
        assert!(err
            .details()
            .suggested_action
            .as_deref()
            .unwrap()
            .contains("openssl rand -base64 32"));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let layer = EncryptionLayer::new(Some(&key_b64(5))).unwrap();

        let mut sealed = layer.encrypt(b"integrity matters").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(layer.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let layer = EncryptionLayer::new(Some(&key_b64(5))).unwrap();
        assert!(layer.decrypt(b"short").is_err());
    }
}

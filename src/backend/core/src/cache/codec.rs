//! Transparent payload compression.
//!
//! Gzip via flate2, applied only to payloads at or above a configured
//! threshold: compression overhead on tiny payloads is a net loss, so small
//! values pass through unmodified and are flagged `compressed = false`.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tracing::trace;

use crate::error::{RecallError, Result};

/// Compresses and decompresses cache payloads.
#[derive(Debug, Clone)]
pub struct CompressionCodec {
    threshold_bytes: usize,
    level: Compression,
}

impl CompressionCodec {
    /// Create a codec.
    ///
    /// `level` must be in 1..=9; out-of-range levels are a configuration
    /// defect and are rejected at construction.
    pub fn new(threshold_bytes: usize, level: u32) -> Result<Self> {
        if !(1..=9).contains(&level) {
            return Err(RecallError::invalid_compression_level(level));
        }
        Ok(Self {
            threshold_bytes,
            level: Compression::new(level),
        })
    }

    /// The size threshold at which payloads are compressed.
    pub fn threshold_bytes(&self) -> usize {
        self.threshold_bytes
    }

    /// Compress `data` if it meets the threshold.
    ///
    /// Returns the stored bytes and whether compression was applied.
    pub fn maybe_compress(&self, data: &[u8]) -> Result<(Vec<u8>, bool)> {
        if data.len() < self.threshold_bytes {
            return Ok((data.to_vec(), false));
        }

        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;
        trace!(
            original = data.len(),
            compressed = compressed.len(),
            "compressed cache payload"
        );
        Ok((compressed, true))
    }

    /// Decompress previously-compressed bytes.
    ///
    /// Corrupt input produces a typed error, never a panic; the orchestrator
    /// treats it as a cache miss.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| RecallError::decompression_failed(e.to_string()))?;
        Ok(decompressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range_level() {
        assert!(CompressionCodec::new(1024, 0).is_err());
        assert!(CompressionCodec::new(1024, 10).is_err());
        assert!(CompressionCodec::new(1024, 1).is_ok());
        assert!(CompressionCodec::new(1024, 9).is_ok());
    }

    #[test]
    fn test_below_threshold_passes_through() {
        let codec = CompressionCodec::new(1024, 6).unwrap();
        let data = b"small payload";

        let (stored, compressed) = codec.maybe_compress(data).unwrap();
        assert!(!compressed);
        assert_eq!(stored, data);
    }

    #[test]
    fn test_round_trip_above_threshold() {
        let codec = CompressionCodec::new(64, 6).unwrap();
        let data = "the quick brown fox jumps over the lazy dog ".repeat(100);

        let (stored, compressed) = codec.maybe_compress(data.as_bytes()).unwrap();
        assert!(compressed);
        assert!(stored.len() < data.len());

        let restored = codec.decompress(&stored).unwrap();
        assert_eq!(restored, data.as_bytes());
    }

    #[test]
    fn test_decompress_rejects_corrupt_data() {
        let codec = CompressionCodec::new(64, 6).unwrap();

        let err = codec.decompress(b"definitely not gzip").unwrap_err();
        assert_eq!(
            err.code(),
            crate::error::ErrorCode::DecompressionFailed
        );
    }

    #[test]
    fn test_decompress_rejects_truncated_data() {
        let codec = CompressionCodec::new(16, 6).unwrap();
        let data = "compressible compressible compressible".repeat(10);
        let (stored, _) = codec.maybe_compress(data.as_bytes()).unwrap();

        let truncated = &stored[..stored.len() / 2];
        assert!(codec.decompress(truncated).is_err());
    }
}

//! Compression seam. The payload codec is supplied by the embedding engine;
//! `Stored` keeps payloads uncompressed and `Deflate` wraps raw DEFLATE
//! streams.

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::util::AssetError;

/// Reverses a bank payload into raw PCM bytes. Called once per sound on first access.
pub trait Decompressor: Send + Sync {
    /// Implementations must fail with `ResourceLimit` rather than produce more
    /// than `max_output` bytes.
    fn decompress(&self, compressed: &[u8], max_output: usize) -> Result<Vec<u8>, AssetError>;
}

/// Used when writing banks.
pub trait Compressor {
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, AssetError>;
}

/// Identity codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stored;

impl Decompressor for Stored {
    fn decompress(&self, compressed: &[u8], max_output: usize) -> Result<Vec<u8>, AssetError> {
        if compressed.len() > max_output {
            return Err(AssetError::ResourceLimit(format!(
                "payload of {} bytes exceeds limit of {}",
                compressed.len(),
                max_output
            )));
        }
        Ok(compressed.to_vec())
    }
}

impl Compressor for Stored {
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, AssetError> {
        Ok(raw.to_vec())
    }
}

/// Raw DEFLATE (no zlib or gzip framing).
#[derive(Debug, Clone, Copy)]
pub struct Deflate {
    level: u32,
}

impl Deflate {
    /// `level` runs from 0 (store) to 9 (smallest).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for Deflate {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl Decompressor for Deflate {
    fn decompress(&self, compressed: &[u8], max_output: usize) -> Result<Vec<u8>, AssetError> {
        // one byte past the limit tells an oversized stream from an exact fit
        let limit = (max_output as u64).saturating_add(1);
        let mut out = Vec::new();
        DeflateDecoder::new(compressed)
            .take(limit)
            .read_to_end(&mut out)
            .map_err(|e| AssetError::Decode(format!("deflate: {}", e)))?;
        if out.len() > max_output {
            return Err(AssetError::ResourceLimit(format!(
                "inflated payload exceeds limit of {} bytes",
                max_output
            )));
        }
        Ok(out)
    }
}

impl Compressor for Deflate {
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, AssetError> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(raw)?;
        Ok(encoder.finish()?)
    }
}

//! Payload codecs used when a container is written to its backend

use crate::error::{NixError, Result};
use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression as FlateCompression;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Compression applied to DataArray payloads on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionMethod {
    /// Payload bytes stored verbatim
    #[default]
    None = 0,
    /// Deflate/ZIP compression
    Deflate = 1,
    /// Zstandard compression
    Zstd = 3,
}

impl CompressionMethod {
    /// Encode `data` with this method
    pub fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
        match self {
            CompressionMethod::None => Ok(data.to_vec()),
            CompressionMethod::Deflate => {
                let mut encoder =
                    DeflateEncoder::new(data, FlateCompression::new(level.value() as u32));
                let mut compressed = Vec::new();
                encoder
                    .read_to_end(&mut compressed)
                    .map_err(|e| NixError::Compression(e.to_string()))?;
                Ok(compressed)
            }
            CompressionMethod::Zstd => zstd::encode_all(data, level.value() as i32)
                .map_err(|e| NixError::Compression(e.to_string())),
        }
    }

    /// Decode `data` produced by [`CompressionMethod::compress`]
    pub fn decompress(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
        let decoded = match self {
            CompressionMethod::None => data.to_vec(),
            CompressionMethod::Deflate => {
                let mut decoder = DeflateDecoder::new(data);
                let mut decompressed = Vec::with_capacity(expected_size);
                decoder
                    .read_to_end(&mut decompressed)
                    .map_err(|e| NixError::Decompression(e.to_string()))?;
                decompressed
            }
            CompressionMethod::Zstd => {
                zstd::decode_all(data).map_err(|e| NixError::Decompression(e.to_string()))?
            }
        };

        if decoded.len() != expected_size {
            return Err(NixError::Decompression(format!(
                "expected {} bytes, got {}",
                expected_size,
                decoded.len()
            )));
        }
        Ok(decoded)
    }
}

/// Compression level (0-9, where 0 is no compression and 9 is maximum)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    pub fn fast() -> Self {
        Self(1)
    }

    pub fn best() -> Self {
        Self(9)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl From<u8> for CompressionLevel {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}

impl From<CompressionLevel> for u8 {
    fn from(level: CompressionLevel) -> Self {
        level.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(6)
    }
}

//! Container configuration

use crate::compression::{CompressionLevel, CompressionMethod};
use crate::error::{NixError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options applied when a container is opened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOptions {
    /// Codec for payloads of newly created DataArrays
    pub compression: CompressionMethod,

    /// Level passed to the codec
    pub compression_level: CompressionLevel,

    /// Persist after every successful mutation instead of on flush/close
    pub auto_flush: bool,

    /// Check the body checksum when reading a container
    pub verify_checksums: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::None,
            compression_level: CompressionLevel::default(),
            auto_flush: false,
            verify_checksums: true,
        }
    }
}

impl FileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set compression method
    pub fn with_compression(mut self, method: CompressionMethod) -> Self {
        self.compression = method;
        self
    }

    /// Set compression level
    pub fn with_compression_level(mut self, level: CompressionLevel) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_auto_flush(mut self, auto_flush: bool) -> Self {
        self.auto_flush = auto_flush;
        self
    }

    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Parse options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| NixError::Configuration(e.to_string()))
    }

    /// Load options from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

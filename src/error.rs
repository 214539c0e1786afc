//! Error types for nixio operations

use thiserror::Error;

/// Main error type for container operations
#[derive(Error, Debug)]
pub enum NixError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid container format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u16),

    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    Shape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Type error: {0}")]
    Type(String),

    #[error("Index {index} out of bounds for collection of length {len}")]
    OutOfBounds { index: i64, len: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation on a closed container")]
    ClosedHandle,

    #[error("Container is opened read-only")]
    ReadOnly,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Coarse classification of [`NixError`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty or duplicate names, type mismatches between values, shape mismatches
    Validation,
    /// Wrong entity kind or key kind passed to a collection operation
    Type,
    /// Index outside an ordered collection
    Bounds,
    /// Lookup by id or name that does not resolve
    Key,
    /// File system failure
    Io,
    /// Malformed, corrupted or incompatible container bytes
    Format,
    /// Operation after the container was closed
    ClosedHandle,
    /// Mutation on a read-only container
    ReadOnly,
}

impl NixError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            NixError::Io(_) => ErrorKind::Io,
            NixError::InvalidFormat(_)
            | NixError::UnsupportedVersion(_)
            | NixError::ChecksumMismatch { .. }
            | NixError::Compression(_)
            | NixError::Decompression(_)
            | NixError::Serialization(_) => ErrorKind::Format,
            NixError::Validation(_) | NixError::Shape { .. } | NixError::Configuration(_) => {
                ErrorKind::Validation
            }
            NixError::Type(_) => ErrorKind::Type,
            NixError::OutOfBounds { .. } => ErrorKind::Bounds,
            NixError::NotFound(_) => ErrorKind::Key,
            NixError::ClosedHandle => ErrorKind::ClosedHandle,
            NixError::ReadOnly => ErrorKind::ReadOnly,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        NixError::Validation(msg.into())
    }

    pub(crate) fn not_found(what: &str, key: impl std::fmt::Display) -> Self {
        NixError::NotFound(format!("{} '{}'", what, key))
    }
}

/// Specialized Result type for container operations
pub type Result<T> = std::result::Result<T, NixError>;

impl From<bincode::Error> for NixError {
    fn from(err: bincode::Error) -> Self {
        NixError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for NixError {
    fn from(err: serde_json::Error) -> Self {
        NixError::Serialization(err.to_string())
    }
}

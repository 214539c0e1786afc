//! Storage backends holding the bytes of one container

use crate::error::{NixError, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Local file system
    FileSystem,
    /// Process memory, gone when the container is dropped
    Memory,
}

/// Trait for reading and replacing the bytes of a single container
pub trait StorageBackend: Send + Sync {
    /// Read the full container
    fn read(&self) -> Result<Bytes>;

    /// Replace the full container. Implementations must not leave a
    /// half-written container behind on failure.
    fn write(&self, data: &[u8]) -> Result<()>;

    /// Check if the container exists
    fn exists(&self) -> Result<bool>;

    /// Get the size of the stored container
    fn size(&self) -> Result<u64>;

    /// Human readable location
    fn describe(&self) -> String;

    /// Get the backend type
    fn kind(&self) -> BackendKind;
}

/// File system backend
#[derive(Debug)]
pub struct FileSystemBackend {
    path: PathBuf,
}

impl FileSystemBackend {
    /// Create a new file system backend
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StorageBackend for FileSystemBackend {
    fn read(&self) -> Result<Bytes> {
        let data = fs::read(&self.path).map_err(NixError::Io)?;
        Ok(Bytes::from(data))
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        // Write next to the target, then rename over it
        let temp = self.temp_path();
        {
            let mut file = fs::File::create(&temp).map_err(NixError::Io)?;
            file.write_all(data).map_err(NixError::Io)?;
            file.sync_all().map_err(NixError::Io)?;
        }
        fs::rename(&temp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            NixError::Io(e)
        })
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.path.exists())
    }

    fn size(&self) -> Result<u64> {
        let metadata = fs::metadata(&self.path).map_err(NixError::Io)?;
        Ok(metadata.len())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::FileSystem
    }
}

/// In-memory backend, mostly for tests and scratch containers
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: Mutex<Option<Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing container bytes
    pub fn with_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: Mutex::new(Some(data.into())),
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self) -> Result<Bytes> {
        self.data.lock().clone().ok_or_else(|| {
            NixError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "memory container is empty",
            ))
        })
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        *self.data.lock() = Some(Bytes::copy_from_slice(data));
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.data.lock().is_some())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.data.lock().as_ref().map(|d| d.len() as u64).unwrap_or(0))
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_system_backend() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileSystemBackend::new(temp_dir.path().join("test.nix"));

        assert!(!backend.exists().unwrap());
        assert!(matches!(backend.read(), Err(NixError::Io(_))));

        let data = b"Hello, nixio!";
        backend.write(data).unwrap();
        assert_eq!(&backend.read().unwrap()[..], data);
        assert!(backend.exists().unwrap());
        assert_eq!(backend.size().unwrap(), data.len() as u64);

        // Overwrite replaces and leaves no temp file behind
        backend.write(b"v2").unwrap();
        assert_eq!(&backend.read().unwrap()[..], b"v2");
        assert!(!backend.temp_path().exists());
    }

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::new();
        assert!(!backend.exists().unwrap());
        backend.write(b"abc").unwrap();
        assert_eq!(&backend.read().unwrap()[..], b"abc");
        assert_eq!(backend.size().unwrap(), 3);
        assert_eq!(backend.kind(), BackendKind::Memory);
    }
}

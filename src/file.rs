//! The container: entry point for opening, creating and closing files.

use crate::block::Block;
use crate::entity::EntityRecord;
use crate::error::{NixError, Result};
use crate::format::{self, FormatVersion, Header};
use crate::handle::{EntityHandle, FileCore, Located};
use crate::io::{FileSystemBackend, MemoryBackend, StorageBackend};
use crate::options::FileOptions;
use crate::registry::exists;
use crate::section::{self, Section};
use crate::store::{BlockRecord, Location, Store};
use crate::types::{EntityId, Key};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a container is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Read an existing container; every mutation fails
    ReadOnly,
    /// Open an existing container, or create it if missing
    ReadWrite,
    /// Start from an empty container, discarding existing content
    Overwrite,
}

/// An open container.
///
/// Handles derived from a `File` share its state. Dropping the `File`
/// closes it, after which those handles fail with
/// [`NixError::ClosedHandle`].
#[derive(Debug)]
pub struct File {
    core: Arc<FileCore>,
    version: FormatVersion,
}

impl File {
    /// Open a container on the local file system with default options
    pub fn open(path: impl AsRef<Path>, mode: FileMode) -> Result<Self> {
        Self::open_with_options(path, mode, FileOptions::default())
    }

    pub fn open_with_options(
        path: impl AsRef<Path>,
        mode: FileMode,
        options: FileOptions,
    ) -> Result<Self> {
        Self::open_with_backend(Box::new(FileSystemBackend::new(path)), mode, options)
    }

    /// Scratch container that lives in memory only
    pub fn in_memory() -> Result<Self> {
        Self::open_with_backend(
            Box::new(MemoryBackend::new()),
            FileMode::Overwrite,
            FileOptions::default(),
        )
    }

    /// Open a container on any storage backend
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        mode: FileMode,
        options: FileOptions,
    ) -> Result<Self> {
        let existing = match mode {
            FileMode::Overwrite => None,
            FileMode::ReadWrite if !backend.exists()? => None,
            FileMode::ReadOnly | FileMode::ReadWrite => Some(backend.read()?),
        };

        let (store, version, fresh) = match existing {
            Some(bytes) => {
                let header = Header::parse(&bytes)?;
                let store = format::decode(&bytes, options.verify_checksums)?;
                (store, header.version, false)
            }
            None => (Store::default(), FormatVersion::CURRENT, true),
        };

        let location = backend.describe();
        let core = Arc::new(FileCore::new(backend, mode, options, store));
        if fresh {
            core.read(|store| core.persist_store(store))?;
        }
        info!(location = %location, ?mode, %version, "opened container");
        Ok(Self { core, version })
    }

    /// Persist pending changes. A no-op for read-only containers.
    pub fn flush(&self) -> Result<()> {
        self.core.flush()?;
        info!(location = %self.core.describe(), "flushed container");
        Ok(())
    }

    /// Persist pending changes and release the model. Closing twice is
    /// fine; if persisting fails the container stays open.
    pub fn close(&self) -> Result<()> {
        self.core.close()
    }

    pub fn is_open(&self) -> bool {
        self.core.is_open()
    }

    pub fn mode(&self) -> FileMode {
        self.core.mode()
    }

    pub fn options(&self) -> &FileOptions {
        self.core.options()
    }

    /// Format version the container was read with, or written in if new
    pub fn format_version(&self) -> FormatVersion {
        self.version
    }

    /// Where the container is stored
    pub fn location(&self) -> String {
        self.core.describe()
    }

    /// Size of the persisted container in bytes
    pub fn size_on_disk(&self) -> Result<u64> {
        self.core.backend().size()
    }

    pub fn created_at(&self) -> Result<i64> {
        self.core.read(|store| Ok(store.created_at))
    }

    pub fn updated_at(&self) -> Result<i64> {
        self.core.read(|store| Ok(store.updated_at))
    }

    pub fn force_created_at(&self, timestamp: i64) -> Result<()> {
        self.core.write(|store| {
            store.created_at = timestamp;
            Ok(())
        })
    }

    // Blocks

    fn block_handle(&self, id: EntityId) -> Block {
        Block::from_parts(Arc::clone(&self.core), Location::Block(id))
    }

    pub fn create_block(&self, name: &str, type_name: &str) -> Result<Block> {
        let record = BlockRecord::new(EntityRecord::new(name, type_name)?);
        let id = self.core.write(|store| store.blocks.insert(record))?;
        debug!(block = %id, name, "created block");
        Ok(self.block_handle(id))
    }

    pub fn blocks(&self) -> Result<Vec<Block>> {
        let ids = self.core.read(|store| Ok(store.blocks.ids().to_vec()))?;
        Ok(ids.into_iter().map(|id| self.block_handle(id)).collect())
    }

    pub fn block_count(&self) -> Result<usize> {
        self.core.read(|store| Ok(store.blocks.len()))
    }

    /// Block by position, id or name
    pub fn get_block(&self, key: impl Into<Key>) -> Result<Block> {
        let key = key.into();
        let id = self
            .core
            .read(|store| Ok(store.blocks.resolve(&key)?.entity.id))?;
        Ok(self.block_handle(id))
    }

    pub fn has_block(&self, key: impl Into<Key>) -> Result<bool> {
        exists(self.get_block(key))
    }

    /// Delete a block with everything it owns
    pub fn delete_block(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let id = self.core.write(|store| {
            let id = store.blocks.resolve(&key)?.entity.id;
            store.blocks.remove(&id);
            Ok(id)
        })?;
        debug!(block = %id, "deleted block");
        Ok(())
    }

    // Sections

    pub fn create_section(&self, name: &str, type_name: &str) -> Result<Section> {
        section::create_section(&self.core, None, name, type_name)
    }

    /// Top-level sections
    pub fn sections(&self) -> Result<Vec<Section>> {
        section::child_sections(&self.core, None)
    }

    pub fn section_count(&self) -> Result<usize> {
        self.core
            .read(|store| Ok(store.sections.children(None)?.len()))
    }

    pub fn get_section(&self, key: impl Into<Key>) -> Result<Section> {
        section::get_section(&self.core, None, &key.into())
    }

    pub fn has_section(&self, key: impl Into<Key>) -> Result<bool> {
        exists(self.get_section(key))
    }

    /// Delete a top-level section with its subtree; links to any deleted
    /// section are cleared
    pub fn delete_section(&self, key: impl Into<Key>) -> Result<()> {
        section::delete_section(&self.core, None, &key.into())
    }

    /// Sections down to `max_depth` levels below the top level
    pub fn find_sections(&self, max_depth: usize) -> Result<Vec<Section>> {
        section::find_sections(&self.core, None, max_depth)
    }

    /// Does `entity` belong to this container?
    pub fn owns(&self, entity: &dyn EntityHandle) -> bool {
        Arc::ptr_eq(entity.core(), &self.core)
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if let Err(e) = self.core.close() {
            warn!(location = %self.core.describe(), error = %e, "failed to close container");
        }
    }
}

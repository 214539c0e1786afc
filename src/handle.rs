//! Shared state behind every handle of one open container, and the traits
//! all entity handles implement.
//!
//! A [`File`](crate::File) and every handle derived from it hold the same
//! `Arc<FileCore>`. The model lives behind a single `RwLock`; closing the
//! file empties the slot, after which every handle operation fails with
//! [`NixError::ClosedHandle`].

use crate::entity::check_non_empty;
use crate::error::{NixError, Result};
use crate::file::FileMode;
use crate::format;
use crate::io::StorageBackend;
use crate::options::FileOptions;
use crate::section::Section;
use crate::store::{Location, Store};
use crate::types::{DataType, EntityId, EntityKind};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub struct OpenState {
    store: Store,
    dirty: bool,
}

pub struct FileCore {
    backend: Box<dyn StorageBackend>,
    mode: FileMode,
    options: FileOptions,
    state: RwLock<Option<OpenState>>,
}

impl fmt::Debug for FileCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCore")
            .field("backend", &self.backend.describe())
            .field("mode", &self.mode)
            .field("open", &self.is_open())
            .finish()
    }
}

impl FileCore {
    pub(crate) fn new(
        backend: Box<dyn StorageBackend>,
        mode: FileMode,
        options: FileOptions,
        store: Store,
    ) -> Self {
        Self {
            backend,
            mode,
            options,
            state: RwLock::new(Some(OpenState {
                store,
                dirty: false,
            })),
        }
    }

    pub(crate) fn mode(&self) -> FileMode {
        self.mode
    }

    pub(crate) fn options(&self) -> &FileOptions {
        &self.options
    }

    pub(crate) fn describe(&self) -> String {
        self.backend.describe()
    }

    pub(crate) fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state.read().is_some()
    }

    /// Run `f` against the model under the shared lock
    pub(crate) fn read<R>(&self, f: impl FnOnce(&Store) -> Result<R>) -> Result<R> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(NixError::ClosedHandle)?;
        f(&state.store)
    }

    /// Run a mutation under the exclusive lock.
    ///
    /// `f` must validate before it changes anything: an `Err` leaves the
    /// model untouched. On success the container is marked dirty. With
    /// `auto_flush` the mutation runs on a staged copy that replaces the
    /// model only once it has been persisted, so a failed write leaves the
    /// model as it was.
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Store) -> Result<R>) -> Result<R> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(NixError::ClosedHandle)?;
        if self.mode == FileMode::ReadOnly {
            return Err(NixError::ReadOnly);
        }

        if self.options.auto_flush {
            let mut staged = state.store.clone();
            let out = f(&mut staged)?;
            staged.touch();
            self.persist_store(&staged)?;
            state.store = staged;
            state.dirty = false;
            return Ok(out);
        }

        let out = f(&mut state.store)?;
        state.store.touch();
        state.dirty = true;
        Ok(out)
    }

    /// Write the whole model to the backend
    pub(crate) fn persist_store(&self, store: &Store) -> Result<()> {
        let bytes = format::encode(store)?;
        self.backend.write(&bytes)?;
        debug!(
            location = %self.backend.describe(),
            bytes = bytes.len(),
            "persisted container"
        );
        Ok(())
    }

    fn persist(&self, state: &mut OpenState) -> Result<()> {
        self.persist_store(&state.store)?;
        state.dirty = false;
        Ok(())
    }

    pub(crate) fn flush(&self) -> Result<()> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(NixError::ClosedHandle)?;
        if self.mode == FileMode::ReadOnly || !state.dirty {
            return Ok(());
        }
        self.persist(state)
    }

    /// Persist pending changes and drop the model. A failed persist keeps
    /// the container open so the caller can retry.
    pub(crate) fn close(&self) -> Result<()> {
        let mut guard = self.state.write();
        let Some(state) = guard.as_mut() else {
            return Ok(());
        };
        if self.mode != FileMode::ReadOnly && state.dirty {
            self.persist(state)?;
        }
        *guard = None;
        info!(location = %self.backend.describe(), "closed container");
        Ok(())
    }
}

/// Internal access to the container and the model location of a handle.
///
/// This trait lives in a private module, so it cannot be implemented
/// outside the crate.
pub trait Located {
    #[doc(hidden)]
    fn core(&self) -> &Arc<FileCore>;
    #[doc(hidden)]
    fn location(&self) -> Location;
}

/// Anything stored in a container that has an identity
pub trait EntityHandle: Located {
    fn id(&self) -> EntityId {
        self.location().id()
    }

    fn kind(&self) -> EntityKind {
        self.location().kind()
    }

    /// Typed payload capability; only DataArrays provide it
    fn as_typed_payload(&self) -> Option<&dyn HasTypedPayload> {
        None
    }
}

/// Capability of carrying a typed, shaped payload
pub trait HasTypedPayload: EntityHandle {
    fn data_type(&self) -> Result<Option<DataType>>;
    fn data_extent(&self) -> Result<Option<Vec<usize>>>;
}

/// Common naming and timestamp contract of entities
pub trait NamedEntity: EntityHandle {
    fn name(&self) -> Result<String> {
        let loc = self.location();
        self.core().read(|store| Ok(store.entity(&loc)?.name.clone()))
    }

    /// Rename; empty names and names taken by a sibling are rejected
    fn set_name(&self, name: &str) -> Result<()> {
        check_non_empty("name", name)?;
        let loc = self.location();
        self.core().write(|store| {
            store.check_rename(&loc, name)?;
            let entity = store.entity_mut(&loc)?;
            entity.name = name.to_string();
            entity.touch();
            Ok(())
        })
    }

    fn type_name(&self) -> Result<String> {
        let loc = self.location();
        self.core().read(|store| Ok(store.entity(&loc)?.type_name.clone()))
    }

    fn set_type_name(&self, type_name: &str) -> Result<()> {
        check_non_empty("type", type_name)?;
        let loc = self.location();
        self.core().write(|store| {
            let entity = store.entity_mut(&loc)?;
            entity.type_name = type_name.to_string();
            entity.touch();
            Ok(())
        })
    }

    fn definition(&self) -> Result<Option<String>> {
        let loc = self.location();
        self.core().read(|store| Ok(store.entity(&loc)?.definition.clone()))
    }

    fn set_definition(&self, definition: Option<&str>) -> Result<()> {
        let loc = self.location();
        self.core().write(|store| {
            let entity = store.entity_mut(&loc)?;
            entity.definition = definition.map(str::to_string);
            entity.touch();
            Ok(())
        })
    }

    fn created_at(&self) -> Result<i64> {
        let loc = self.location();
        self.core().read(|store| Ok(store.entity(&loc)?.created_at))
    }

    fn updated_at(&self) -> Result<i64> {
        let loc = self.location();
        self.core().read(|store| Ok(store.entity(&loc)?.updated_at))
    }

    /// Override the creation time, e.g. when importing
    fn force_created_at(&self, timestamp: i64) -> Result<()> {
        let loc = self.location();
        self.core().write(|store| {
            store.entity_mut(&loc)?.created_at = timestamp;
            Ok(())
        })
    }

    fn force_updated_at(&self, timestamp: i64) -> Result<()> {
        let loc = self.location();
        self.core().write(|store| {
            store.entity_mut(&loc)?.updated_at = timestamp;
            Ok(())
        })
    }
}

/// Entities that can link one metadata [`Section`]
pub trait EntityWithMetadata: EntityHandle {
    /// The linked section, if it is set and still exists
    fn metadata(&self) -> Result<Option<Section>> {
        let loc = self.location();
        let id = self.core().read(|store| {
            Ok(store
                .metadata_slot(&loc)?
                .filter(|id| store.sections.contains(id)))
        })?;
        Ok(id.map(|id| Section::from_parts(Arc::clone(self.core()), Location::Section(id))))
    }

    /// Replace or clear the linked section
    fn set_metadata(&self, section: Option<&Section>) -> Result<()> {
        let target = match section {
            Some(section) => {
                if !Arc::ptr_eq(section.core(), self.core()) {
                    return Err(NixError::validation(
                        "section belongs to a different container",
                    ));
                }
                Some(section.id())
            }
            None => None,
        };

        let loc = self.location();
        self.core().write(|store| {
            if let Some(id) = &target {
                store.section(id)?;
            }
            *store.metadata_slot_mut(&loc)? = target;
            store.entity_mut(&loc)?.touch();
            Ok(())
        })
    }
}

/// Implements the plumbing shared by every entity handle: [`Located`],
/// equality by container and location, `Debug`, and key conversion.
macro_rules! handle_impls {
    ($handle:ident) => {
        impl $handle {
            pub(crate) fn from_parts(
                core: std::sync::Arc<$crate::handle::FileCore>,
                location: $crate::store::Location,
            ) -> Self {
                Self { core, location }
            }
        }

        impl $crate::handle::Located for $handle {
            fn core(&self) -> &std::sync::Arc<$crate::handle::FileCore> {
                &self.core
            }

            fn location(&self) -> $crate::store::Location {
                self.location
            }
        }

        impl PartialEq for $handle {
            fn eq(&self, other: &Self) -> bool {
                std::sync::Arc::ptr_eq(&self.core, &other.core) && self.location == other.location
            }
        }

        impl Eq for $handle {}

        impl std::fmt::Debug for $handle {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($handle))
                    .field("id", &self.location.id())
                    .finish()
            }
        }

        impl From<&$handle> for $crate::types::Key {
            fn from(handle: &$handle) -> Self {
                $crate::types::Key::Id(handle.location.id())
            }
        }
    };
}

pub(crate) use handle_impls;

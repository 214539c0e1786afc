//! Non-owning link collections: sources of arrays and tags, references of
//! tags.
//!
//! Links are stored as id lists on the owning record. Targets must live in
//! the same block as the owner; they are resolved when read.

use crate::error::{NixError, Result};
use crate::handle::{EntityHandle, FileCore, Located};
use crate::registry::resolve_index;
use crate::store::{Location, Store};
use crate::types::{EntityId, EntityKind, Key};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Entities that can be the target of a link collection
pub trait LinkTarget: EntityHandle + Sized {
    /// Kind stored in the collection
    const KIND: EntityKind;

    /// Whether the same target may appear more than once
    const DUPLICATES: bool;

    /// Does `entity` qualify as a target?
    fn accepts(entity: &dyn EntityHandle) -> bool;

    #[doc(hidden)]
    fn locate(block: EntityId, id: EntityId) -> Location;

    #[doc(hidden)]
    fn attach(core: Arc<FileCore>, location: Location) -> Self;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkField {
    Sources,
    References,
}

fn slot<'a>(store: &'a Store, owner: &Location, field: LinkField) -> Result<&'a Vec<EntityId>> {
    match (owner, field) {
        (Location::DataArray { block, id }, LinkField::Sources) => {
            Ok(&store.data_array(block, id)?.sources)
        }
        (Location::SimpleTag { block, id }, LinkField::Sources) => {
            Ok(&store.simple_tag(block, id)?.sources)
        }
        (Location::SimpleTag { block, id }, LinkField::References) => {
            Ok(&store.simple_tag(block, id)?.references)
        }
        (Location::DataTag { block, id }, LinkField::Sources) => {
            Ok(&store.data_tag(block, id)?.sources)
        }
        (Location::DataTag { block, id }, LinkField::References) => {
            Ok(&store.data_tag(block, id)?.references)
        }
        _ => Err(NixError::Type(format!(
            "{} has no {:?} links",
            owner.kind(),
            field
        ))),
    }
}

fn slot_mut<'a>(
    store: &'a mut Store,
    owner: &Location,
    field: LinkField,
) -> Result<&'a mut Vec<EntityId>> {
    match (owner, field) {
        (Location::DataArray { block, id }, LinkField::Sources) => {
            Ok(&mut store.data_array_mut(block, id)?.sources)
        }
        (Location::SimpleTag { block, id }, LinkField::Sources) => {
            Ok(&mut store.simple_tag_mut(block, id)?.sources)
        }
        (Location::SimpleTag { block, id }, LinkField::References) => {
            Ok(&mut store.simple_tag_mut(block, id)?.references)
        }
        (Location::DataTag { block, id }, LinkField::Sources) => {
            Ok(&mut store.data_tag_mut(block, id)?.sources)
        }
        (Location::DataTag { block, id }, LinkField::References) => {
            Ok(&mut store.data_tag_mut(block, id)?.references)
        }
        _ => Err(NixError::Type(format!(
            "{} has no {:?} links",
            owner.kind(),
            field
        ))),
    }
}

/// Ordered, non-owning links from one entity to others of kind `T`
pub struct LinkList<T> {
    core: Arc<FileCore>,
    owner: Location,
    field: LinkField,
    _target: PhantomData<T>,
}

impl<T> Clone for LinkList<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            owner: self.owner,
            field: self.field,
            _target: PhantomData,
        }
    }
}

impl<T> fmt::Debug for LinkList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkList")
            .field("owner", &self.owner.id())
            .field("field", &self.field)
            .finish()
    }
}

impl<T: LinkTarget> LinkList<T> {
    pub(crate) fn new(core: Arc<FileCore>, owner: Location, field: LinkField) -> Self {
        Self {
            core,
            owner,
            field,
            _target: PhantomData,
        }
    }

    fn block(&self) -> Result<EntityId> {
        self.owner
            .block()
            .ok_or_else(|| NixError::Type(format!("{} is not block scoped", self.owner.kind())))
    }

    fn handle(&self, block: EntityId, id: EntityId) -> T {
        T::attach(Arc::clone(&self.core), T::locate(block, id))
    }

    /// Position of the first link matching `key`
    fn position(
        &self,
        store: &Store,
        block: &EntityId,
        ids: &[EntityId],
        key: &Key,
    ) -> Result<Option<usize>> {
        Ok(match key {
            Key::Index(index) => Some(resolve_index(*index, ids.len())?),
            _ => ids.iter().position(|id| {
                let name = store
                    .entity(&T::locate(*block, *id))
                    .ok()
                    .map(|entity| entity.name.as_str());
                key.matches(id, name)
            }),
        })
    }

    pub fn len(&self) -> Result<usize> {
        self.core
            .read(|store| Ok(slot(store, &self.owner, self.field)?.len()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Linked ids in order
    pub fn ids(&self) -> Result<Vec<EntityId>> {
        self.core
            .read(|store| Ok(slot(store, &self.owner, self.field)?.clone()))
    }

    /// Link at a position (negative from the end), or the first link with a
    /// given id or name
    pub fn get(&self, key: impl Into<Key>) -> Result<T> {
        let key = key.into();
        let block = self.block()?;
        let id = self.core.read(|store| {
            let ids = slot(store, &self.owner, self.field)?;
            let pos = self
                .position(store, &block, ids, &key)?
                .ok_or_else(|| NixError::not_found("link", format!("{:?}", key)))?;
            Ok(ids[pos])
        })?;
        Ok(self.handle(block, id))
    }

    pub fn to_vec(&self) -> Result<Vec<T>> {
        let block = self.block()?;
        Ok(self
            .ids()?
            .into_iter()
            .map(|id| self.handle(block, id))
            .collect())
    }

    /// Membership by id; positions are not accepted
    pub fn contains(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        if let Key::Index(_) = key {
            return Err(NixError::Type(
                "membership is tested by id, name or handle".to_string(),
            ));
        }
        let block = self.block()?;
        self.core.read(|store| {
            let ids = slot(store, &self.owner, self.field)?;
            Ok(self.position(store, &block, ids, &key)?.is_some())
        })
    }

    /// Link `entity`; it must be a `T` of the owner's block
    pub fn append(&self, entity: &dyn EntityHandle) -> Result<()> {
        if !T::accepts(entity) {
            return Err(NixError::Type(format!(
                "expected a {}, got a {}",
                T::KIND,
                entity.kind()
            )));
        }
        if !Arc::ptr_eq(entity.core(), &self.core) {
            return Err(NixError::validation("entity belongs to a different container"));
        }
        let block = self.block()?;
        let target = entity.location();
        if target.block() != Some(block) {
            return Err(NixError::validation(format!(
                "{} '{}' is not part of the owning block",
                T::KIND,
                target.id()
            )));
        }

        let id = target.id();
        self.core.write(|store| {
            store.entity(&T::locate(block, id))?;
            let ids = slot_mut(store, &self.owner, self.field)?;
            if T::DUPLICATES || !ids.contains(&id) {
                ids.push(id);
            }
            store.entity_mut(&self.owner)?.touch();
            Ok(())
        })?;
        debug!(owner = %self.owner.id(), target = %id, field = ?self.field, "linked");
        Ok(())
    }

    /// Unlink the first match of `key`: a position, an id, a name, or a handle
    pub fn remove(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let block = self.block()?;
        self.core.write(|store| {
            let pos = {
                let ids = slot(store, &self.owner, self.field)?;
                self.position(store, &block, ids, &key)?
                    .ok_or_else(|| NixError::not_found("link", format!("{:?}", key)))?
            };
            slot_mut(store, &self.owner, self.field)?.remove(pos);
            store.entity_mut(&self.owner)?.touch();
            Ok(())
        })
    }

    /// Drop every link
    pub fn clear(&self) -> Result<()> {
        self.core.write(|store| {
            slot_mut(store, &self.owner, self.field)?.clear();
            store.entity_mut(&self.owner)?.touch();
            Ok(())
        })
    }
}

//! Provenance nodes. Sources form a tree rooted in their Block and are
//! linked, never owned, by DataArrays and tags.

use crate::entity::EntityRecord;
use crate::error::{NixError, Result};
use crate::handle::{handle_impls, EntityHandle, EntityWithMetadata, FileCore, NamedEntity};
use crate::links::LinkTarget;
use crate::registry::exists;
use crate::store::{Location, SourceRecord};
use crate::types::{EntityId, EntityKind, Key};
use std::sync::Arc;
use tracing::debug;

pub(crate) fn create_source(
    core: &Arc<FileCore>,
    block: EntityId,
    parent: Option<EntityId>,
    name: &str,
    type_name: &str,
) -> Result<Source> {
    let record = SourceRecord {
        entity: EntityRecord::new(name, type_name)?,
        metadata: None,
    };
    let id = core.write(|store| {
        let block = store.block_mut(&block)?;
        let id = block.sources.insert(parent.as_ref(), record)?;
        block.entity.touch();
        Ok(id)
    })?;
    debug!(block = %block, source = %id, name, "created source");
    Ok(Source::from_parts(
        Arc::clone(core),
        Location::Source { block, id },
    ))
}

fn handles(core: &Arc<FileCore>, block: EntityId, ids: Vec<EntityId>) -> Vec<Source> {
    ids.into_iter()
        .map(|id| Source::from_parts(Arc::clone(core), Location::Source { block, id }))
        .collect()
}

pub(crate) fn child_sources(
    core: &Arc<FileCore>,
    block: EntityId,
    parent: Option<EntityId>,
) -> Result<Vec<Source>> {
    let ids = core.read(|store| {
        Ok(store.block(&block)?.sources.children(parent.as_ref())?.to_vec())
    })?;
    Ok(handles(core, block, ids))
}

pub(crate) fn get_source(
    core: &Arc<FileCore>,
    block: EntityId,
    parent: Option<EntityId>,
    key: &Key,
) -> Result<Source> {
    let id = core.read(|store| store.block(&block)?.sources.resolve_child(parent.as_ref(), key))?;
    Ok(Source::from_parts(
        Arc::clone(core),
        Location::Source { block, id },
    ))
}

/// Delete a source subtree and unlink it from every array and tag
pub(crate) fn delete_source(
    core: &Arc<FileCore>,
    block: EntityId,
    parent: Option<EntityId>,
    key: &Key,
) -> Result<()> {
    let removed = core.write(|store| {
        let block = store.block_mut(&block)?;
        let id = block.sources.resolve_child(parent.as_ref(), key)?;
        let removed = block.sources.remove(&id);
        block.purge_sources(&removed);
        block.entity.touch();
        Ok(removed)
    })?;
    debug!(block = %block, count = removed.len(), "deleted sources");
    Ok(())
}

pub(crate) fn find_sources(
    core: &Arc<FileCore>,
    block: EntityId,
    start: Option<EntityId>,
    max_depth: usize,
) -> Result<Vec<Source>> {
    let ids = core.read(|store| {
        Ok(store.block(&block)?.sources.descendants(start.as_ref(), max_depth))
    })?;
    Ok(handles(core, block, ids))
}

/// A provenance node
#[derive(Clone)]
pub struct Source {
    core: Arc<FileCore>,
    location: Location,
}

handle_impls!(Source);

impl EntityHandle for Source {}

impl NamedEntity for Source {}

impl EntityWithMetadata for Source {}

impl LinkTarget for Source {
    const KIND: EntityKind = EntityKind::Source;
    const DUPLICATES: bool = false;

    fn accepts(entity: &dyn EntityHandle) -> bool {
        entity.kind() == EntityKind::Source
    }

    fn locate(block: EntityId, id: EntityId) -> Location {
        Location::Source { block, id }
    }

    fn attach(core: Arc<FileCore>, location: Location) -> Self {
        Self::from_parts(core, location)
    }
}

impl Source {
    fn block_id(&self) -> Result<EntityId> {
        self.location
            .block()
            .ok_or_else(|| NixError::Type("source outside of a block".to_string()))
    }

    pub fn create_source(&self, name: &str, type_name: &str) -> Result<Source> {
        create_source(&self.core, self.block_id()?, Some(self.location.id()), name, type_name)
    }

    /// Direct children
    pub fn sources(&self) -> Result<Vec<Source>> {
        child_sources(&self.core, self.block_id()?, Some(self.location.id()))
    }

    pub fn source_count(&self) -> Result<usize> {
        Ok(self.sources()?.len())
    }

    pub fn get_source(&self, key: impl Into<Key>) -> Result<Source> {
        get_source(&self.core, self.block_id()?, Some(self.location.id()), &key.into())
    }

    pub fn has_source(&self, key: impl Into<Key>) -> Result<bool> {
        exists(self.get_source(key))
    }

    pub fn delete_source(&self, key: impl Into<Key>) -> Result<()> {
        delete_source(&self.core, self.block_id()?, Some(self.location.id()), &key.into())
    }

    /// Parent source, `None` for a root of the block
    pub fn parent_source(&self) -> Result<Option<Source>> {
        let block = self.block_id()?;
        let id = self.location.id();
        let parent = self.core.read(|store| {
            let sources = &store.block(&block)?.sources;
            if !sources.contains(&id) {
                return Err(NixError::not_found("source", id));
            }
            Ok(sources.parent_of(&id))
        })?;
        Ok(parent.map(|p| {
            Source::from_parts(Arc::clone(&self.core), Location::Source { block, id: p })
        }))
    }

    /// This source and its descendants down to `max_depth` levels
    pub fn find_sources(&self, max_depth: usize) -> Result<Vec<Source>> {
        find_sources(&self.core, self.block_id()?, Some(self.location.id()), max_depth)
    }
}

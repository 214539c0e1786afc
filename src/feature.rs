//! Features: auxiliary DataArrays linked to a tag.

use crate::data_array::DataArray;
use crate::entity::now;
use crate::error::{NixError, Result};
use crate::handle::{handle_impls, EntityHandle, FileCore, Located};
use crate::registry::resolve_index;
use crate::store::{FeatureRecord, Location, TagRef};
use crate::types::{EntityId, Key, LinkType};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Check that `entity` is a DataArray of `block` in the same container
pub(crate) fn check_data_array(
    core: &Arc<FileCore>,
    block: &EntityId,
    entity: &dyn EntityHandle,
) -> Result<EntityId> {
    if entity.as_typed_payload().is_none() {
        return Err(NixError::Type(format!(
            "expected a DataArray, got a {}",
            entity.kind()
        )));
    }
    if !Arc::ptr_eq(entity.core(), core) {
        return Err(NixError::validation("entity belongs to a different container"));
    }
    if entity.location().block() != Some(*block) {
        return Err(NixError::validation(format!(
            "data array '{}' is not part of the owning block",
            entity.id()
        )));
    }
    Ok(entity.id())
}

/// A link from a tag to a DataArray with a [`LinkType`]
#[derive(Clone)]
pub struct Feature {
    core: Arc<FileCore>,
    location: Location,
}

handle_impls!(Feature);

impl EntityHandle for Feature {}

impl Feature {
    fn keys(&self) -> Result<(EntityId, TagRef, EntityId)> {
        match self.location {
            Location::Feature { block, tag, id } => Ok((block, tag, id)),
            other => Err(NixError::Type(format!("{} is not a feature", other.kind()))),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&FeatureRecord) -> Result<R>) -> Result<R> {
        let (block, tag, id) = self.keys()?;
        self.core.read(|store| {
            let record = store
                .features(&block, &tag)?
                .iter()
                .find(|feature| feature.id == id)
                .ok_or_else(|| NixError::not_found("feature", id))?;
            f(record)
        })
    }

    fn update(&self, f: impl FnOnce(&mut FeatureRecord) -> Result<()>) -> Result<()> {
        let (block, tag, id) = self.keys()?;
        self.core.write(|store| {
            let record = store
                .features_mut(&block, &tag)?
                .iter_mut()
                .find(|feature| feature.id == id)
                .ok_or_else(|| NixError::not_found("feature", id))?;
            f(record)?;
            record.updated_at = now();
            Ok(())
        })
    }

    pub fn link_type(&self) -> Result<LinkType> {
        self.with(|record| Ok(record.link_type))
    }

    pub fn set_link_type(&self, link_type: LinkType) -> Result<()> {
        self.update(|record| {
            record.link_type = link_type;
            Ok(())
        })
    }

    /// The linked DataArray
    pub fn data(&self) -> Result<DataArray> {
        let (block, _, _) = self.keys()?;
        let id = self.with(|record| Ok(record.data))?;
        Ok(DataArray::from_parts(
            Arc::clone(&self.core),
            Location::DataArray { block, id },
        ))
    }

    /// Point the feature at another DataArray of the same block
    pub fn set_data(&self, entity: &dyn EntityHandle) -> Result<()> {
        let (block, _, _) = self.keys()?;
        let data = check_data_array(&self.core, &block, entity)?;
        self.update(|record| {
            record.data = data;
            Ok(())
        })
    }

    pub fn created_at(&self) -> Result<i64> {
        self.with(|record| Ok(record.created_at))
    }

    pub fn updated_at(&self) -> Result<i64> {
        self.with(|record| Ok(record.updated_at))
    }
}

/// Owned features of one tag
#[derive(Clone)]
pub struct Features {
    core: Arc<FileCore>,
    block: EntityId,
    tag: TagRef,
}

impl fmt::Debug for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Features").field("tag", &self.tag).finish()
    }
}

impl Features {
    pub(crate) fn new(core: Arc<FileCore>, block: EntityId, tag: TagRef) -> Self {
        Self { core, block, tag }
    }

    fn handle(&self, id: EntityId) -> Feature {
        Feature::from_parts(
            Arc::clone(&self.core),
            Location::Feature {
                block: self.block,
                tag: self.tag,
                id,
            },
        )
    }

    fn position(records: &[FeatureRecord], key: &Key) -> Result<Option<usize>> {
        Ok(match key {
            Key::Index(index) => Some(resolve_index(*index, records.len())?),
            _ => records.iter().position(|feature| key.matches(&feature.id, None)),
        })
    }

    pub(crate) fn create(&self, entity: &dyn EntityHandle, link_type: LinkType) -> Result<Feature> {
        let data = check_data_array(&self.core, &self.block, entity)?;
        let record = FeatureRecord::new(data, link_type);
        let id = record.id;
        self.core.write(|store| {
            store.data_array(&self.block, &data)?;
            store.features_mut(&self.block, &self.tag)?.push(record);
            store.entity_mut(&self.tag.location(self.block))?.touch();
            Ok(())
        })?;
        debug!(feature = %id, data = %data, ?link_type, "created feature");
        Ok(self.handle(id))
    }

    pub fn len(&self) -> Result<usize> {
        self.core
            .read(|store| Ok(store.features(&self.block, &self.tag)?.len()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Feature by position (negative from the end) or id
    pub fn get(&self, key: impl Into<Key>) -> Result<Feature> {
        let key = key.into();
        let id = self.core.read(|store| {
            let records = store.features(&self.block, &self.tag)?;
            let pos = Self::position(records, &key)?
                .ok_or_else(|| NixError::not_found("feature", format!("{:?}", key)))?;
            Ok(records[pos].id)
        })?;
        Ok(self.handle(id))
    }

    /// Membership by feature handle, id, or id string
    pub fn contains(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        if let Key::Index(_) = key {
            return Err(NixError::Type(
                "membership is tested by id or handle".to_string(),
            ));
        }
        self.core.read(|store| {
            let records = store.features(&self.block, &self.tag)?;
            Ok(Self::position(records, &key)?.is_some())
        })
    }

    pub fn to_vec(&self) -> Result<Vec<Feature>> {
        let ids = self.core.read(|store| {
            Ok(store
                .features(&self.block, &self.tag)?
                .iter()
                .map(|feature| feature.id)
                .collect::<Vec<_>>())
        })?;
        Ok(ids.into_iter().map(|id| self.handle(id)).collect())
    }

    pub fn delete(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let removed = self.core.write(|store| {
            let records = store.features_mut(&self.block, &self.tag)?;
            let pos = Self::position(records, &key)?
                .ok_or_else(|| NixError::not_found("feature", format!("{:?}", key)))?;
            let removed = records.remove(pos).id;
            store.entity_mut(&self.tag.location(self.block))?.touch();
            Ok(removed)
        })?;
        debug!(feature = %removed, "deleted feature");
        Ok(())
    }
}

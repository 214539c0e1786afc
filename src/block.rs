//! Blocks: the top-level grouping of a container.
//!
//! A Block owns its DataArrays, Sources, SimpleTags and DataTags. Deleting
//! any of them purges the links other entities of the block hold to it.

use crate::data_array::{DataArray, DataInit};
use crate::data_tag::DataTag;
use crate::entity::EntityRecord;
use crate::error::{NixError, Result};
use crate::feature::check_data_array;
use crate::handle::{handle_impls, EntityHandle, EntityWithMetadata, FileCore, NamedEntity};
use crate::registry::exists;
use crate::source::{self, Source};
use crate::store::{BlockRecord, DataArrayRecord, DataTagRecord, Location, SimpleTagRecord};
use crate::tag::SimpleTag;
use crate::types::{Element, EntityId, Key};
use std::sync::Arc;
use tracing::debug;

/// A group of related DataArrays, Sources and tags
#[derive(Clone)]
pub struct Block {
    core: Arc<FileCore>,
    location: Location,
}

handle_impls!(Block);

impl EntityHandle for Block {}

impl NamedEntity for Block {}

impl EntityWithMetadata for Block {}

impl Block {
    fn block_id(&self) -> EntityId {
        self.location.id()
    }

    fn read<R>(&self, f: impl FnOnce(&BlockRecord) -> Result<R>) -> Result<R> {
        let id = self.block_id();
        self.core.read(|store| f(store.block(&id)?))
    }

    fn write<R>(&self, f: impl FnOnce(&mut BlockRecord) -> Result<R>) -> Result<R> {
        let id = self.block_id();
        self.core.write(|store| {
            let block = store.block_mut(&id)?;
            let out = f(block)?;
            block.entity.touch();
            Ok(out)
        })
    }

    // DataArrays

    fn data_array_handle(&self, id: EntityId) -> DataArray {
        DataArray::from_parts(
            Arc::clone(&self.core),
            Location::DataArray {
                block: self.block_id(),
                id,
            },
        )
    }

    fn insert_data_array(&self, record: DataArrayRecord) -> Result<DataArray> {
        let name = record.entity.name.clone();
        let id = self.write(|block| block.data_arrays.insert(record))?;
        debug!(block = %self.block_id(), array = %id, name = %name, "created data array");
        Ok(self.data_array_handle(id))
    }

    /// Create an empty DataArray; the payload is allocated later with
    /// [`DataArray::create_data`]
    pub fn create_data_array(&self, name: &str, type_name: &str) -> Result<DataArray> {
        let record = DataArrayRecord::new(
            EntityRecord::new(name, type_name)?,
            self.core.options().compression,
        );
        self.insert_data_array(record)
    }

    /// Create a DataArray and its payload in one step. Nothing is created
    /// if the payload arguments are invalid.
    pub fn create_data_array_with_data<T: Element>(
        &self,
        name: &str,
        type_name: &str,
        init: DataInit<'_, T>,
    ) -> Result<DataArray> {
        let options = self.core.options();
        let entity = EntityRecord::new(name, type_name)?;
        let mut record = DataArrayRecord::new(entity, options.compression);
        let payload = init.build()?;
        record.data = Some(payload.with_codec(options.compression, options.compression_level));
        self.insert_data_array(record)
    }

    pub fn data_arrays(&self) -> Result<Vec<DataArray>> {
        let ids = self.read(|block| Ok(block.data_arrays.ids().to_vec()))?;
        Ok(ids.into_iter().map(|id| self.data_array_handle(id)).collect())
    }

    pub fn data_array_count(&self) -> Result<usize> {
        self.read(|block| Ok(block.data_arrays.len()))
    }

    /// DataArray by position, id or name
    pub fn get_data_array(&self, key: impl Into<Key>) -> Result<DataArray> {
        let key = key.into();
        let id = self.read(|block| Ok(block.data_arrays.resolve(&key)?.entity.id))?;
        Ok(self.data_array_handle(id))
    }

    pub fn has_data_array(&self, key: impl Into<Key>) -> Result<bool> {
        exists(self.get_data_array(key))
    }

    /// Delete a DataArray and drop every reference, feature, position or
    /// extent link to it
    pub fn delete_data_array(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let id = self.write(|block| {
            let id = block.data_arrays.resolve(&key)?.entity.id;
            block.data_arrays.remove(&id);
            block.purge_data_array(&id);
            Ok(id)
        })?;
        debug!(block = %self.block_id(), array = %id, "deleted data array");
        Ok(())
    }

    // Sources

    pub fn create_source(&self, name: &str, type_name: &str) -> Result<Source> {
        source::create_source(&self.core, self.block_id(), None, name, type_name)
    }

    /// Root sources of this block
    pub fn sources(&self) -> Result<Vec<Source>> {
        source::child_sources(&self.core, self.block_id(), None)
    }

    pub fn source_count(&self) -> Result<usize> {
        self.read(|block| Ok(block.sources.children(None)?.len()))
    }

    pub fn get_source(&self, key: impl Into<Key>) -> Result<Source> {
        source::get_source(&self.core, self.block_id(), None, &key.into())
    }

    pub fn has_source(&self, key: impl Into<Key>) -> Result<bool> {
        exists(self.get_source(key))
    }

    /// Delete a root source with its subtree
    pub fn delete_source(&self, key: impl Into<Key>) -> Result<()> {
        source::delete_source(&self.core, self.block_id(), None, &key.into())
    }

    /// Sources down to `max_depth` levels below the roots
    pub fn find_sources(&self, max_depth: usize) -> Result<Vec<Source>> {
        source::find_sources(&self.core, self.block_id(), None, max_depth)
    }

    // SimpleTags

    fn simple_tag_handle(&self, id: EntityId) -> SimpleTag {
        SimpleTag::from_parts(
            Arc::clone(&self.core),
            Location::SimpleTag {
                block: self.block_id(),
                id,
            },
        )
    }

    fn reference_ids(&self, references: &[&dyn EntityHandle]) -> Result<Vec<EntityId>> {
        references
            .iter()
            .map(|entity| check_data_array(&self.core, &self.block_id(), *entity))
            .collect()
    }

    /// Create a SimpleTag referencing at least one DataArray of this block
    pub fn create_simple_tag(
        &self,
        name: &str,
        type_name: &str,
        references: &[&dyn EntityHandle],
    ) -> Result<SimpleTag> {
        let entity = EntityRecord::new(name, type_name)?;
        if references.is_empty() {
            return Err(NixError::validation(
                "a simple tag needs at least one reference",
            ));
        }
        let references = self.reference_ids(references)?;
        let record = SimpleTagRecord {
            entity,
            metadata: None,
            sources: Vec::new(),
            references,
            position: Vec::new(),
            extent: Vec::new(),
            units: Vec::new(),
            features: Vec::new(),
        };
        let id = self.write(|block| {
            for reference in &record.references {
                if !block.data_arrays.contains(reference) {
                    return Err(NixError::not_found("data array", reference));
                }
            }
            block.simple_tags.insert(record)
        })?;
        debug!(block = %self.block_id(), tag = %id, name, "created simple tag");
        Ok(self.simple_tag_handle(id))
    }

    pub fn simple_tags(&self) -> Result<Vec<SimpleTag>> {
        let ids = self.read(|block| Ok(block.simple_tags.ids().to_vec()))?;
        Ok(ids.into_iter().map(|id| self.simple_tag_handle(id)).collect())
    }

    pub fn simple_tag_count(&self) -> Result<usize> {
        self.read(|block| Ok(block.simple_tags.len()))
    }

    pub fn get_simple_tag(&self, key: impl Into<Key>) -> Result<SimpleTag> {
        let key = key.into();
        let id = self.read(|block| Ok(block.simple_tags.resolve(&key)?.entity.id))?;
        Ok(self.simple_tag_handle(id))
    }

    pub fn has_simple_tag(&self, key: impl Into<Key>) -> Result<bool> {
        exists(self.get_simple_tag(key))
    }

    /// Delete a SimpleTag with its features
    pub fn delete_simple_tag(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let id = self.write(|block| {
            let id = block.simple_tags.resolve(&key)?.entity.id;
            block.simple_tags.remove(&id);
            Ok(id)
        })?;
        debug!(block = %self.block_id(), tag = %id, "deleted simple tag");
        Ok(())
    }

    // DataTags

    fn data_tag_handle(&self, id: EntityId) -> DataTag {
        DataTag::from_parts(
            Arc::clone(&self.core),
            Location::DataTag {
                block: self.block_id(),
                id,
            },
        )
    }

    /// Create a DataTag whose points are the rows of `positions`
    pub fn create_data_tag(
        &self,
        name: &str,
        type_name: &str,
        positions: &dyn EntityHandle,
    ) -> Result<DataTag> {
        let entity = EntityRecord::new(name, type_name)?;
        let positions = check_data_array(&self.core, &self.block_id(), positions)?;
        let record = DataTagRecord {
            entity,
            metadata: None,
            sources: Vec::new(),
            references: Vec::new(),
            positions: Some(positions),
            extents: None,
            units: Vec::new(),
            features: Vec::new(),
        };
        let id = self.write(|block| {
            if !block.data_arrays.contains(&positions) {
                return Err(NixError::not_found("data array", positions));
            }
            block.data_tags.insert(record)
        })?;
        debug!(block = %self.block_id(), tag = %id, name, "created data tag");
        Ok(self.data_tag_handle(id))
    }

    pub fn data_tags(&self) -> Result<Vec<DataTag>> {
        let ids = self.read(|block| Ok(block.data_tags.ids().to_vec()))?;
        Ok(ids.into_iter().map(|id| self.data_tag_handle(id)).collect())
    }

    pub fn data_tag_count(&self) -> Result<usize> {
        self.read(|block| Ok(block.data_tags.len()))
    }

    pub fn get_data_tag(&self, key: impl Into<Key>) -> Result<DataTag> {
        let key = key.into();
        let id = self.read(|block| Ok(block.data_tags.resolve(&key)?.entity.id))?;
        Ok(self.data_tag_handle(id))
    }

    pub fn has_data_tag(&self, key: impl Into<Key>) -> Result<bool> {
        exists(self.get_data_tag(key))
    }

    pub fn delete_data_tag(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let id = self.write(|block| {
            let id = block.data_tags.resolve(&key)?.entity.id;
            block.data_tags.remove(&id);
            Ok(id)
        })?;
        debug!(block = %self.block_id(), tag = %id, "deleted data tag");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CompressionMethod;
    use crate::file::{File, FileMode};
    use crate::options::FileOptions;
    use crate::io::MemoryBackend;
    use ndarray::arr1;

    fn block() -> (File, Block) {
        let file = File::in_memory().unwrap();
        let block = file.create_block("session", "recording").unwrap();
        (file, block)
    }

    #[test]
    fn test_data_array_lookup() {
        let (_file, block) = block();
        let a = block.create_data_array("a", "signal").unwrap();
        block.create_data_array("b", "signal").unwrap();

        assert_eq!(block.data_array_count().unwrap(), 2);
        assert_eq!(block.get_data_array("a").unwrap(), a);
        assert_eq!(block.get_data_array(a.id().to_string()).unwrap(), a);
        assert_eq!(block.get_data_array(-1).unwrap().name().unwrap(), "b");
        assert!(block.has_data_array(&a).unwrap());
        assert!(!block.has_data_array("zzz").unwrap());
        assert!(matches!(block.get_data_array(5), Err(NixError::OutOfBounds { .. })));
        assert!(matches!(block.create_data_array("a", "signal"), Err(NixError::Validation(_))));
    }

    #[test]
    fn test_create_with_invalid_data_creates_nothing() {
        let (_file, block) = block();
        let data = arr1(&[1.0, 2.0, 3.0]);
        let init = DataInit::new().with_shape(&[4]).with_data(data.view());
        assert!(block.create_data_array_with_data("a", "signal", init).is_err());
        assert_eq!(block.data_array_count().unwrap(), 0);
    }

    #[test]
    fn test_default_compression_from_options() {
        let options = FileOptions::new().with_compression(CompressionMethod::Zstd);
        let backend = Box::new(MemoryBackend::new());
        let file = File::open_with_backend(backend, FileMode::Overwrite, options).unwrap();
        let block = file.create_block("b", "t").unwrap();
        let array = block.create_data_array("a", "signal").unwrap();
        assert_eq!(array.compression().unwrap(), CompressionMethod::Zstd);
    }

    #[test]
    fn test_simple_tag_reference_checks() {
        let (file, block) = block();
        let array = block.create_data_array("a", "signal").unwrap();
        let source = block.create_source("electrode", "hardware").unwrap();
        let other = file.create_block("other", "recording").unwrap();
        let foreign = other.create_data_array("x", "signal").unwrap();

        assert!(matches!(
            block.create_simple_tag("t", "event", &[]),
            Err(NixError::Validation(_))
        ));
        assert!(matches!(
            block.create_simple_tag("t", "event", &[&source]),
            Err(NixError::Type(_))
        ));
        assert!(matches!(
            block.create_simple_tag("t", "event", &[&foreign]),
            Err(NixError::Validation(_))
        ));
        assert_eq!(block.simple_tag_count().unwrap(), 0);

        let tag = block.create_simple_tag("t", "event", &[&array, &array]).unwrap();
        assert_eq!(tag.references().len().unwrap(), 2);
    }

    #[test]
    fn test_delete_data_array_purges_links() {
        let (_file, block) = block();
        let array = block.create_data_array("a", "signal").unwrap();
        let keep = block.create_data_array("b", "signal").unwrap();
        let tag = block
            .create_simple_tag("t", "event", &[&array, &keep, &array])
            .unwrap();
        tag.create_feature(&array, crate::types::LinkType::Untagged).unwrap();

        block.delete_data_array(&array).unwrap();
        assert_eq!(tag.references().to_vec().unwrap(), vec![keep]);
        assert!(tag.features().is_empty().unwrap());
        assert!(matches!(array.label(), Err(NixError::NotFound(_))));
    }

    #[test]
    fn test_tag_collections() {
        let (_file, block) = block();
        let array = block.create_data_array("a", "signal").unwrap();
        let simple = block.create_simple_tag("s", "event", &[&array]).unwrap();
        let data = block.create_data_tag("d", "events", &array).unwrap();

        assert_eq!(block.simple_tags().unwrap(), vec![simple.clone()]);
        assert_eq!(block.get_data_tag("d").unwrap(), data);
        assert!(block.has_simple_tag(&simple).unwrap());

        block.delete_simple_tag("s").unwrap();
        block.delete_data_tag(&data).unwrap();
        assert_eq!(block.simple_tag_count().unwrap(), 0);
        assert_eq!(block.data_tag_count().unwrap(), 0);
        assert!(!block.has_data_tag("d").unwrap());
    }

    #[test]
    fn test_source_tree() {
        let (_file, block) = block();
        let electrode = block.create_source("electrode", "hardware").unwrap();
        let shank = electrode.create_source("shank", "hardware").unwrap();
        shank.create_source("site", "hardware").unwrap();
        block.create_source("animal", "subject").unwrap();

        assert_eq!(block.source_count().unwrap(), 2);
        assert_eq!(block.find_sources(0).unwrap().len(), 2);
        assert_eq!(block.find_sources(usize::MAX).unwrap().len(), 4);
        assert_eq!(shank.parent_source().unwrap(), Some(electrode.clone()));

        block.delete_source(&electrode).unwrap();
        assert_eq!(block.find_sources(usize::MAX).unwrap().len(), 1);
        assert!(matches!(shank.name(), Err(NixError::NotFound(_))));
    }
}

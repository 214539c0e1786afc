//! In-memory container model.
//!
//! Owning relations are nested records (Block → DataArray, Tag → Feature,
//! Tree → node). Non-owning relations (sources, references, feature data,
//! metadata links) are stored as id lists and resolved at access time;
//! deletions purge them through the `purge_*` cascades below.

use crate::compression::CompressionMethod;
use crate::dimension::DimensionDescriptor;
use crate::entity::{now, EntityRecord, HasEntity};
use crate::error::{NixError, Result};
use crate::payload::Payload;
use crate::registry::Registry;
use crate::section::PropertyRecord;
use crate::tree::Tree;
use crate::types::{EntityId, EntityKind, LinkType};
use serde::{Deserialize, Serialize};

macro_rules! has_entity {
    ($($record:ty),* $(,)?) => {
        $(
            impl HasEntity for $record {
                fn entity(&self) -> &EntityRecord {
                    &self.entity
                }

                fn entity_mut(&mut self) -> &mut EntityRecord {
                    &mut self.entity
                }
            }
        )*
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataArrayRecord {
    pub entity: EntityRecord,
    pub metadata: Option<EntityId>,
    pub sources: Vec<EntityId>,
    pub label: Option<String>,
    pub unit: Option<String>,
    pub expansion_origin: Option<f64>,
    pub polynom_coefficients: Vec<f64>,
    pub compression: CompressionMethod,
    pub data: Option<Payload>,
    pub dimensions: Vec<DimensionDescriptor>,
}

impl DataArrayRecord {
    pub fn new(entity: EntityRecord, compression: CompressionMethod) -> Self {
        Self {
            entity,
            metadata: None,
            sources: Vec::new(),
            label: None,
            unit: None,
            expansion_origin: None,
            polynom_coefficients: Vec::new(),
            compression,
            data: None,
            dimensions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub entity: EntityRecord,
    pub metadata: Option<EntityId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub id: EntityId,
    pub link_type: LinkType,
    pub data: EntityId,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FeatureRecord {
    pub fn new(data: EntityId, link_type: LinkType) -> Self {
        let now = now();
        Self {
            id: EntityId::generate(),
            link_type,
            data,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleTagRecord {
    pub entity: EntityRecord,
    pub metadata: Option<EntityId>,
    pub sources: Vec<EntityId>,
    pub references: Vec<EntityId>,
    pub position: Vec<f64>,
    pub extent: Vec<f64>,
    pub units: Vec<String>,
    pub features: Vec<FeatureRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTagRecord {
    pub entity: EntityRecord,
    pub metadata: Option<EntityId>,
    pub sources: Vec<EntityId>,
    pub references: Vec<EntityId>,
    pub positions: Option<EntityId>,
    pub extents: Option<EntityId>,
    pub units: Vec<String>,
    pub features: Vec<FeatureRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub entity: EntityRecord,
    pub metadata: Option<EntityId>,
    pub data_arrays: Registry<DataArrayRecord>,
    pub sources: Tree<SourceRecord>,
    pub simple_tags: Registry<SimpleTagRecord>,
    pub data_tags: Registry<DataTagRecord>,
}

impl BlockRecord {
    pub fn new(entity: EntityRecord) -> Self {
        Self {
            entity,
            metadata: None,
            data_arrays: Registry::new(),
            sources: Tree::new(),
            simple_tags: Registry::new(),
            data_tags: Registry::new(),
        }
    }

    /// Drop every non-owning link to a deleted DataArray
    pub fn purge_data_array(&mut self, id: &EntityId) {
        for tag in self.simple_tags.values_mut() {
            tag.references.retain(|other| other != id);
            tag.features.retain(|feature| feature.data != *id);
        }
        for tag in self.data_tags.values_mut() {
            tag.references.retain(|other| other != id);
            tag.features.retain(|feature| feature.data != *id);
            if tag.positions == Some(*id) {
                tag.positions = None;
            }
            if tag.extents == Some(*id) {
                tag.extents = None;
            }
        }
    }

    /// Drop every link to deleted Sources
    pub fn purge_sources(&mut self, ids: &[EntityId]) {
        let keep = |other: &EntityId| !ids.contains(other);
        for array in self.data_arrays.values_mut() {
            array.sources.retain(keep);
        }
        for tag in self.simple_tags.values_mut() {
            tag.sources.retain(keep);
        }
        for tag in self.data_tags.values_mut() {
            tag.sources.retain(keep);
        }
    }

    /// Clear metadata links pointing at deleted Sections
    pub fn purge_sections(&mut self, ids: &[EntityId]) {
        let clear = |slot: &mut Option<EntityId>| {
            if slot.map(|id| ids.contains(&id)).unwrap_or(false) {
                *slot = None;
            }
        };
        clear(&mut self.metadata);
        for array in self.data_arrays.values_mut() {
            clear(&mut array.metadata);
        }
        for source in self.sources.values_mut() {
            clear(&mut source.metadata);
        }
        for tag in self.simple_tags.values_mut() {
            clear(&mut tag.metadata);
        }
        for tag in self.data_tags.values_mut() {
            clear(&mut tag.metadata);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRecord {
    pub entity: EntityRecord,
    pub repository: Option<String>,
    pub link: Option<EntityId>,
    pub properties: Vec<PropertyRecord>,
}

has_entity!(
    DataArrayRecord,
    SourceRecord,
    SimpleTagRecord,
    DataTagRecord,
    BlockRecord,
    SectionRecord,
);

/// Where an entity lives inside the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Block(EntityId),
    DataArray { block: EntityId, id: EntityId },
    Source { block: EntityId, id: EntityId },
    SimpleTag { block: EntityId, id: EntityId },
    DataTag { block: EntityId, id: EntityId },
    Feature { block: EntityId, tag: TagRef, id: EntityId },
    Section(EntityId),
    Property { section: EntityId, id: EntityId },
}

/// The tag owning a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagRef {
    Simple(EntityId),
    Data(EntityId),
}

impl TagRef {
    pub fn id(&self) -> EntityId {
        match *self {
            TagRef::Simple(id) | TagRef::Data(id) => id,
        }
    }

    pub fn location(&self, block: EntityId) -> Location {
        match *self {
            TagRef::Simple(id) => Location::SimpleTag { block, id },
            TagRef::Data(id) => Location::DataTag { block, id },
        }
    }
}

impl Location {
    pub fn id(&self) -> EntityId {
        match *self {
            Location::Block(id) | Location::Section(id) => id,
            Location::DataArray { id, .. }
            | Location::Source { id, .. }
            | Location::SimpleTag { id, .. }
            | Location::DataTag { id, .. }
            | Location::Feature { id, .. }
            | Location::Property { id, .. } => id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Location::Block(_) => EntityKind::Block,
            Location::DataArray { .. } => EntityKind::DataArray,
            Location::Source { .. } => EntityKind::Source,
            Location::SimpleTag { .. } => EntityKind::SimpleTag,
            Location::DataTag { .. } => EntityKind::DataTag,
            Location::Feature { .. } => EntityKind::Feature,
            Location::Section(_) => EntityKind::Section,
            Location::Property { .. } => EntityKind::Property,
        }
    }

    /// Owning block, for block-scoped entities
    pub fn block(&self) -> Option<EntityId> {
        match *self {
            Location::Block(id) => Some(id),
            Location::DataArray { block, .. }
            | Location::Source { block, .. }
            | Location::SimpleTag { block, .. }
            | Location::DataTag { block, .. }
            | Location::Feature { block, .. } => Some(block),
            Location::Section(_) | Location::Property { .. } => None,
        }
    }
}

/// The whole container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub created_at: i64,
    pub updated_at: i64,
    pub blocks: Registry<BlockRecord>,
    pub sections: Tree<SectionRecord>,
}

impl Default for Store {
    fn default() -> Self {
        let now = now();
        Self {
            created_at: now,
            updated_at: now,
            blocks: Registry::new(),
            sections: Tree::new(),
        }
    }
}

impl Store {
    pub fn block(&self, id: &EntityId) -> Result<&BlockRecord> {
        self.blocks
            .get(id)
            .ok_or_else(|| NixError::not_found("block", id))
    }

    pub fn block_mut(&mut self, id: &EntityId) -> Result<&mut BlockRecord> {
        self.blocks
            .get_mut(id)
            .ok_or_else(|| NixError::not_found("block", id))
    }

    pub fn data_array(&self, block: &EntityId, id: &EntityId) -> Result<&DataArrayRecord> {
        self.block(block)?
            .data_arrays
            .get(id)
            .ok_or_else(|| NixError::not_found("data array", id))
    }

    pub fn data_array_mut(
        &mut self,
        block: &EntityId,
        id: &EntityId,
    ) -> Result<&mut DataArrayRecord> {
        self.block_mut(block)?
            .data_arrays
            .get_mut(id)
            .ok_or_else(|| NixError::not_found("data array", id))
    }

    pub fn simple_tag(&self, block: &EntityId, id: &EntityId) -> Result<&SimpleTagRecord> {
        self.block(block)?
            .simple_tags
            .get(id)
            .ok_or_else(|| NixError::not_found("simple tag", id))
    }

    pub fn simple_tag_mut(
        &mut self,
        block: &EntityId,
        id: &EntityId,
    ) -> Result<&mut SimpleTagRecord> {
        self.block_mut(block)?
            .simple_tags
            .get_mut(id)
            .ok_or_else(|| NixError::not_found("simple tag", id))
    }

    pub fn data_tag(&self, block: &EntityId, id: &EntityId) -> Result<&DataTagRecord> {
        self.block(block)?
            .data_tags
            .get(id)
            .ok_or_else(|| NixError::not_found("data tag", id))
    }

    pub fn data_tag_mut(&mut self, block: &EntityId, id: &EntityId) -> Result<&mut DataTagRecord> {
        self.block_mut(block)?
            .data_tags
            .get_mut(id)
            .ok_or_else(|| NixError::not_found("data tag", id))
    }

    pub fn section(&self, id: &EntityId) -> Result<&SectionRecord> {
        self.sections
            .get(id)
            .ok_or_else(|| NixError::not_found("section", id))
    }

    pub fn section_mut(&mut self, id: &EntityId) -> Result<&mut SectionRecord> {
        self.sections
            .get_mut(id)
            .ok_or_else(|| NixError::not_found("section", id))
    }

    /// Features of the tag `tag` in `block`
    pub fn features(&self, block: &EntityId, tag: &TagRef) -> Result<&Vec<FeatureRecord>> {
        match tag {
            TagRef::Simple(id) => Ok(&self.simple_tag(block, id)?.features),
            TagRef::Data(id) => Ok(&self.data_tag(block, id)?.features),
        }
    }

    pub fn features_mut(
        &mut self,
        block: &EntityId,
        tag: &TagRef,
    ) -> Result<&mut Vec<FeatureRecord>> {
        match tag {
            TagRef::Simple(id) => Ok(&mut self.simple_tag_mut(block, id)?.features),
            TagRef::Data(id) => Ok(&mut self.data_tag_mut(block, id)?.features),
        }
    }

    /// The entity record behind a location
    pub fn entity(&self, loc: &Location) -> Result<&EntityRecord> {
        match loc {
            Location::Block(id) => Ok(&self.block(id)?.entity),
            Location::DataArray { block, id } => Ok(&self.data_array(block, id)?.entity),
            Location::Source { block, id } => self
                .block(block)?
                .sources
                .get(id)
                .map(|source| &source.entity)
                .ok_or_else(|| NixError::not_found("source", id)),
            Location::SimpleTag { block, id } => Ok(&self.simple_tag(block, id)?.entity),
            Location::DataTag { block, id } => Ok(&self.data_tag(block, id)?.entity),
            Location::Section(id) => Ok(&self.section(id)?.entity),
            Location::Feature { .. } | Location::Property { .. } => Err(NixError::Type(format!(
                "{} has no entity record",
                loc.kind()
            ))),
        }
    }

    pub fn entity_mut(&mut self, loc: &Location) -> Result<&mut EntityRecord> {
        match loc {
            Location::Block(id) => Ok(&mut self.block_mut(id)?.entity),
            Location::DataArray { block, id } => Ok(&mut self.data_array_mut(block, id)?.entity),
            Location::Source { block, id } => self
                .block_mut(block)?
                .sources
                .get_mut(id)
                .map(|source| &mut source.entity)
                .ok_or_else(|| NixError::not_found("source", id)),
            Location::SimpleTag { block, id } => Ok(&mut self.simple_tag_mut(block, id)?.entity),
            Location::DataTag { block, id } => Ok(&mut self.data_tag_mut(block, id)?.entity),
            Location::Section(id) => Ok(&mut self.section_mut(id)?.entity),
            Location::Feature { .. } | Location::Property { .. } => Err(NixError::Type(format!(
                "{} has no entity record",
                loc.kind()
            ))),
        }
    }

    /// Fail if renaming `loc` to `name` would clash within its collection
    pub fn check_rename(&self, loc: &Location, name: &str) -> Result<()> {
        match loc {
            Location::Block(id) => self.blocks.check_rename(id, name),
            Location::DataArray { block, id } => {
                self.block(block)?.data_arrays.check_rename(id, name)
            }
            Location::Source { block, id } => self.block(block)?.sources.check_rename(id, name),
            Location::SimpleTag { block, id } => {
                self.block(block)?.simple_tags.check_rename(id, name)
            }
            Location::DataTag { block, id } => self.block(block)?.data_tags.check_rename(id, name),
            Location::Section(id) => self.sections.check_rename(id, name),
            Location::Feature { .. } | Location::Property { .. } => Ok(()),
        }
    }

    /// The metadata link slot of an entity that supports one
    pub fn metadata_slot(&self, loc: &Location) -> Result<Option<EntityId>> {
        Ok(match loc {
            Location::Block(id) => self.block(id)?.metadata,
            Location::DataArray { block, id } => self.data_array(block, id)?.metadata,
            Location::Source { block, id } => {
                self.block(block)?
                    .sources
                    .get(id)
                    .ok_or_else(|| NixError::not_found("source", id))?
                    .metadata
            }
            Location::SimpleTag { block, id } => self.simple_tag(block, id)?.metadata,
            Location::DataTag { block, id } => self.data_tag(block, id)?.metadata,
            _ => {
                return Err(NixError::Type(format!(
                    "{} cannot carry metadata",
                    loc.kind()
                )))
            }
        })
    }

    pub fn metadata_slot_mut(&mut self, loc: &Location) -> Result<&mut Option<EntityId>> {
        match loc {
            Location::Block(id) => Ok(&mut self.block_mut(id)?.metadata),
            Location::DataArray { block, id } => Ok(&mut self.data_array_mut(block, id)?.metadata),
            Location::Source { block, id } => self
                .block_mut(block)?
                .sources
                .get_mut(id)
                .map(|source| &mut source.metadata)
                .ok_or_else(|| NixError::not_found("source", id)),
            Location::SimpleTag { block, id } => Ok(&mut self.simple_tag_mut(block, id)?.metadata),
            Location::DataTag { block, id } => Ok(&mut self.data_tag_mut(block, id)?.metadata),
            _ => Err(NixError::Type(format!(
                "{} cannot carry metadata",
                loc.kind()
            ))),
        }
    }

    /// Remove Sections (with their subtrees) and every link to them
    pub fn delete_section(&mut self, id: &EntityId) -> Vec<EntityId> {
        let removed = self.sections.remove(id);
        for block in self.blocks.values_mut() {
            block.purge_sections(&removed);
        }
        for section in self.sections.values_mut() {
            if section.link.map(|l| removed.contains(&l)).unwrap_or(false) {
                section.link = None;
            }
        }
        removed
    }

    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

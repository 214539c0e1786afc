//! Metadata tree: Sections holding typed Properties.
//!
//! Sections form a tree rooted in the file. Every Property fixes one
//! [`ValueType`] at creation and all of its [`Value`]s must share it.

use crate::entity::{check_non_empty, now, EntityRecord};
use crate::error::{NixError, Result};
use crate::handle::{handle_impls, EntityHandle, FileCore, NamedEntity};
use crate::registry::{exists, resolve_index};
use crate::store::{Location, SectionRecord, Store};
use crate::types::{EntityId, Key};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Type shared by all values of a Property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int64,
    UInt64,
    Double,
    String,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A single typed scalar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
}

impl Scalar {
    /// Type tag of the stored variant
    pub fn value_type(&self) -> ValueType {
        match self {
            Scalar::Bool(_) => ValueType::Bool,
            Scalar::Int64(_) => ValueType::Int64,
            Scalar::UInt64(_) => ValueType::UInt64,
            Scalar::Double(_) => ValueType::Double,
            Scalar::String(_) => ValueType::String,
        }
    }

    /// Typed accessors, `None` when the variant differs
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Scalar::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int64(v) => write!(f, "{}", v),
            Scalar::UInt64(v) => write!(f, "{}", v),
            Scalar::Double(v) => write!(f, "{}", v),
            Scalar::String(v) => write!(f, "{:?}", v),
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident as $target:ty),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(v: $ty) -> Self {
                    Scalar::$variant(v as $target)
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::new(v)
                }
            }
        )*
    };
}

scalar_from!(
    i64 => Int64 as i64,
    i32 => Int64 as i64,
    u64 => UInt64 as u64,
    u32 => UInt64 as u64,
    f64 => Double as f64,
    f32 => Double as f64,
);

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::String(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::new(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::new(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::new(v)
    }
}

/// A Property value with its annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub data: Scalar,
    pub uncertainty: f64,
    pub reference: Option<String>,
    pub filename: Option<String>,
    pub encoder: Option<String>,
    pub checksum: Option<String>,
}

impl Value {
    /// Wrap a scalar with no uncertainty or provenance
    pub fn new(data: impl Into<Scalar>) -> Self {
        Self {
            data: data.into(),
            uncertainty: 0.0,
            reference: None,
            filename: None,
            encoder: None,
            checksum: None,
        }
    }

    /// Attach a measurement uncertainty
    pub fn with_uncertainty(mut self, uncertainty: f64) -> Self {
        self.uncertainty = uncertainty;
        self
    }

    /// Attach a reference string
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Attach the name of the file the value came from
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Attach the encoder used to produce the value
    pub fn with_encoder(mut self, encoder: impl Into<String>) -> Self {
        self.encoder = Some(encoder.into());
        self
    }

    /// Attach a checksum of the source data
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Type tag of the wrapped scalar
    pub fn value_type(&self) -> ValueType {
        self.data.value_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub id: EntityId,
    pub name: String,
    pub definition: Option<String>,
    pub unit: Option<String>,
    pub data_type: ValueType,
    pub values: Vec<Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PropertyRecord {
    /// Empty property record of a fixed value type
    pub fn new(name: &str, data_type: ValueType) -> Result<Self> {
        check_non_empty("name", name)?;
        let now = now();
        Ok(Self {
            id: EntityId::generate(),
            name: name.to_string(),
            definition: None,
            unit: None,
            data_type,
            values: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fail unless every value has the property's type
    pub fn check_values(&self, values: &[Value]) -> Result<()> {
        match values.iter().find(|v| v.value_type() != self.data_type) {
            Some(bad) => Err(NixError::validation(format!(
                "property '{}' holds {} values, got {}",
                self.name,
                self.data_type,
                bad.value_type()
            ))),
            None => Ok(()),
        }
    }

    fn touch(&mut self) {
        self.updated_at = now();
    }
}

fn resolve_property<'a>(section: &'a SectionRecord, key: &Key) -> Result<&'a PropertyRecord> {
    match key {
        Key::Index(index) => {
            let position = resolve_index(*index, section.properties.len())?;
            Ok(&section.properties[position])
        }
        _ => section
            .properties
            .iter()
            .find(|p| key.matches(&p.id, Some(&p.name)))
            .ok_or_else(|| NixError::not_found("property", format!("{:?}", key))),
    }
}

fn property_mut<'a>(
    store: &'a mut Store,
    section: &EntityId,
    id: &EntityId,
) -> Result<&'a mut PropertyRecord> {
    store
        .section_mut(section)?
        .properties
        .iter_mut()
        .find(|p| p.id == *id)
        .ok_or_else(|| NixError::not_found("property", id))
}

fn property<'a>(store: &'a Store, section: &EntityId, id: &EntityId) -> Result<&'a PropertyRecord> {
    store
        .section(section)?
        .properties
        .iter()
        .find(|p| p.id == *id)
        .ok_or_else(|| NixError::not_found("property", id))
}

/// Create a section below `parent` (or at the top level of the file)
pub(crate) fn create_section(
    core: &Arc<FileCore>,
    parent: Option<EntityId>,
    name: &str,
    type_name: &str,
) -> Result<Section> {
    let record = SectionRecord {
        entity: EntityRecord::new(name, type_name)?,
        repository: None,
        link: None,
        properties: Vec::new(),
    };
    let id = core.write(|store| store.sections.insert(parent.as_ref(), record))?;
    debug!(section = %id, name, "created section");
    Ok(Section::from_parts(Arc::clone(core), Location::Section(id)))
}

/// Direct children of `parent`, or the root sections when `parent` is `None`
pub(crate) fn child_sections(
    core: &Arc<FileCore>,
    parent: Option<EntityId>,
) -> Result<Vec<Section>> {
    let ids = core.read(|store| Ok(store.sections.children(parent.as_ref())?.to_vec()))?;
    Ok(ids
        .into_iter()
        .map(|id| Section::from_parts(Arc::clone(core), Location::Section(id)))
        .collect())
}

/// Resolve `key` among the children of `parent`
pub(crate) fn get_section(
    core: &Arc<FileCore>,
    parent: Option<EntityId>,
    key: &Key,
) -> Result<Section> {
    let id = core.read(|store| store.sections.resolve_child(parent.as_ref(), key))?;
    Ok(Section::from_parts(Arc::clone(core), Location::Section(id)))
}

/// Delete a child section with its subtree and drop every link to it
pub(crate) fn delete_section(
    core: &Arc<FileCore>,
    parent: Option<EntityId>,
    key: &Key,
) -> Result<()> {
    let removed = core.write(|store| {
        let id = store.sections.resolve_child(parent.as_ref(), key)?;
        Ok(store.delete_section(&id))
    })?;
    debug!(count = removed.len(), "deleted sections");
    Ok(())
}

/// Depth-limited breadth-first search; the start level is depth 0
pub(crate) fn find_sections(
    core: &Arc<FileCore>,
    start: Option<EntityId>,
    max_depth: usize,
) -> Result<Vec<Section>> {
    let ids = core.read(|store| Ok(store.sections.descendants(start.as_ref(), max_depth)))?;
    Ok(ids
        .into_iter()
        .map(|id| Section::from_parts(Arc::clone(core), Location::Section(id)))
        .collect())
}

/// A node of the metadata tree
#[derive(Clone)]
pub struct Section {
    core: Arc<FileCore>,
    location: Location,
}

handle_impls!(Section);

impl EntityHandle for Section {}

impl NamedEntity for Section {}

impl Section {
    fn with<R>(&self, f: impl FnOnce(&SectionRecord) -> Result<R>) -> Result<R> {
        let id = self.location.id();
        self.core.read(|store| f(store.section(&id)?))
    }

    fn update(&self, f: impl FnOnce(&mut SectionRecord) -> Result<()>) -> Result<()> {
        let id = self.location.id();
        self.core.write(|store| {
            let record = store.section_mut(&id)?;
            f(record)?;
            record.entity.touch();
            Ok(())
        })
    }

    /// URL or path of the terminology this section follows
    pub fn repository(&self) -> Result<Option<String>> {
        self.with(|record| Ok(record.repository.clone()))
    }

    /// Set or clear the repository
    pub fn set_repository(&self, repository: Option<&str>) -> Result<()> {
        self.update(|record| {
            record.repository = repository.map(str::to_string);
            Ok(())
        })
    }

    /// Section this one links to, if it still exists
    pub fn link(&self) -> Result<Option<Section>> {
        let id = self.location.id();
        let link = self.core.read(|store| {
            Ok(store
                .section(&id)?
                .link
                .filter(|other| store.sections.contains(other)))
        })?;
        Ok(link.map(|other| Section::from_parts(Arc::clone(&self.core), Location::Section(other))))
    }

    /// Link to another section of the same container, or clear the link
    pub fn set_link(&self, link: Option<&Section>) -> Result<()> {
        let target = match link {
            Some(other) => {
                if !Arc::ptr_eq(&self.core, &other.core) {
                    return Err(NixError::validation("section belongs to a different container"));
                }
                if other.location == self.location {
                    return Err(NixError::validation("a section cannot link to itself"));
                }
                Some(other.location.id())
            }
            None => None,
        };
        let id = self.location.id();
        self.core.write(|store| {
            if let Some(other) = &target {
                store.section(other)?;
            }
            let record = store.section_mut(&id)?;
            record.link = target;
            record.entity.touch();
            Ok(())
        })
    }

    /// Enclosing section, `None` for a root section
    pub fn parent(&self) -> Result<Option<Section>> {
        let id = self.location.id();
        let parent = self.core.read(|store| {
            store.section(&id)?;
            Ok(store.sections.parent_of(&id))
        })?;
        Ok(parent.map(|p| Section::from_parts(Arc::clone(&self.core), Location::Section(p))))
    }

    /// Create a child section
    pub fn create_section(&self, name: &str, type_name: &str) -> Result<Section> {
        create_section(&self.core, Some(self.location.id()), name, type_name)
    }

    /// Child sections in insertion order
    pub fn sections(&self) -> Result<Vec<Section>> {
        child_sections(&self.core, Some(self.location.id()))
    }

    /// Child section by index, id or name
    pub fn get_section(&self, key: impl Into<Key>) -> Result<Section> {
        get_section(&self.core, Some(self.location.id()), &key.into())
    }

    /// Whether a child section matches `key`
    pub fn has_section(&self, key: impl Into<Key>) -> Result<bool> {
        exists(self.get_section(key))
    }

    /// Delete a child section and its subtree
    pub fn delete_section(&self, key: impl Into<Key>) -> Result<()> {
        delete_section(&self.core, Some(self.location.id()), &key.into())
    }

    /// This section and its descendants down to `max_depth` levels
    pub fn find_sections(&self, max_depth: usize) -> Result<Vec<Section>> {
        find_sections(&self.core, Some(self.location.id()), max_depth)
    }

    /// Create an empty property holding values of `data_type`
    pub fn create_property(&self, name: &str, data_type: ValueType) -> Result<Property> {
        self.insert_property(PropertyRecord::new(name, data_type)?)
    }

    /// Create a property from a non-empty list of values of one type
    pub fn create_property_with_values(&self, name: &str, values: &[Value]) -> Result<Property> {
        let first = values
            .first()
            .ok_or_else(|| {
                NixError::validation("a property needs at least one value to infer its type")
            })?;
        let mut record = PropertyRecord::new(name, first.value_type())?;
        record.check_values(values)?;
        record.values = values.to_vec();
        self.insert_property(record)
    }

    fn insert_property(&self, record: PropertyRecord) -> Result<Property> {
        let section = self.location.id();
        let id = record.id;
        let name = record.name.clone();
        self.update(|section| {
            if section.properties.iter().any(|p| p.name == record.name) {
                return Err(NixError::validation(format!(
                    "name '{}' is already in use",
                    record.name
                )));
            }
            section.properties.push(record);
            Ok(())
        })?;
        debug!(section = %section, property = %name, "created property");
        Ok(Property::from_parts(
            Arc::clone(&self.core),
            Location::Property { section, id },
        ))
    }

    fn property_handle(&self, id: EntityId) -> Property {
        Property::from_parts(
            Arc::clone(&self.core),
            Location::Property {
                section: self.location.id(),
                id,
            },
        )
    }

    /// Properties in insertion order
    pub fn properties(&self) -> Result<Vec<Property>> {
        let ids = self.with(|record| {
            Ok(record.properties.iter().map(|p| p.id).collect::<Vec<_>>())
        })?;
        Ok(ids.into_iter().map(|id| self.property_handle(id)).collect())
    }

    /// Number of properties
    pub fn property_count(&self) -> Result<usize> {
        self.with(|record| Ok(record.properties.len()))
    }

    /// Property by index, id or name
    pub fn get_property(&self, key: impl Into<Key>) -> Result<Property> {
        let key = key.into();
        let id = self.with(|record| Ok(resolve_property(record, &key)?.id))?;
        Ok(self.property_handle(id))
    }

    /// Whether a property matches `key`
    pub fn has_property(&self, key: impl Into<Key>) -> Result<bool> {
        exists(self.get_property(key))
    }

    /// Delete a property
    pub fn delete_property(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        self.update(|record| {
            let id = resolve_property(record, &key)?.id;
            record.properties.retain(|p| p.id != id);
            Ok(())
        })
    }

    /// Own properties followed by those of the linked sections that are not
    /// shadowed by name
    pub fn inherited_properties(&self) -> Result<Vec<Property>> {
        let start = self.location.id();
        let found = self.core.read(|store| {
            let mut seen_sections = HashSet::new();
            let mut seen_names = HashSet::new();
            let mut out = Vec::new();
            let mut current = Some(start);
            while let Some(id) = current {
                if !seen_sections.insert(id) {
                    break;
                }
                let Some(record) = store.sections.get(&id) else {
                    break;
                };
                for property in &record.properties {
                    if seen_names.insert(property.name.clone()) {
                        out.push((id, property.id));
                    }
                }
                current = record.link;
            }
            store.section(&start)?;
            Ok(out)
        })?;
        Ok(found
            .into_iter()
            .map(|(section, id)| {
                Property::from_parts(Arc::clone(&self.core), Location::Property { section, id })
            })
            .collect())
    }

    /// Find a property by name here or in the nearest ancestor that has it
    pub fn lookup_property(&self, name: &str) -> Result<Option<Property>> {
        let start = self.location.id();
        let found = self.core.read(|store| {
            store.section(&start)?;
            let chain = std::iter::once(start).chain(store.sections.ancestors(&start));
            for id in chain {
                if let Some(property) = store
                    .sections
                    .get(&id)
                    .and_then(|record| record.properties.iter().find(|p| p.name == name))
                {
                    return Ok(Some((id, property.id)));
                }
            }
            Ok(None)
        })?;
        Ok(found.map(|(section, id)| {
            Property::from_parts(Arc::clone(&self.core), Location::Property { section, id })
        }))
    }
}

/// A named, typed list of values within a Section
#[derive(Clone)]
pub struct Property {
    core: Arc<FileCore>,
    location: Location,
}

handle_impls!(Property);

impl EntityHandle for Property {}

impl Property {
    fn keys(&self) -> (EntityId, EntityId) {
        match self.location {
            Location::Property { section, id } => (section, id),
            other => (other.id(), other.id()),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&PropertyRecord) -> Result<R>) -> Result<R> {
        let (section, id) = self.keys();
        self.core.read(|store| f(property(store, &section, &id)?))
    }

    fn update(&self, f: impl FnOnce(&mut PropertyRecord) -> Result<()>) -> Result<()> {
        let (section, id) = self.keys();
        self.core.write(|store| {
            let record = property_mut(store, &section, &id)?;
            f(record)?;
            record.touch();
            Ok(())
        })
    }

    /// Owning section
    pub fn section(&self) -> Section {
        let (section, _) = self.keys();
        Section::from_parts(Arc::clone(&self.core), Location::Section(section))
    }

    /// Property name
    pub fn name(&self) -> Result<String> {
        self.with(|record| Ok(record.name.clone()))
    }

    /// Rename the property, unique within its section
    pub fn set_name(&self, name: &str) -> Result<()> {
        check_non_empty("name", name)?;
        let (section, id) = self.keys();
        self.core.write(|store| {
            let owner = store.section_mut(&section)?;
            if owner.properties.iter().any(|p| p.name == name && p.id != id) {
                return Err(NixError::validation(format!("name '{}' is already in use", name)));
            }
            let record = owner
                .properties
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| NixError::not_found("property", id))?;
            record.name = name.to_string();
            record.touch();
            Ok(())
        })
    }

    /// Free text definition
    pub fn definition(&self) -> Result<Option<String>> {
        self.with(|record| Ok(record.definition.clone()))
    }

    /// Set or clear the definition
    pub fn set_definition(&self, definition: Option<&str>) -> Result<()> {
        self.update(|record| {
            record.definition = definition.map(str::to_string);
            Ok(())
        })
    }

    /// Unit shared by every value
    pub fn unit(&self) -> Result<Option<String>> {
        self.with(|record| Ok(record.unit.clone()))
    }

    /// Set or clear the unit
    pub fn set_unit(&self, unit: Option<&str>) -> Result<()> {
        self.update(|record| {
            record.unit = unit.map(str::to_string);
            Ok(())
        })
    }

    /// Value type fixed at creation
    pub fn data_type(&self) -> Result<ValueType> {
        self.with(|record| Ok(record.data_type))
    }

    /// Copy of the values in order
    pub fn values(&self) -> Result<Vec<Value>> {
        self.with(|record| Ok(record.values.clone()))
    }

    /// Number of values
    pub fn value_count(&self) -> Result<usize> {
        self.with(|record| Ok(record.values.len()))
    }

    /// Replace all values; each must match the property's type
    pub fn set_values(&self, values: &[Value]) -> Result<()> {
        self.update(|record| {
            record.check_values(values)?;
            record.values = values.to_vec();
            Ok(())
        })
    }

    /// Append a value of the property's type
    pub fn append_value(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.update(|record| {
            record.check_values(std::slice::from_ref(&value))?;
            record.values.push(value);
            Ok(())
        })
    }

    /// Drop every value, keeping the type
    pub fn delete_values(&self) -> Result<()> {
        self.update(|record| {
            record.values.clear();
            Ok(())
        })
    }

    /// Creation time in seconds since the epoch
    pub fn created_at(&self) -> Result<i64> {
        self.with(|record| Ok(record.created_at))
    }

    /// Last modification time in seconds since the epoch
    pub fn updated_at(&self) -> Result<i64> {
        self.with(|record| Ok(record.updated_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(Scalar::from(3i32), Scalar::Int64(3));
        assert_eq!(Scalar::from(3u32), Scalar::UInt64(3));
        assert_eq!(Scalar::from(1.5f32), Scalar::Double(1.5));
        assert_eq!(Scalar::from("mV").as_str(), Some("mV"));
        assert_eq!(Value::from(true).value_type(), ValueType::Bool);
    }

    #[test]
    fn test_value_annotations() {
        let value = Value::new(2.5)
            .with_uncertainty(0.1)
            .with_reference("ref")
            .with_filename("calib.txt")
            .with_encoder("utf-8")
            .with_checksum("abc");
        assert_eq!(value.data.as_f64(), Some(2.5));
        assert_eq!(value.uncertainty, 0.1);
        assert_eq!(value.filename.as_deref(), Some("calib.txt"));
    }

    #[test]
    fn test_property_record_type_check() {
        let record = PropertyRecord::new("gain", ValueType::Double).unwrap();
        assert!(record.check_values(&[Value::new(1.0), Value::new(2.0)]).is_ok());
        let err = record
            .check_values(&[Value::new(1.0), Value::new("high")])
            .unwrap_err();
        assert!(matches!(err, NixError::Validation(_)));
        assert!(PropertyRecord::new("", ValueType::Bool).is_err());
    }
}

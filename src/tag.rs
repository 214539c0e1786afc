//! SimpleTags and the region selection shared with DataTags.
//!
//! A tag selects a region of each referenced DataArray. Positions and
//! extents are coordinates along the array's dimensions and are mapped to
//! indices through them: sampled and range axes by coordinate, set axes by
//! index. Tag units, when given, must equal the dimension units as text.

use crate::data_array::DataArray;
use crate::error::{NixError, Result};
use crate::feature::{Feature, Features};
use crate::handle::{handle_impls, EntityHandle, EntityWithMetadata, FileCore, NamedEntity};
use crate::layout::Region;
use crate::links::{LinkField, LinkList};
use crate::payload::Payload;
use crate::source::Source;
use crate::store::{DataArrayRecord, FeatureRecord, Location, SimpleTagRecord, Store, TagRef};
use crate::types::{Element, EntityId, Key, LinkType};
use ndarray::{ArrayD, IxDyn};
use std::sync::Arc;

fn payload_of(array: &DataArrayRecord) -> Result<&Payload> {
    array.data.as_ref().ok_or_else(|| {
        NixError::validation(format!("data array '{}' has no data", array.entity.name))
    })
}

/// Region of `array` selected by a position and optional extent
pub(crate) fn tagged_region(
    array: &DataArrayRecord,
    position: &[f64],
    extent: &[f64],
    units: &[String],
) -> Result<Region> {
    let payload = payload_of(array)?;
    let rank = payload.extent().len();
    if array.dimensions.len() != rank {
        return Err(NixError::validation(format!(
            "data array '{}' describes {} of {} dimensions",
            array.entity.name,
            array.dimensions.len(),
            rank
        )));
    }
    if position.len() != rank {
        return Err(NixError::validation(format!(
            "position has {} entries, data array '{}' has rank {}",
            position.len(),
            array.entity.name,
            rank
        )));
    }
    if !extent.is_empty() && extent.len() != rank {
        return Err(NixError::validation(format!(
            "extent has {} entries, data array '{}' has rank {}",
            extent.len(),
            array.entity.name,
            rank
        )));
    }
    if !units.is_empty() && units.len() != rank {
        return Err(NixError::validation(format!(
            "{} units given for rank {}",
            units.len(),
            rank
        )));
    }

    let mut offset = Vec::with_capacity(rank);
    let mut count = Vec::with_capacity(rank);
    for (axis, dimension) in array.dimensions.iter().enumerate() {
        if let (Some(tag_unit), Some(dim_unit)) = (units.get(axis), dimension.unit()) {
            if !tag_unit.is_empty() && tag_unit != dim_unit {
                return Err(NixError::validation(format!(
                    "unit '{}' does not match dimension unit '{}'",
                    tag_unit, dim_unit
                )));
            }
        }
        let start = dimension.index_of(position[axis])?;
        let span = match extent.get(axis) {
            Some(&ext) => dimension
                .index_of(position[axis] + ext)?
                .saturating_sub(start)
                .max(1),
            None => 1,
        };
        offset.push(start);
        count.push(span);
    }

    let region = Region::new(offset, count);
    region.validate(payload.extent())?;
    Ok(region)
}

/// Read `region` of an array into an ndarray of the region's shape
pub(crate) fn read_region<T: Element>(
    array: &DataArrayRecord,
    region: &Region,
) -> Result<ArrayD<T>> {
    let values = payload_of(array)?.read_region::<T>(region)?;
    ArrayD::from_shape_vec(IxDyn(&region.count), values)
        .map_err(|e| NixError::validation(e.to_string()))
}

/// Data of a feature for the point `index` selected by `position`/`extent`
pub(crate) fn feature_data<T: Element>(
    store: &Store,
    block: &EntityId,
    feature: &FeatureRecord,
    position: &[f64],
    extent: &[f64],
    units: &[String],
    index: Option<usize>,
) -> Result<ArrayD<T>> {
    let array = store.data_array(block, &feature.data)?;
    let whole = Region::full(payload_of(array)?.extent());
    let region = match (feature.link_type, index) {
        (LinkType::Tagged, _) => tagged_region(array, position, extent, units)?,
        (LinkType::Untagged, _) | (LinkType::Indexed, None) => whole,
        (LinkType::Indexed, Some(index)) => {
            let shape = &whole.count;
            let rows = *shape.first().ok_or_else(|| {
                NixError::validation("indexed feature data must have at least one dimension")
            })?;
            if index >= rows {
                return Err(NixError::OutOfBounds {
                    index: index as i64,
                    len: rows,
                });
            }
            let mut offset = vec![0; shape.len()];
            let mut count = shape.clone();
            offset[0] = index;
            count[0] = 1;
            Region::new(offset, count)
        }
    };
    read_region(array, &region)
}

fn check_extent_arity(position: &[f64], extent: &[f64]) -> Result<()> {
    if !position.is_empty() && !extent.is_empty() && position.len() != extent.len() {
        return Err(NixError::validation(format!(
            "extent has {} entries but position has {}",
            extent.len(),
            position.len()
        )));
    }
    Ok(())
}

/// Tags a single region of its referenced DataArrays
#[derive(Clone)]
pub struct SimpleTag {
    core: Arc<FileCore>,
    location: Location,
}

handle_impls!(SimpleTag);

impl EntityHandle for SimpleTag {}

impl NamedEntity for SimpleTag {}

impl EntityWithMetadata for SimpleTag {}

impl SimpleTag {
    fn keys(&self) -> (EntityId, EntityId) {
        (
            self.location.block().unwrap_or_else(|| self.location.id()),
            self.location.id(),
        )
    }

    fn with<R>(&self, f: impl FnOnce(&SimpleTagRecord) -> Result<R>) -> Result<R> {
        let (block, id) = self.keys();
        self.core.read(|store| f(store.simple_tag(&block, &id)?))
    }

    fn update(&self, f: impl FnOnce(&mut SimpleTagRecord) -> Result<()>) -> Result<()> {
        let (block, id) = self.keys();
        self.core.write(|store| {
            let record = store.simple_tag_mut(&block, &id)?;
            f(record)?;
            record.entity.touch();
            Ok(())
        })
    }

    pub fn position(&self) -> Result<Vec<f64>> {
        self.with(|record| Ok(record.position.clone()))
    }

    pub fn set_position(&self, position: &[f64]) -> Result<()> {
        self.update(|record| {
            check_extent_arity(position, &record.extent)?;
            record.position = position.to_vec();
            Ok(())
        })
    }

    pub fn extent(&self) -> Result<Vec<f64>> {
        self.with(|record| Ok(record.extent.clone()))
    }

    /// Set the extent; empty, or as many entries as the position
    pub fn set_extent(&self, extent: &[f64]) -> Result<()> {
        self.update(|record| {
            check_extent_arity(&record.position, extent)?;
            record.extent = extent.to_vec();
            Ok(())
        })
    }

    pub fn units(&self) -> Result<Vec<String>> {
        self.with(|record| Ok(record.units.clone()))
    }

    pub fn set_units<S: AsRef<str>>(&self, units: &[S]) -> Result<()> {
        let units: Vec<String> = units.iter().map(|u| u.as_ref().to_string()).collect();
        self.update(|record| {
            record.units = units;
            Ok(())
        })
    }

    /// Tagged DataArrays, in insertion order; duplicates are allowed
    pub fn references(&self) -> LinkList<DataArray> {
        LinkList::new(Arc::clone(&self.core), self.location, LinkField::References)
    }

    pub fn sources(&self) -> LinkList<Source> {
        LinkList::new(Arc::clone(&self.core), self.location, LinkField::Sources)
    }

    pub fn features(&self) -> Features {
        let (block, id) = self.keys();
        Features::new(Arc::clone(&self.core), block, TagRef::Simple(id))
    }

    /// Link a DataArray of this block as a feature
    pub fn create_feature(&self, data: &dyn EntityHandle, link_type: LinkType) -> Result<Feature> {
        self.features().create(data, link_type)
    }

    pub fn delete_feature(&self, key: impl Into<Key>) -> Result<()> {
        self.features().delete(key)
    }

    /// The tagged region of a referenced DataArray
    pub fn retrieve_data<T: Element>(&self, reference: impl Into<Key>) -> Result<ArrayD<T>> {
        let (block, id) = self.keys();
        let reference = self.references().get(reference)?.id();
        self.core.read(|store| {
            let tag = store.simple_tag(&block, &id)?;
            let array = store.data_array(&block, &reference)?;
            let region = tagged_region(array, &tag.position, &tag.extent, &tag.units)?;
            read_region(array, &region)
        })
    }

    /// Data of a feature: the tagged region for Tagged links, all data
    /// otherwise
    pub fn retrieve_feature_data<T: Element>(&self, feature: impl Into<Key>) -> Result<ArrayD<T>> {
        let (block, id) = self.keys();
        let feature_id = self.features().get(feature)?.id();
        self.core.read(|store| {
            let tag = store.simple_tag(&block, &id)?;
            let record = tag
                .features
                .iter()
                .find(|f| f.id == feature_id)
                .ok_or_else(|| NixError::not_found("feature", feature_id))?;
            feature_data(store, &block, record, &tag.position, &tag.extent, &tag.units, None)
        })
    }
}

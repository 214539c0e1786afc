//! DataTags: many regions at once, with positions and extents held in
//! DataArrays (one row per point).

use crate::data_array::DataArray;
use crate::error::{NixError, Result};
use crate::feature::{check_data_array, Feature, Features};
use crate::handle::{handle_impls, EntityHandle, EntityWithMetadata, FileCore, NamedEntity};
use crate::links::{LinkField, LinkList};
use crate::source::Source;
use crate::store::{DataTagRecord, Location, Store, TagRef};
use crate::tag::{feature_data, read_region, tagged_region};
use crate::types::{Element, EntityId, Key, LinkType};
use ndarray::ArrayD;
use std::sync::Arc;

/// Row `index` of a positions or extents array. A rank-1 array holds one
/// coordinate per point; a rank-2 array holds one row of coordinates per point.
fn point_row(store: &Store, block: &EntityId, array: &EntityId, index: usize) -> Result<Vec<f64>> {
    let record = store.data_array(block, array)?;
    let payload = record.data.as_ref().ok_or_else(|| {
        NixError::validation(format!("data array '{}' has no data", record.entity.name))
    })?;
    let extent = payload.extent();
    let (rows, width) = match extent {
        [rows] => (*rows, 1),
        [rows, width] => (*rows, *width),
        _ => {
            return Err(NixError::validation(format!(
                "positions and extents must have rank 1 or 2, got {:?}",
                extent
            )))
        }
    };
    if index >= rows {
        return Err(NixError::OutOfBounds {
            index: index as i64,
            len: rows,
        });
    }
    let values = payload.read_all::<f64>()?;
    Ok(values[index * width..(index + 1) * width].to_vec())
}

/// Tags many regions of its referenced DataArrays
#[derive(Clone)]
pub struct DataTag {
    core: Arc<FileCore>,
    location: Location,
}

handle_impls!(DataTag);

impl EntityHandle for DataTag {}

impl NamedEntity for DataTag {}

impl EntityWithMetadata for DataTag {}

impl DataTag {
    fn keys(&self) -> (EntityId, EntityId) {
        (
            self.location.block().unwrap_or_else(|| self.location.id()),
            self.location.id(),
        )
    }

    fn with<R>(&self, f: impl FnOnce(&DataTagRecord) -> Result<R>) -> Result<R> {
        let (block, id) = self.keys();
        self.core.read(|store| f(store.data_tag(&block, &id)?))
    }

    fn update(&self, f: impl FnOnce(&mut DataTagRecord) -> Result<()>) -> Result<()> {
        let (block, id) = self.keys();
        self.core.write(|store| {
            let record = store.data_tag_mut(&block, &id)?;
            f(record)?;
            record.entity.touch();
            Ok(())
        })
    }

    fn array(&self, id: EntityId) -> DataArray {
        let (block, _) = self.keys();
        DataArray::from_parts(Arc::clone(&self.core), Location::DataArray { block, id })
    }

    /// Positions array; `None` once it was deleted
    pub fn positions(&self) -> Result<Option<DataArray>> {
        Ok(self.with(|record| Ok(record.positions))?.map(|id| self.array(id)))
    }

    pub fn set_positions(&self, positions: &dyn EntityHandle) -> Result<()> {
        let (block, _) = self.keys();
        let id = check_data_array(&self.core, &block, positions)?;
        self.core.write(|store| {
            store.data_array(&block, &id)?;
            let record = store.data_tag_mut(&block, &self.location.id())?;
            record.positions = Some(id);
            record.entity.touch();
            Ok(())
        })
    }

    pub fn extents(&self) -> Result<Option<DataArray>> {
        Ok(self.with(|record| Ok(record.extents))?.map(|id| self.array(id)))
    }

    /// Set or clear the extents array; its shape must match the positions
    pub fn set_extents(&self, extents: Option<&dyn EntityHandle>) -> Result<()> {
        let (block, tag) = self.keys();
        let id = match extents {
            Some(entity) => Some(check_data_array(&self.core, &block, entity)?),
            None => None,
        };
        self.core.write(|store| {
            if let Some(id) = &id {
                let extent_shape = store
                    .data_array(&block, id)?
                    .data
                    .as_ref()
                    .map(|p| p.extent().to_vec());
                let positions = store.data_tag(&block, &tag)?.positions;
                let position_shape = match positions {
                    Some(p) => store
                        .data_array(&block, &p)?
                        .data
                        .as_ref()
                        .map(|p| p.extent().to_vec()),
                    None => None,
                };
                if let (Some(e), Some(p)) = (&extent_shape, &position_shape) {
                    if e != p {
                        return Err(NixError::validation(format!(
                            "extents of shape {:?} do not match positions of shape {:?}",
                            e, p
                        )));
                    }
                }
            }
            let record = store.data_tag_mut(&block, &tag)?;
            record.extents = id;
            record.entity.touch();
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

    /// Number of tagged points
    pub fn position_count(&self) -> Result<usize> {
        let (block, tag) = self.keys();
        self.core.read(|store| {
            let Some(positions) = store.data_tag(&block, &tag)?.positions else {
                return Ok(0);
            };
            Ok(store
                .data_array(&block, &positions)?
                .data
                .as_ref()
                .and_then(|p| p.extent().first().copied())
                .unwrap_or(0))
        })
    }

    pub fn references(&self) -> LinkList<DataArray> {
        LinkList::new(Arc::clone(&self.core), self.location, LinkField::References)
    }

    pub fn sources(&self) -> LinkList<Source> {
        LinkList::new(Arc::clone(&self.core), self.location, LinkField::Sources)
    }

    pub fn features(&self) -> Features {
        let (block, id) = self.keys();
        Features::new(Arc::clone(&self.core), block, TagRef::Data(id))
    }

    pub fn create_feature(&self, data: &dyn EntityHandle, link_type: LinkType) -> Result<Feature> {
        self.features().create(data, link_type)
    }

    pub fn delete_feature(&self, key: impl Into<Key>) -> Result<()> {
        self.features().delete(key)
    }

    fn point(
        &self,
        store: &Store,
        record: &DataTagRecord,
        index: usize,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let (block, _) = self.keys();
        let positions = record.positions.ok_or_else(|| {
            NixError::validation(format!("data tag '{}' has no positions", record.entity.name))
        })?;
        let position = point_row(store, &block, &positions, index)?;
        let extent = match record.extents {
            Some(extents) => point_row(store, &block, &extents, index)?,
            None => Vec::new(),
        };
        Ok((position, extent))
    }

    /// Region of a referenced DataArray selected by point `index`
    pub fn retrieve_data<T: Element>(
        &self,
        index: usize,
        reference: impl Into<Key>,
    ) -> Result<ArrayD<T>> {
        let (block, tag) = self.keys();
        let reference = self.references().get(reference)?.id();
        self.core.read(|store| {
            let record = store.data_tag(&block, &tag)?;
            let (position, extent) = self.point(store, record, index)?;
            let array = store.data_array(&block, &reference)?;
            let region = tagged_region(array, &position, &extent, &record.units)?;
            read_region(array, &region)
        })
    }

    /// Feature data for point `index`: the tagged region for Tagged links,
    /// row `index` for Indexed links, all data for Untagged links
    pub fn retrieve_feature_data<T: Element>(
        &self,
        index: usize,
        feature: impl Into<Key>,
    ) -> Result<ArrayD<T>> {
        let (block, tag) = self.keys();
        let feature_id = self.features().get(feature)?.id();
        self.core.read(|store| {
            let record = store.data_tag(&block, &tag)?;
            let feature = record
                .features
                .iter()
                .find(|f| f.id == feature_id)
                .ok_or_else(|| NixError::not_found("feature", feature_id))?;
            let (position, extent) = match feature.link_type {
                LinkType::Tagged => self.point(store, record, index)?,
                _ => (Vec::new(), Vec::new()),
            };
            feature_data(
                store,
                &block,
                feature,
                &position,
                &extent,
                &record.units,
                Some(index),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::data_array::DataInit;
    use crate::file::File;
    use ndarray::{arr2, Array2};

    fn setup() -> (File, Block, DataArray, DataTag) {
        let file = File::in_memory().unwrap();
        let block = file.create_block("session", "recording").unwrap();

        let values = Array2::from_shape_fn((2, 10), |(r, c)| (r * 10 + c) as f64);
        let signal = block
            .create_data_array_with_data(
                "signal",
                "trace",
                DataInit::new().with_data(values.view()),
            )
            .unwrap();
        signal.append_set_dimension().unwrap();
        signal.append_sampled_dimension(0.5).unwrap();

        let points = arr2(&[[0.0, 1.0], [1.0, 2.0]]);
        let positions = block
            .create_data_array_with_data(
                "positions",
                "points",
                DataInit::new().with_data(points.view()),
            )
            .unwrap();
        let tag = block.create_data_tag("events", "event", &positions).unwrap();
        tag.references().append(&signal).unwrap();
        (file, block, signal, tag)
    }

    #[test]
    fn test_retrieve_points_without_extents() {
        let (_file, _block, signal, tag) = setup();
        assert_eq!(tag.position_count().unwrap(), 2);

        let first: ArrayD<f64> = tag.retrieve_data(0, &signal).unwrap();
        assert_eq!(first.shape(), &[1, 1]);
        assert_eq!(first.iter().copied().collect::<Vec<_>>(), vec![2.0]);

        let second: ArrayD<f64> = tag.retrieve_data(1, "signal").unwrap();
        assert_eq!(second.iter().copied().collect::<Vec<_>>(), vec![14.0]);

        assert!(matches!(
            tag.retrieve_data::<f64>(2, 0),
            Err(NixError::OutOfBounds { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_retrieve_with_extents() {
        let (_file, block, signal, tag) = setup();
        let spans = arr2(&[[0.0, 1.0], [0.0, 0.5]]);
        let extents = block
            .create_data_array_with_data(
                "extents",
                "spans",
                DataInit::new().with_data(spans.view()),
            )
            .unwrap();
        tag.set_extents(Some(&extents)).unwrap();

        let first: ArrayD<f64> = tag.retrieve_data(0, &signal).unwrap();
        assert_eq!(first.iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0]);
        let second: ArrayD<f64> = tag.retrieve_data(1, &signal).unwrap();
        assert_eq!(second.iter().copied().collect::<Vec<_>>(), vec![14.0]);
    }

    #[test]
    fn test_extents_shape_must_match_positions() {
        let (_file, block, _signal, tag) = setup();
        let wrong = block
            .create_data_array_with_data(
                "wrong",
                "spans",
                DataInit::new().with_data(arr2(&[[1.0, 1.0, 1.0]]).view()),
            )
            .unwrap();
        assert!(matches!(tag.set_extents(Some(&wrong)), Err(NixError::Validation(_))));
        assert!(tag.extents().unwrap().is_none());

        assert!(matches!(tag.set_extents(Some(&tag)), Err(NixError::Type(_))));
    }

    #[test]
    fn test_indexed_feature() {
        let (_file, block, _signal, tag) = setup();
        let labels = block
            .create_data_array_with_data(
                "labels",
                "feature",
                DataInit::new().with_data(arr2(&[[1i32, 2], [3, 4]]).view()),
            )
            .unwrap();
        let feature = tag.create_feature(&labels, LinkType::Indexed).unwrap();

        let row: ArrayD<i32> = tag.retrieve_feature_data(1, &feature).unwrap();
        assert_eq!(row.shape(), &[1, 2]);
        assert_eq!(row.iter().copied().collect::<Vec<_>>(), vec![3, 4]);

        feature.set_link_type(LinkType::Untagged).unwrap();
        let all: ArrayD<i32> = tag.retrieve_feature_data(1, 0).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_deleting_positions_clears_link() {
        let (_file, block, _signal, tag) = setup();
        block.delete_data_array("positions").unwrap();
        assert!(tag.positions().unwrap().is_none());
        assert_eq!(tag.position_count().unwrap(), 0);
        assert!(matches!(tag.retrieve_data::<f64>(0, 0), Err(NixError::Validation(_))));
    }
}

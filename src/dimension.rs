//! Dimension descriptors: the meaning of each axis of a DataArray.
//!
//! Dimensions are addressed by position. Each one reports a 1-based
//! [`index`](DimensionHandle::index); deleting a dimension shifts every later
//! one down so indices stay contiguous. A handle keeps the index it was
//! created with, so after a deletion it refers to whatever dimension now sits
//! at that index, and fails if that slot is gone or holds another variant.

use crate::error::{NixError, Result};
use crate::handle::FileCore;
use crate::registry::resolve_index;
use crate::types::{DimensionType, EntityId, Key};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Largest index a coordinate may map to
const MAX_INDEX: usize = i64::MAX as usize;

fn beyond_axis() -> NixError {
    NixError::OutOfBounds {
        index: i64::MAX,
        len: MAX_INDEX,
    }
}

fn check_position(position: f64) -> Result<()> {
    if position.is_nan() {
        return Err(NixError::validation("position is not a number"));
    }
    Ok(())
}

/// Convert a rounded, non-negative coordinate index to `usize`
fn to_index(index: f64) -> Result<usize> {
    index
        .to_usize()
        .filter(|&index| index <= MAX_INDEX)
        .ok_or_else(beyond_axis)
}

/// End of the span of `count` entries from `start`
fn span_end(start: usize, count: usize) -> Result<usize> {
    start
        .checked_add(count)
        .filter(|&end| end <= MAX_INDEX)
        .ok_or_else(beyond_axis)
}

/// Regularly sampled axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledAxis {
    pub sampling_interval: f64,
    pub offset: Option<f64>,
    pub unit: Option<String>,
    pub label: Option<String>,
}

impl SampledAxis {
    /// Regular axis with a positive, finite sampling interval
    pub fn new(sampling_interval: f64) -> Result<Self> {
        check_interval(sampling_interval)?;
        Ok(Self {
            sampling_interval,
            offset: None,
            unit: None,
            label: None,
        })
    }

    /// Coordinate of sample `index`
    pub fn position_at(&self, index: usize) -> f64 {
        self.offset.unwrap_or(0.0) + index as f64 * self.sampling_interval
    }

    /// Index of the sample nearest to `position`. Positions past the
    /// addressable range are out of bounds.
    pub fn index_of(&self, position: f64) -> Result<usize> {
        check_position(position)?;
        let index = ((position - self.offset.unwrap_or(0.0)) / self.sampling_interval).round();
        if index.is_nan() || index < 0.0 {
            return Err(NixError::validation(format!(
                "position {} lies before the start of the axis",
                position
            )));
        }
        to_index(index)
    }

    /// `count` coordinates starting at sample `start`
    pub fn axis(&self, count: usize, start: usize) -> Result<Vec<f64>> {
        let end = span_end(start, count)?;
        Ok((start..end).map(|i| self.position_at(i)).collect())
    }
}

/// Axis with explicit, ascending tick positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeAxis {
    pub ticks: Vec<f64>,
    pub unit: Option<String>,
    pub label: Option<String>,
}

impl RangeAxis {
    /// Irregular axis over strictly increasing ticks
    pub fn new(ticks: &[f64]) -> Result<Self> {
        check_ticks(ticks)?;
        Ok(Self {
            ticks: ticks.to_vec(),
            unit: None,
            label: None,
        })
    }

    /// Index of the first tick at or after `position`
    pub fn index_of(&self, position: f64) -> Result<usize> {
        check_position(position)?;
        let index = self.ticks.partition_point(|&tick| tick < position);
        if index >= self.ticks.len() {
            return Err(NixError::OutOfBounds {
                index: index as i64,
                len: self.ticks.len(),
            });
        }
        Ok(index)
    }

    /// `count` ticks starting at `start`
    pub fn axis(&self, count: usize, start: usize) -> Result<Vec<f64>> {
        let end = span_end(start, count)?;
        if end > self.ticks.len() {
            return Err(NixError::OutOfBounds {
                index: end as i64,
                len: self.ticks.len(),
            });
        }
        Ok(self.ticks[start..end].to_vec())
    }
}

/// Categorical axis; entries may carry labels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetAxis {
    pub labels: Vec<String>,
}

impl SetAxis {
    /// Positions along a set axis are plain indices
    pub fn index_of(&self, position: f64) -> Result<usize> {
        check_position(position)?;
        let index = position.round();
        if index < 0.0 {
            return Err(NixError::validation(format!(
                "position {} is not a valid set index",
                position
            )));
        }
        to_index(index)
    }
}

/// Stored description of one axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DimensionDescriptor {
    Sampled(SampledAxis),
    Range(RangeAxis),
    Set(SetAxis),
}

impl DimensionDescriptor {
    /// Discriminant of the descriptor
    pub fn dimension_type(&self) -> DimensionType {
        match self {
            DimensionDescriptor::Sampled(_) => DimensionType::Sample,
            DimensionDescriptor::Range(_) => DimensionType::Range,
            DimensionDescriptor::Set(_) => DimensionType::Set,
        }
    }

    /// Axis unit, `None` for set axes
    pub fn unit(&self) -> Option<&str> {
        match self {
            DimensionDescriptor::Sampled(axis) => axis.unit.as_deref(),
            DimensionDescriptor::Range(axis) => axis.unit.as_deref(),
            DimensionDescriptor::Set(_) => None,
        }
    }

    /// Map a coordinate along this axis to an index
    pub fn index_of(&self, position: f64) -> Result<usize> {
        match self {
            DimensionDescriptor::Sampled(axis) => axis.index_of(position),
            DimensionDescriptor::Range(axis) => axis.index_of(position),
            DimensionDescriptor::Set(axis) => axis.index_of(position),
        }
    }
}

fn check_interval(interval: f64) -> Result<()> {
    if !(interval.is_finite() && interval > 0.0) {
        return Err(NixError::validation(format!(
            "sampling interval must be positive, got {}",
            interval
        )));
    }
    Ok(())
}

fn check_ticks(ticks: &[f64]) -> Result<()> {
    if ticks.is_empty() {
        return Err(NixError::validation("range dimension needs at least one tick"));
    }
    if ticks.windows(2).any(|pair| !(pair[0] <= pair[1])) {
        return Err(NixError::validation("ticks must be sorted in ascending order"));
    }
    Ok(())
}

/// Access to the variant payload of a [`DimensionDescriptor`]
pub trait Axis: Sized {
    const TYPE: DimensionType;

    fn project(descriptor: &DimensionDescriptor) -> Option<&Self>;
    fn project_mut(descriptor: &mut DimensionDescriptor) -> Option<&mut Self>;
}

macro_rules! axis_variant {
    ($axis:ident, $variant:ident, $dtype:ident) => {
        impl Axis for $axis {
            const TYPE: DimensionType = DimensionType::$dtype;

            fn project(descriptor: &DimensionDescriptor) -> Option<&Self> {
                match descriptor {
                    DimensionDescriptor::$variant(axis) => Some(axis),
                    _ => None,
                }
            }

            fn project_mut(descriptor: &mut DimensionDescriptor) -> Option<&mut Self> {
                match descriptor {
                    DimensionDescriptor::$variant(axis) => Some(axis),
                    _ => None,
                }
            }
        }
    };
}

axis_variant!(SampledAxis, Sampled, Sample);
axis_variant!(RangeAxis, Range, Range);
axis_variant!(SetAxis, Set, Set);

/// Handle to one dimension of a DataArray
pub struct DimensionHandle<A> {
    core: Arc<FileCore>,
    block: EntityId,
    array: EntityId,
    index: usize,
    _axis: PhantomData<A>,
}

pub type SampledDimension = DimensionHandle<SampledAxis>;
pub type RangeDimension = DimensionHandle<RangeAxis>;
pub type SetDimension = DimensionHandle<SetAxis>;

impl<A> Clone for DimensionHandle<A> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            block: self.block,
            array: self.array,
            index: self.index,
            _axis: PhantomData,
        }
    }
}

impl<A> PartialEq for DimensionHandle<A> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
            && self.array == other.array
            && self.index == other.index
    }
}

impl<A: Axis> fmt::Debug for DimensionHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dimension")
            .field("type", &A::TYPE)
            .field("array", &self.array)
            .field("index", &self.index)
            .finish()
    }
}

impl<A: Axis> DimensionHandle<A> {
    fn new(core: Arc<FileCore>, block: EntityId, array: EntityId, index: usize) -> Self {
        Self {
            core,
            block,
            array,
            index,
            _axis: PhantomData,
        }
    }

    /// 1-based position within the owning DataArray
    pub fn index(&self) -> usize {
        self.index
    }

    /// Kind of the axis behind this handle
    pub fn dimension_type(&self) -> DimensionType {
        A::TYPE
    }

    /// Copy of the current axis description
    pub fn axis_info(&self) -> Result<A>
    where
        A: Clone,
    {
        self.with(|axis| Ok(axis.clone()))
    }

    fn with<R>(&self, f: impl FnOnce(&A) -> Result<R>) -> Result<R> {
        self.core.read(|store| {
            let array = store.data_array(&self.block, &self.array)?;
            let descriptor = array
                .dimensions
                .get(self.index - 1)
                .ok_or_else(|| NixError::not_found("dimension", self.index))?;
            let axis = A::project(descriptor).ok_or_else(|| self.variant_mismatch(descriptor))?;
            f(axis)
        })
    }

    fn update(&self, f: impl FnOnce(&mut A) -> Result<()>) -> Result<()> {
        self.core.write(|store| {
            let array = store.data_array_mut(&self.block, &self.array)?;
            let descriptor = array
                .dimensions
                .get_mut(self.index - 1)
                .ok_or_else(|| NixError::not_found("dimension", self.index))?;
            if descriptor.dimension_type() != A::TYPE {
                return Err(self.variant_mismatch(descriptor));
            }
            let axis = A::project_mut(descriptor)
                .ok_or_else(|| NixError::Type(format!("dimension {} changed type", self.index)))?;
            f(axis)?;
            array.entity.touch();
            Ok(())
        })
    }

    fn variant_mismatch(&self, found: &DimensionDescriptor) -> NixError {
        NixError::Type(format!(
            "dimension {} is a {:?} dimension, not {:?}",
            self.index,
            found.dimension_type(),
            A::TYPE
        ))
    }
}

impl DimensionHandle<SampledAxis> {
    /// Distance between consecutive samples
    pub fn sampling_interval(&self) -> Result<f64> {
        self.with(|axis| Ok(axis.sampling_interval))
    }

    /// Replace the sampling interval
    pub fn set_sampling_interval(&self, interval: f64) -> Result<()> {
        check_interval(interval)?;
        self.update(|axis| {
            axis.sampling_interval = interval;
            Ok(())
        })
    }

    /// Position of index 0, `None` means 0.0
    pub fn offset(&self) -> Result<Option<f64>> {
        self.with(|axis| Ok(axis.offset))
    }

    /// Set or clear the offset
    pub fn set_offset(&self, offset: Option<f64>) -> Result<()> {
        self.update(|axis| {
            axis.offset = offset;
            Ok(())
        })
    }

    /// Unit of the sampled axis
    pub fn unit(&self) -> Result<Option<String>> {
        self.with(|axis| Ok(axis.unit.clone()))
    }

    /// Set or clear the unit
    pub fn set_unit(&self, unit: Option<&str>) -> Result<()> {
        self.update(|axis| {
            axis.unit = unit.map(str::to_string);
            Ok(())
        })
    }

    /// Axis label
    pub fn label(&self) -> Result<Option<String>> {
        self.with(|axis| Ok(axis.label.clone()))
    }

    /// Set or clear the label
    pub fn set_label(&self, label: Option<&str>) -> Result<()> {
        self.update(|axis| {
            axis.label = label.map(str::to_string);
            Ok(())
        })
    }

    /// Position of sample `index`
    pub fn position_at(&self, index: usize) -> Result<f64> {
        self.with(|axis| Ok(axis.position_at(index)))
    }

    /// Index of the sample nearest to `position`
    pub fn index_of(&self, position: f64) -> Result<usize> {
        self.with(|axis| axis.index_of(position))
    }

    /// Positions of `count` samples starting at `start`
    pub fn axis(&self, count: usize, start: usize) -> Result<Vec<f64>> {
        self.with(|axis| axis.axis(count, start))
    }
}

impl DimensionHandle<RangeAxis> {
    /// Copy of the ticks
    pub fn ticks(&self) -> Result<Vec<f64>> {
        self.with(|axis| Ok(axis.ticks.clone()))
    }

    /// Replace the ticks, keeping them strictly increasing
    pub fn set_ticks(&self, ticks: &[f64]) -> Result<()> {
        check_ticks(ticks)?;
        self.update(|axis| {
            axis.ticks = ticks.to_vec();
            Ok(())
        })
    }

    /// Unit of the ticks
    pub fn unit(&self) -> Result<Option<String>> {
        self.with(|axis| Ok(axis.unit.clone()))
    }

    pub fn set_unit(&self, unit: Option<&str>) -> Result<()> {
        self.update(|axis| {
            axis.unit = unit.map(str::to_string);
            Ok(())
        })
    }

    pub fn label(&self) -> Result<Option<String>> {
        self.with(|axis| Ok(axis.label.clone()))
    }

    pub fn set_label(&self, label: Option<&str>) -> Result<()> {
        self.update(|axis| {
            axis.label = label.map(str::to_string);
            Ok(())
        })
    }

    /// Index of the first tick at or after `position`
    pub fn index_of(&self, position: f64) -> Result<usize> {
        self.with(|axis| axis.index_of(position))
    }

    /// `count` ticks starting at `start`
    pub fn axis(&self, count: usize, start: usize) -> Result<Vec<f64>> {
        self.with(|axis| axis.axis(count, start))
    }
}

impl DimensionHandle<SetAxis> {
    /// Copy of the category labels
    pub fn labels(&self) -> Result<Vec<String>> {
        self.with(|axis| Ok(axis.labels.clone()))
    }

    /// Replace the labels; an empty slice clears them
    pub fn set_labels<S: AsRef<str>>(&self, labels: &[S]) -> Result<()> {
        let labels: Vec<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
        self.update(|axis| {
            axis.labels = labels;
            Ok(())
        })
    }
}

/// Any dimension of a DataArray
#[derive(Debug, Clone, PartialEq)]
pub enum Dimension {
    Sampled(SampledDimension),
    Range(RangeDimension),
    Set(SetDimension),
}

impl Dimension {
    fn from_descriptor(
        core: Arc<FileCore>,
        block: EntityId,
        array: EntityId,
        index: usize,
        descriptor: &DimensionDescriptor,
    ) -> Self {
        match descriptor {
            DimensionDescriptor::Sampled(_) => {
                Dimension::Sampled(DimensionHandle::new(core, block, array, index))
            }
            DimensionDescriptor::Range(_) => {
                Dimension::Range(DimensionHandle::new(core, block, array, index))
            }
            DimensionDescriptor::Set(_) => {
                Dimension::Set(DimensionHandle::new(core, block, array, index))
            }
        }
    }

    /// 1-based position within the owning DataArray
    pub fn index(&self) -> usize {
        match self {
            Dimension::Sampled(d) => d.index(),
            Dimension::Range(d) => d.index(),
            Dimension::Set(d) => d.index(),
        }
    }

    /// Kind of the wrapped axis
    pub fn dimension_type(&self) -> DimensionType {
        match self {
            Dimension::Sampled(_) => DimensionType::Sample,
            Dimension::Range(_) => DimensionType::Range,
            Dimension::Set(_) => DimensionType::Set,
        }
    }

    /// Sampled view of this dimension, if it is one
    pub fn as_sampled(&self) -> Option<&SampledDimension> {
        match self {
            Dimension::Sampled(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<&RangeDimension> {
        match self {
            Dimension::Range(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&SetDimension> {
        match self {
            Dimension::Set(d) => Some(d),
            _ => None,
        }
    }
}

/// Append a descriptor to a DataArray, returning the handle of the new dimension
pub(crate) fn append(
    core: &Arc<FileCore>,
    block: EntityId,
    array: EntityId,
    descriptor: DimensionDescriptor,
) -> Result<Dimension> {
    let index = core.write(|store| {
        let record = store.data_array_mut(&block, &array)?;
        record.dimensions.push(descriptor.clone());
        record.entity.touch();
        Ok(record.dimensions.len())
    })?;
    debug!(array = %array, index, kind = ?descriptor.dimension_type(), "appended dimension");
    Ok(Dimension::from_descriptor(
        Arc::clone(core),
        block,
        array,
        index,
        &descriptor,
    ))
}

/// Ordered dimensions of one DataArray, addressed by 0-based position
#[derive(Clone)]
pub struct Dimensions {
    core: Arc<FileCore>,
    block: EntityId,
    array: EntityId,
}

impl fmt::Debug for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dimensions")
            .field("array", &self.array)
            .finish()
    }
}

impl Dimensions {
    pub(crate) fn new(core: Arc<FileCore>, block: EntityId, array: EntityId) -> Self {
        Self { core, block, array }
    }

    fn position(key: &Key, len: usize) -> Result<usize> {
        match key {
            Key::Index(index) => resolve_index(*index, len),
            other => Err(NixError::Type(format!(
                "dimensions are addressed by position, not by {:?}",
                other
            ))),
        }
    }

    /// Number of dimensions
    pub fn len(&self) -> Result<usize> {
        self.core
            .read(|store| Ok(store.data_array(&self.block, &self.array)?.dimensions.len()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Dimension at a position; negative positions count from the end
    pub fn get(&self, key: impl Into<Key>) -> Result<Dimension> {
        let key = key.into();
        self.core.read(|store| {
            let dims = &store.data_array(&self.block, &self.array)?.dimensions;
            let pos = Self::position(&key, dims.len())?;
            Ok(Dimension::from_descriptor(
                Arc::clone(&self.core),
                self.block,
                self.array,
                pos + 1,
                &dims[pos],
            ))
        })
    }

    /// Handles for every dimension in order
    pub fn to_vec(&self) -> Result<Vec<Dimension>> {
        self.core.read(|store| {
            let dims = &store.data_array(&self.block, &self.array)?.dimensions;
            Ok(dims
                .iter()
                .enumerate()
                .map(|(pos, descriptor)| {
                    Dimension::from_descriptor(
                        Arc::clone(&self.core),
                        self.block,
                        self.array,
                        pos + 1,
                        descriptor,
                    )
                })
                .collect())
        })
    }

    /// Stored descriptors in order
    pub fn descriptors(&self) -> Result<Vec<DimensionDescriptor>> {
        self.core
            .read(|store| Ok(store.data_array(&self.block, &self.array)?.dimensions.clone()))
    }

    /// Remove the dimension at a position; later dimensions move down by one
    pub fn delete(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let removed = self.core.write(|store| {
            let record = store.data_array_mut(&self.block, &self.array)?;
            let pos = Self::position(&key, record.dimensions.len())?;
            record.dimensions.remove(pos);
            record.entity.touch();
            Ok(pos + 1)
        })?;
        debug!(array = %self.array, index = removed, "deleted dimension");
        Ok(())
    }

    /// Remove every dimension
    pub fn clear(&self) -> Result<()> {
        self.core.write(|store| {
            let record = store.data_array_mut(&self.block, &self.array)?;
            record.dimensions.clear();
            record.entity.touch();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampled_axis_mapping() {
        let mut axis = SampledAxis::new(0.5).unwrap();
        axis.offset = Some(1.0);
        assert_eq!(axis.position_at(4), 3.0);
        assert_eq!(axis.index_of(3.1).unwrap(), 4);
        assert_eq!(axis.axis(3, 1).unwrap(), vec![1.5, 2.0, 2.5]);
        assert!(axis.index_of(-2.0).is_err());
        assert!(SampledAxis::new(0.0).is_err());
        assert!(SampledAxis::new(f64::NAN).is_err());
    }

    #[test]
    fn test_range_axis_mapping() {
        let axis = RangeAxis::new(&[0.0, 1.0, 4.0, 9.0]).unwrap();
        assert_eq!(axis.index_of(0.0).unwrap(), 0);
        assert_eq!(axis.index_of(2.0).unwrap(), 2);
        assert_eq!(axis.index_of(-5.0).unwrap(), 0);
        assert!(matches!(
            axis.index_of(10.0),
            Err(NixError::OutOfBounds { len: 4, .. })
        ));
        assert_eq!(axis.axis(2, 1).unwrap(), vec![1.0, 4.0]);
        assert!(axis.axis(2, 3).is_err());
    }

    #[test]
    fn test_extreme_positions() {
        let sampled = SampledAxis::new(1.0).unwrap();
        assert!(matches!(sampled.index_of(1e30), Err(NixError::OutOfBounds { .. })));
        assert!(matches!(sampled.index_of(f64::INFINITY), Err(NixError::OutOfBounds { .. })));
        assert!(matches!(sampled.index_of(f64::NAN), Err(NixError::Validation(_))));
        assert!(matches!(sampled.index_of(-1e30), Err(NixError::Validation(_))));
        assert!(matches!(sampled.axis(2, usize::MAX), Err(NixError::OutOfBounds { .. })));

        let set = SetAxis::default();
        assert!(matches!(set.index_of(1e30), Err(NixError::OutOfBounds { .. })));
        assert!(matches!(set.index_of(f64::NAN), Err(NixError::Validation(_))));
        assert!(matches!(set.index_of(-3.0), Err(NixError::Validation(_))));

        let range = RangeAxis::new(&[0.0, 1.0]).unwrap();
        assert!(matches!(range.index_of(f64::NAN), Err(NixError::Validation(_))));
        assert!(matches!(range.index_of(1e30), Err(NixError::OutOfBounds { len: 2, .. })));
        assert!(matches!(range.axis(usize::MAX, 1), Err(NixError::OutOfBounds { .. })));
    }

    #[test]
    fn test_range_ticks_must_ascend() {
        assert!(RangeAxis::new(&[]).is_err());
        assert!(RangeAxis::new(&[1.0, 0.0]).is_err());
        assert!(RangeAxis::new(&[0.0, 0.0, 1.0]).is_ok());
    }

    #[test]
    fn test_descriptor_projection() {
        let desc = DimensionDescriptor::Range(RangeAxis::new(&[1.0]).unwrap());
        assert_eq!(desc.dimension_type(), DimensionType::Range);
        assert!(RangeAxis::project(&desc).is_some());
        assert!(SampledAxis::project(&desc).is_none());
        assert!(SetAxis::project(&desc).is_none());
    }

    #[test]
    fn test_set_axis_index() {
        let axis = SetAxis::default();
        assert_eq!(axis.index_of(2.0).unwrap(), 2);
        assert!(axis.index_of(-1.0).is_err());
    }
}

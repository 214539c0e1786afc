//! Typed n-dimensional datasets with dimension descriptors.

use crate::compression::CompressionMethod;
use crate::dimension::{
    self, Dimension, DimensionDescriptor, Dimensions, RangeAxis, RangeDimension, SampledAxis,
    SampledDimension, SetAxis, SetDimension,
};
use crate::error::{NixError, Result};
use crate::handle::{
    handle_impls, EntityHandle, EntityWithMetadata, FileCore, HasTypedPayload, NamedEntity,
};
use crate::layout::Region;
use crate::links::{LinkField, LinkList, LinkTarget};
use crate::payload::Payload;
use crate::source::Source;
use crate::store::{DataArrayRecord, Location};
use crate::types::{DataType, Element, EntityId, EntityKind};
use bytes::Bytes;
use ndarray::{ArrayD, ArrayView, ArrayViewMut, IxDyn};
use std::sync::Arc;
use tracing::debug;

/// Arguments of [`DataArray::create_data`].
///
/// Give a shape, data, or both. An explicit dtype converts the data;
/// without one the dtype of the data is used, or `f64` for a bare shape.
#[derive(Debug, Clone)]
pub struct DataInit<'a, T: Element = f64> {
    shape: Option<Vec<usize>>,
    dtype: Option<DataType>,
    data: Option<ArrayView<'a, T, IxDyn>>,
}

impl<'a> DataInit<'a, f64> {
    pub fn new() -> Self {
        Self {
            shape: None,
            dtype: None,
            data: None,
        }
    }
}

impl<'a> Default for DataInit<'a, f64> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: Element> DataInit<'a, T> {
    pub fn with_shape(mut self, shape: &[usize]) -> Self {
        self.shape = Some(shape.to_vec());
        self
    }

    pub fn with_dtype(mut self, dtype: DataType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn with_data<U: Element, D: ndarray::Dimension>(
        self,
        data: ArrayView<'a, U, D>,
    ) -> DataInit<'a, U> {
        DataInit {
            shape: self.shape,
            dtype: self.dtype,
            data: Some(data.into_dyn()),
        }
    }

    /// Validate the arguments and build the payload
    pub(crate) fn build(&self) -> Result<Payload> {
        match (&self.shape, &self.data) {
            (None, None) => Err(NixError::validation(
                "either a shape or data is required to create data",
            )),
            (Some(shape), None) => Payload::zeroed(self.dtype.unwrap_or(DataType::F64), shape),
            (shape, Some(data)) => {
                if let Some(shape) = shape {
                    if shape.as_slice() != data.shape() {
                        return Err(NixError::validation(format!(
                            "shape {:?} does not match data of shape {:?}",
                            shape,
                            data.shape()
                        )));
                    }
                }
                let values: Vec<T> = data.iter().copied().collect();
                Payload::from_elements(
                    self.dtype.unwrap_or(T::DATA_TYPE),
                    data.shape(),
                    &values,
                )
            }
        }
    }
}

fn no_data(id: &EntityId) -> NixError {
    NixError::validation(format!("data array '{}' has no data", id))
}

fn shape_mismatch(expected: &[usize], actual: &[usize]) -> NixError {
    NixError::Shape {
        expected: expected.to_vec(),
        actual: actual.to_vec(),
    }
}

/// Evaluate the calibration polynomial at `x`
pub(crate) fn calibrate(coefficients: &[f64], origin: f64, x: f64) -> f64 {
    if coefficients.is_empty() {
        return x;
    }
    let t = x - origin;
    coefficients.iter().rev().fold(0.0, |acc, c| acc * t + c)
}

/// A named, typed n-dimensional dataset
#[derive(Clone)]
pub struct DataArray {
    core: Arc<FileCore>,
    location: Location,
}

handle_impls!(DataArray);

impl EntityHandle for DataArray {
    fn as_typed_payload(&self) -> Option<&dyn HasTypedPayload> {
        Some(self)
    }
}

impl NamedEntity for DataArray {}

impl EntityWithMetadata for DataArray {}

impl HasTypedPayload for DataArray {
    fn data_type(&self) -> Result<Option<DataType>> {
        DataArray::data_type(self)
    }

    fn data_extent(&self) -> Result<Option<Vec<usize>>> {
        DataArray::data_extent(self)
    }
}

impl LinkTarget for DataArray {
    const KIND: EntityKind = EntityKind::DataArray;
    const DUPLICATES: bool = true;

    fn accepts(entity: &dyn EntityHandle) -> bool {
        entity.as_typed_payload().is_some()
    }

    fn locate(block: EntityId, id: EntityId) -> Location {
        Location::DataArray { block, id }
    }

    fn attach(core: Arc<FileCore>, location: Location) -> Self {
        Self::from_parts(core, location)
    }
}

impl DataArray {
    fn keys(&self) -> (EntityId, EntityId) {
        (
            self.location.block().unwrap_or_else(|| self.location.id()),
            self.location.id(),
        )
    }

    fn with<R>(&self, f: impl FnOnce(&DataArrayRecord) -> Result<R>) -> Result<R> {
        let (block, id) = self.keys();
        self.core.read(|store| f(store.data_array(&block, &id)?))
    }

    fn update<R>(&self, f: impl FnOnce(&mut DataArrayRecord) -> Result<R>) -> Result<R> {
        let (block, id) = self.keys();
        self.core.write(|store| {
            let record = store.data_array_mut(&block, &id)?;
            let out = f(record)?;
            record.entity.touch();
            Ok(out)
        })
    }

    fn with_payload<R>(&self, f: impl FnOnce(&Payload) -> Result<R>) -> Result<R> {
        self.with(|record| {
            let payload = record.data.as_ref().ok_or_else(|| no_data(&record.entity.id))?;
            f(payload)
        })
    }

    fn update_payload<R>(&self, f: impl FnOnce(&mut Payload) -> Result<R>) -> Result<R> {
        self.update(|record| {
            let id = record.entity.id;
            let payload = record.data.as_mut().ok_or_else(|| no_data(&id))?;
            f(payload)
        })
    }

    pub fn label(&self) -> Result<Option<String>> {
        self.with(|record| Ok(record.label.clone()))
    }

    pub fn set_label(&self, label: Option<&str>) -> Result<()> {
        self.update(|record| {
            record.label = label.map(str::to_string);
            Ok(())
        })
    }

    pub fn unit(&self) -> Result<Option<String>> {
        self.with(|record| Ok(record.unit.clone()))
    }

    pub fn set_unit(&self, unit: Option<&str>) -> Result<()> {
        self.update(|record| {
            record.unit = unit.map(str::to_string);
            Ok(())
        })
    }

    pub fn expansion_origin(&self) -> Result<Option<f64>> {
        self.with(|record| Ok(record.expansion_origin))
    }

    pub fn set_expansion_origin(&self, origin: Option<f64>) -> Result<()> {
        self.update(|record| {
            record.expansion_origin = origin;
            Ok(())
        })
    }

    pub fn polynom_coefficients(&self) -> Result<Vec<f64>> {
        self.with(|record| Ok(record.polynom_coefficients.clone()))
    }

    pub fn set_polynom_coefficients(&self, coefficients: &[f64]) -> Result<()> {
        self.update(|record| {
            record.polynom_coefficients = coefficients.to_vec();
            Ok(())
        })
    }

    /// Codec used when the payload is persisted
    pub fn compression(&self) -> Result<CompressionMethod> {
        self.with(|record| Ok(record.compression))
    }

    pub fn set_compression(&self, method: CompressionMethod) -> Result<()> {
        let level = self.core.options().compression_level;
        self.update(|record| {
            record.compression = method;
            if let Some(payload) = record.data.take() {
                record.data = Some(payload.with_codec(method, level));
            }
            Ok(())
        })
    }

    pub fn has_data(&self) -> Result<bool> {
        self.with(|record| Ok(record.data.is_some()))
    }

    pub fn data_type(&self) -> Result<Option<DataType>> {
        self.with(|record| Ok(record.data.as_ref().map(Payload::dtype)))
    }

    pub fn data_extent(&self) -> Result<Option<Vec<usize>>> {
        self.with(|record| Ok(record.data.as_ref().map(|p| p.extent().to_vec())))
    }

    /// Allocate the payload. Fails if the array already holds data.
    pub fn create_data<T: Element>(&self, init: DataInit<'_, T>) -> Result<()> {
        let payload = init.build()?;
        let level = self.core.options().compression_level;
        let (dtype, extent) = (payload.dtype(), payload.extent().to_vec());
        self.update(|record| {
            if record.data.is_some() {
                return Err(NixError::validation(format!(
                    "data array '{}' already holds data",
                    record.entity.name
                )));
            }
            record.data = Some(payload.with_codec(record.compression, level));
            Ok(())
        })?;
        debug!(array = %self.location.id(), %dtype, ?extent, "created data");
        Ok(())
    }

    /// Resize in place: growth pads with zero, shrinking truncates and the
    /// overlapping region keeps its values
    pub fn set_data_extent(&self, extent: &[usize]) -> Result<()> {
        self.update_payload(|payload| payload.resize(extent))
    }

    /// Copy the whole payload into `buffer`, whose shape must equal the extent
    pub fn read_direct<T: Element, D: ndarray::Dimension>(
        &self,
        buffer: &mut ArrayViewMut<'_, T, D>,
    ) -> Result<()> {
        let values = self.with_payload(|payload| {
            if payload.extent() != buffer.shape() {
                return Err(shape_mismatch(payload.extent(), buffer.shape()));
            }
            payload.read_all::<T>()
        })?;
        for (dst, src) in buffer.iter_mut().zip(values) {
            *dst = src;
        }
        Ok(())
    }

    /// Overwrite the whole payload from `buffer`, whose shape must equal the extent
    pub fn write_direct<T: Element, D: ndarray::Dimension>(
        &self,
        buffer: &ArrayView<'_, T, D>,
    ) -> Result<()> {
        let values: Vec<T> = buffer.iter().copied().collect();
        self.update_payload(|payload| {
            if payload.extent() != buffer.shape() {
                return Err(shape_mismatch(payload.extent(), buffer.shape()));
            }
            payload.write_all(&values)
        })
    }

    /// A fresh copy of the whole payload
    pub fn read_all<T: Element>(&self) -> Result<ArrayD<T>> {
        let (extent, values) =
            self.with_payload(|payload| Ok((payload.extent().to_vec(), payload.read_all::<T>()?)))?;
        ArrayD::from_shape_vec(IxDyn(&extent), values)
            .map_err(|e| NixError::validation(e.to_string()))
    }

    /// Read the hyperslab starting at `offset` spanning `count`
    pub fn read_region<T: Element>(&self, offset: &[usize], count: &[usize]) -> Result<ArrayD<T>> {
        let region = Region::new(offset.to_vec(), count.to_vec());
        let values = self.with_payload(|payload| payload.read_region::<T>(&region))?;
        ArrayD::from_shape_vec(IxDyn(count), values)
            .map_err(|e| NixError::validation(e.to_string()))
    }

    /// Write `data` into the hyperslab starting at `offset`
    pub fn write_region<T: Element, D: ndarray::Dimension>(
        &self,
        offset: &[usize],
        data: &ArrayView<'_, T, D>,
    ) -> Result<()> {
        let region = Region::new(offset.to_vec(), data.shape().to_vec());
        let values: Vec<T> = data.iter().copied().collect();
        self.update_payload(|payload| payload.write_region(&region, &values))
    }

    /// Stored little-endian bytes
    pub fn read_raw(&self) -> Result<Bytes> {
        self.with_payload(|payload| Ok(Bytes::copy_from_slice(payload.bytes())))
    }

    /// Replace the stored bytes; the length must match dtype and extent
    pub fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        self.update_payload(|payload| payload.write_bytes(bytes))
    }

    /// Payload with the calibration polynomial applied around the expansion origin
    pub fn read_calibrated(&self) -> Result<ArrayD<f64>> {
        let (coefficients, origin) = self.with(|record| {
            Ok((
                record.polynom_coefficients.clone(),
                record.expansion_origin.unwrap_or(0.0),
            ))
        })?;
        Ok(self
            .read_all::<f64>()?
            .mapv(|x| calibrate(&coefficients, origin, x)))
    }

    pub fn dimensions(&self) -> Dimensions {
        let (block, id) = self.keys();
        Dimensions::new(Arc::clone(&self.core), block, id)
    }

    fn append_dimension(&self, descriptor: DimensionDescriptor) -> Result<Dimension> {
        let (block, id) = self.keys();
        dimension::append(&self.core, block, id, descriptor)
    }

    pub fn append_set_dimension(&self) -> Result<SetDimension> {
        match self.append_dimension(DimensionDescriptor::Set(SetAxis::default()))? {
            Dimension::Set(d) => Ok(d),
            other => Err(NixError::Type(format!("appended {:?}", other.dimension_type()))),
        }
    }

    pub fn append_range_dimension(&self, ticks: &[f64]) -> Result<RangeDimension> {
        let axis = RangeAxis::new(ticks)?;
        match self.append_dimension(DimensionDescriptor::Range(axis))? {
            Dimension::Range(d) => Ok(d),
            other => Err(NixError::Type(format!("appended {:?}", other.dimension_type()))),
        }
    }

    pub fn append_sampled_dimension(&self, sampling_interval: f64) -> Result<SampledDimension> {
        let axis = SampledAxis::new(sampling_interval)?;
        match self.append_dimension(DimensionDescriptor::Sampled(axis))? {
            Dimension::Sampled(d) => Ok(d),
            other => Err(NixError::Type(format!("appended {:?}", other.dimension_type()))),
        }
    }

    pub fn sources(&self) -> LinkList<Source> {
        LinkList::new(Arc::clone(&self.core), self.location, LinkField::Sources)
    }
}

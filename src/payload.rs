//! Typed, shaped payload of a DataArray.
//!
//! Elements live in memory as little-endian bytes of a fixed [`DataType`].
//! On serialization each payload is encoded with its own codec and
//! carries length and CRC-32, so payloads are self-describing on disk.

use crate::compression::{CompressionLevel, CompressionMethod};
use crate::error::{NixError, Result};
use crate::layout::{self, Region};
use crate::types::{DataType, Element};
use crate::utils::{calculate_checksum, decode_elements, encode_elements, verify_checksum};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    dtype: DataType,
    extent: Vec<usize>,
    bytes: Vec<u8>,
    codec: CompressionMethod,
    level: CompressionLevel,
}

impl Payload {
    /// A zero-filled payload
    pub fn zeroed(dtype: DataType, extent: &[usize]) -> Result<Self> {
        let len = layout::byte_len(extent, dtype.size_in_bytes())?;
        Ok(Self {
            dtype,
            extent: extent.to_vec(),
            bytes: vec![0u8; len],
            codec: CompressionMethod::None,
            level: CompressionLevel::default(),
        })
    }

    /// Build a payload of `dtype` from native values laid out as `extent`
    pub fn from_elements<T: Element>(
        dtype: DataType,
        extent: &[usize],
        values: &[T],
    ) -> Result<Self> {
        layout::byte_len(extent, dtype.size_in_bytes())?;
        if values.len() != layout::element_count(extent) {
            return Err(NixError::validation(format!(
                "{} values do not fill an extent of {:?}",
                values.len(),
                extent
            )));
        }
        Ok(Self {
            dtype,
            extent: extent.to_vec(),
            bytes: encode_elements(values, dtype)?,
            codec: CompressionMethod::None,
            level: CompressionLevel::default(),
        })
    }

    pub fn with_codec(mut self, codec: CompressionMethod, level: CompressionLevel) -> Self {
        self.codec = codec;
        self.level = level;
        self
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn extent(&self) -> &[usize] {
        &self.extent
    }

    pub fn codec(&self) -> CompressionMethod {
        self.codec
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn element_count(&self) -> usize {
        layout::element_count(&self.extent)
    }

    /// Every element, converted to `T`
    pub fn read_all<T: Element>(&self) -> Result<Vec<T>> {
        decode_elements(self.dtype, &self.bytes)
    }

    /// Overwrite every element; `values` must hold exactly `element_count` items
    pub fn write_all<T: Element>(&mut self, values: &[T]) -> Result<()> {
        if values.len() != self.element_count() {
            return Err(NixError::validation(format!(
                "{} values do not fill an extent of {:?}",
                values.len(),
                self.extent
            )));
        }
        self.bytes = encode_elements(values, self.dtype)?;
        Ok(())
    }

    /// Replace the raw bytes; length must match the extent
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.bytes.len() {
            return Err(NixError::validation(format!(
                "expected {} bytes for extent {:?} of {}, got {}",
                self.bytes.len(),
                self.extent,
                self.dtype,
                bytes.len()
            )));
        }
        self.bytes.copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_region<T: Element>(&self, region: &Region) -> Result<Vec<T>> {
        region.validate(&self.extent)?;
        let elem_size = self.dtype.size_in_bytes();
        let raw = layout::read_region(&self.bytes, &self.extent, region, elem_size);
        decode_elements(self.dtype, &raw)
    }

    pub fn write_region<T: Element>(&mut self, region: &Region, values: &[T]) -> Result<()> {
        region.validate(&self.extent)?;
        if values.len() != region.element_count() {
            return Err(NixError::Shape {
                expected: region.count.clone(),
                actual: vec![values.len()],
            });
        }
        let raw = encode_elements(values, self.dtype)?;
        layout::write_region(
            &mut self.bytes,
            &self.extent,
            region,
            &raw,
            self.dtype.size_in_bytes(),
        );
        Ok(())
    }

    /// Resize in place: growth pads with zero, shrinking truncates, the
    /// overlapping region keeps its values. The rank cannot change.
    pub fn resize(&mut self, extent: &[usize]) -> Result<()> {
        if extent.len() != self.extent.len() {
            return Err(NixError::validation(format!(
                "cannot change rank from {} to {}",
                self.extent.len(),
                extent.len()
            )));
        }
        layout::byte_len(extent, self.dtype.size_in_bytes())?;
        self.bytes = layout::resize(&self.bytes, &self.extent, extent, self.dtype.size_in_bytes());
        self.extent = extent.to_vec();
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct StoredPayload<'a> {
    dtype: DataType,
    extent: Vec<usize>,
    codec: CompressionMethod,
    level: CompressionLevel,
    raw_len: u64,
    checksum: u32,
    data: Cow<'a, [u8]>,
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let encoded = self
            .codec
            .compress(&self.bytes, self.level)
            .map_err(serde::ser::Error::custom)?;
        StoredPayload {
            dtype: self.dtype,
            extent: self.extent.clone(),
            codec: self.codec,
            level: self.level,
            raw_len: self.bytes.len() as u64,
            checksum: calculate_checksum(&self.bytes),
            data: Cow::Owned(encoded),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error;

        let stored = StoredPayload::deserialize(deserializer)?;
        let raw_len = stored.raw_len as usize;
        let expected_len = layout::byte_len(&stored.extent, stored.dtype.size_in_bytes())
            .map_err(D::Error::custom)?;
        if raw_len != expected_len {
            return Err(D::Error::custom(format!(
                "payload of {} bytes does not match extent {:?} of {}",
                raw_len, stored.extent, stored.dtype
            )));
        }
        let bytes = stored
            .codec
            .decompress(&stored.data, raw_len)
            .map_err(D::Error::custom)?;
        verify_checksum(&bytes, stored.checksum).map_err(D::Error::custom)?;

        Ok(Self {
            dtype: stored.dtype,
            extent: stored.extent,
            bytes,
            codec: stored.codec,
            level: stored.level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_fill() {
        let payload = Payload::zeroed(DataType::F64, &[3, 2]).unwrap();
        assert_eq!(payload.element_count(), 6);
        assert_eq!(payload.read_all::<f64>().unwrap(), vec![0.0; 6]);
    }

    #[test]
    fn test_from_elements_checks_count() {
        assert!(Payload::from_elements(DataType::I32, &[2, 2], &[1i32, 2, 3]).is_err());
        let p = Payload::from_elements(DataType::I32, &[2, 2], &[1i32, 2, 3, 4]).unwrap();
        assert_eq!(p.bytes().len(), 16);
    }

    #[test]
    fn test_resize_preserves_overlap() {
        let values: Vec<f64> = (0..100).map(|v| v as f64).collect();
        let mut p = Payload::from_elements(DataType::F64, &[100], &values).unwrap();
        p.resize(&[200]).unwrap();
        let grown = p.read_all::<f64>().unwrap();
        assert_eq!(&grown[..100], &values[..]);
        assert!(grown[100..].iter().all(|&v| v == 0.0));

        p.resize(&[100]).unwrap();
        assert_eq!(p.read_all::<f64>().unwrap(), values);
        assert!(p.resize(&[10, 10]).is_err());
    }

    #[test]
    fn test_oversized_extent_is_rejected() {
        assert!(matches!(
            Payload::zeroed(DataType::F64, &[usize::MAX, 2]),
            Err(NixError::Validation(_))
        ));
        assert!(matches!(
            Payload::from_elements::<f64>(DataType::F64, &[usize::MAX, 2, 0], &[]),
            Err(NixError::Validation(_))
        ));

        let mut p = Payload::zeroed(DataType::U64, &[4]).unwrap();
        assert!(matches!(p.resize(&[usize::MAX / 4]), Err(NixError::Validation(_))));
        assert_eq!(p.extent(), &[4]);
    }

    #[test]
    fn test_region_io() {
        let mut p = Payload::zeroed(DataType::U16, &[4, 4]).unwrap();
        let region = Region::new(vec![1, 1], vec![2, 2]);
        p.write_region(&region, &[1u16, 2, 3, 4]).unwrap();
        assert_eq!(p.read_region::<u16>(&region).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(p.read_all::<u16>().unwrap().iter().map(|&v| v as u32).sum::<u32>(), 10);

        let too_big = Region::new(vec![3, 3], vec![2, 2]);
        assert!(p.read_region::<u16>(&too_big).is_err());
    }

    #[test]
    fn test_serde_with_each_codec() {
        let values: Vec<i64> = (0..512).map(|v| v % 7).collect();
        for codec in [
            CompressionMethod::None,
            CompressionMethod::Deflate,
            CompressionMethod::Zstd,
        ] {
            let p = Payload::from_elements(DataType::I64, &[512], &values)
                .unwrap()
                .with_codec(codec, CompressionLevel::default());
            let encoded = bincode::serialize(&p).unwrap();
            let back: Payload = bincode::deserialize(&encoded).unwrap();
            assert_eq!(back, p);
        }
    }
}

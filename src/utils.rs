//! Utility functions

use crate::error::{NixError, Result};
use crate::types::{DataType, Element};
use num_traits::{NumCast, ToPrimitive};
use std::fmt::Debug;

/// Convert a single value between numeric types, failing when it does not fit
fn cast<S, D>(value: S, target: DataType) -> Result<D>
where
    S: ToPrimitive + Copy + Debug,
    D: NumCast,
{
    D::from(value).ok_or_else(|| {
        NixError::validation(format!(
            "value {:?} cannot be represented as {}",
            value, target
        ))
    })
}

/// Decode little-endian payload bytes of type `dtype` into `T`, converting
/// element by element when the types differ
pub fn decode_elements<T: Element>(dtype: DataType, bytes: &[u8]) -> Result<Vec<T>> {
    let size = dtype.size_in_bytes();
    if bytes.len() % size != 0 {
        return Err(NixError::InvalidFormat(
            "Byte length not aligned with data type size".to_string(),
        ));
    }

    if dtype == T::DATA_TYPE {
        return Ok(bytes.chunks_exact(size).map(T::get_le).collect());
    }

    macro_rules! convert_from {
        ($src:ty) => {
            bytes
                .chunks_exact(size)
                .map(|chunk| cast::<$src, T>(<$src>::get_le(chunk), T::DATA_TYPE))
                .collect()
        };
    }

    match dtype {
        DataType::U8 => convert_from!(u8),
        DataType::U16 => convert_from!(u16),
        DataType::U32 => convert_from!(u32),
        DataType::U64 => convert_from!(u64),
        DataType::I8 => convert_from!(i8),
        DataType::I16 => convert_from!(i16),
        DataType::I32 => convert_from!(i32),
        DataType::I64 => convert_from!(i64),
        DataType::F32 => convert_from!(f32),
        DataType::F64 => convert_from!(f64),
    }
}

/// Encode native values as little-endian bytes of type `dtype`
pub fn encode_elements<'a, T, I>(values: I, dtype: DataType) -> Result<Vec<u8>>
where
    T: Element,
    I: IntoIterator<Item = &'a T>,
{
    let iter = values.into_iter();
    let mut out = Vec::with_capacity(iter.size_hint().0 * dtype.size_in_bytes());

    if dtype == T::DATA_TYPE {
        for &v in iter {
            v.put_le(&mut out);
        }
        return Ok(out);
    }

    macro_rules! convert_into {
        ($dst:ty) => {
            for &v in iter {
                cast::<T, $dst>(v, dtype)?.put_le(&mut out);
            }
        };
    }

    match dtype {
        DataType::U8 => convert_into!(u8),
        DataType::U16 => convert_into!(u16),
        DataType::U32 => convert_into!(u32),
        DataType::U64 => convert_into!(u64),
        DataType::I8 => convert_into!(i8),
        DataType::I16 => convert_into!(i16),
        DataType::I32 => convert_into!(i32),
        DataType::I64 => convert_into!(i64),
        DataType::F32 => convert_into!(f32),
        DataType::F64 => convert_into!(f64),
    }

    Ok(out)
}

/// Calculate checksum (CRC32) for data
pub fn calculate_checksum(data: &[u8]) -> u32 {
    let mut crc = 0xFFFFFFFFu32;

    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
        }
    }

    !crc
}

/// Verify checksum, returning the mismatch as an error
pub fn verify_checksum(data: &[u8], expected: u32) -> Result<()> {
    let actual = calculate_checksum(data);
    if actual == expected {
        Ok(())
    } else {
        Err(NixError::ChecksumMismatch { expected, actual })
    }
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_type_roundtrip() {
        let data: Vec<f32> = vec![1.0, -2.5, f32::MAX, 4.0];
        let bytes = encode_elements(&data, DataType::F32).unwrap();
        assert_eq!(bytes.len(), data.len() * 4);

        let recovered: Vec<f32> = decode_elements(DataType::F32, &bytes).unwrap();
        assert_eq!(data, recovered);
    }

    #[test]
    fn test_conversion_on_decode() {
        let bytes = encode_elements(&[1i32, -7, 300], DataType::I32).unwrap();
        let as_f64: Vec<f64> = decode_elements(DataType::I32, &bytes).unwrap();
        assert_eq!(as_f64, vec![1.0, -7.0, 300.0]);

        // 300 and -7 do not fit into u8
        assert!(decode_elements::<u8>(DataType::I32, &bytes).is_err());
    }

    #[test]
    fn test_conversion_on_encode() {
        let bytes = encode_elements(&[0.0f64, 1.0, 2.9], DataType::I32).unwrap();
        let ints: Vec<i32> = decode_elements(DataType::I32, &bytes).unwrap();
        assert_eq!(ints, vec![0, 1, 2]);

        let err = encode_elements(&[f64::NAN], DataType::I64).unwrap_err();
        assert!(matches!(err, NixError::Validation(_)));
    }

    #[test]
    fn test_misaligned_bytes() {
        assert!(decode_elements::<u16>(DataType::U16, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_checksum() {
        let data = b"Hello, world!";
        let checksum = calculate_checksum(data);
        assert!(verify_checksum(data, checksum).is_ok());
        assert!(matches!(
            verify_checksum(data, checksum + 1),
            Err(NixError::ChecksumMismatch { .. })
        ));
        // Standard CRC-32 check value
        assert_eq!(calculate_checksum(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }
}

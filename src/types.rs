//! Core data types for nixio

use num_traits::{NumCast, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Element types supported by DataArray payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    /// Unsigned 8-bit integer
    U8 = 1,
    /// Unsigned 16-bit integer
    U16 = 2,
    /// Unsigned 32-bit integer
    U32 = 3,
    /// Unsigned 64-bit integer
    U64 = 4,
    /// Signed 8-bit integer
    I8 = 5,
    /// Signed 16-bit integer
    I16 = 6,
    /// Signed 32-bit integer
    I32 = 7,
    /// Signed 64-bit integer
    I64 = 8,
    /// 32-bit floating point
    F32 = 9,
    /// 64-bit floating point
    F64 = 10,
}

impl DataType {
    /// All supported element types
    pub const ALL: [DataType; 10] = [
        DataType::U8,
        DataType::U16,
        DataType::U32,
        DataType::U64,
        DataType::I8,
        DataType::I16,
        DataType::I32,
        DataType::I64,
        DataType::F32,
        DataType::F64,
    ];

    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::U64 | DataType::I64 | DataType::F64 => 8,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }

    /// Check if this type carries a sign
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            DataType::I8 | DataType::I16 | DataType::I32 | DataType::I64
        ) || self.is_float()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::U8 => "u8",
            DataType::U16 => "u16",
            DataType::U32 => "u32",
            DataType::U64 => "u64",
            DataType::I8 => "i8",
            DataType::I16 => "i16",
            DataType::I32 => "i32",
            DataType::I64 => "i64",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// A native element type that can be stored in a DataArray payload.
///
/// Payloads are kept as little-endian bytes; implementors know how to move
/// themselves in and out of that representation.
pub trait Element:
    Copy + Default + PartialEq + fmt::Debug + NumCast + ToPrimitive + Send + Sync + 'static
{
    /// The stored element type matching `Self`
    const DATA_TYPE: DataType;

    /// Append the little-endian bytes of `self` to `out`
    fn put_le(self, out: &mut Vec<u8>);

    /// Decode from exactly `DATA_TYPE.size_in_bytes()` little-endian bytes
    fn get_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DATA_TYPE: DataType = DataType::$dtype;

                #[inline]
                fn put_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn get_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_element!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);

/// Globally unique, immutable entity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Allocate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Kind of an entity, used for runtime checks at collection boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Block,
    DataArray,
    Source,
    SimpleTag,
    DataTag,
    Feature,
    Section,
    Property,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How a Feature's data relates to the position/extent of its tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkType {
    /// Feature data is tagged by the same position and extent
    Tagged,
    /// Feature data applies as a whole
    Untagged,
    /// Feature data is indexed by the position index
    Indexed,
}

/// Discriminant of a dimension descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimensionType {
    Sample,
    Range,
    Set,
}

/// Polymorphic key into an ordered entity collection.
///
/// Collections interpret the variants they support and reject the others
/// with a type error: dimensions accept only positions, features accept
/// positions and ids, named collections additionally resolve strings by name.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    /// Position, negative values count from the end
    Index(i64),
    /// Entity id
    Id(EntityId),
    /// Id string or name
    Str(String),
}

impl From<i64> for Key {
    fn from(index: i64) -> Self {
        Key::Index(index)
    }
}

impl From<i32> for Key {
    fn from(index: i32) -> Self {
        Key::Index(index as i64)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index as i64)
    }
}

impl From<EntityId> for Key {
    fn from(id: EntityId) -> Self {
        Key::Id(id)
    }
}

impl From<&EntityId> for Key {
    fn from(id: &EntityId) -> Self {
        Key::Id(*id)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl Key {
    /// Does this key designate the entity with `id` (and optional `name`)?
    pub(crate) fn matches(&self, id: &EntityId, name: Option<&str>) -> bool {
        match self {
            Key::Id(other) => other == id,
            Key::Str(s) => id.to_string() == *s || name == Some(s.as_str()),
            Key::Index(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::U8.size_in_bytes(), 1);
        assert_eq!(DataType::I16.size_in_bytes(), 2);
        assert_eq!(DataType::F32.size_in_bytes(), 4);
        assert_eq!(DataType::F64.size_in_bytes(), 8);
        assert!(DataType::I8.is_signed());
        assert!(!DataType::U64.is_signed());
        assert!(DataType::F32.is_float());
    }

    #[test]
    fn test_element_le_bytes() {
        let mut out = Vec::new();
        (-2i16).put_le(&mut out);
        1.5f32.put_le(&mut out);
        assert_eq!(out.len(), 6);
        assert_eq!(i16::get_le(&out[..2]), -2);
        assert_eq!(f32::get_le(&out[2..]), 1.5);
        assert_eq!(<u32 as Element>::DATA_TYPE, DataType::U32);
    }

    #[test]
    fn test_entity_id_parse() {
        let id = EntityId::generate();
        let parsed: EntityId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert_ne!(id, EntityId::generate());
        assert!("notexist".parse::<EntityId>().is_err());
    }

    #[test]
    fn test_key_matches() {
        let id = EntityId::generate();
        assert!(Key::from(id).matches(&id, None));
        assert!(Key::from(id.to_string()).matches(&id, None));
        assert!(Key::from("signal").matches(&id, Some("signal")));
        assert!(!Key::from("notexist").matches(&id, Some("signal")));
        assert!(!Key::from(0).matches(&id, Some("signal")));
    }
}

//! nixio - hierarchical scientific data store
//!
//! A pure Rust, single-file store for annotated scientific data: typed
//! n-dimensional arrays described by dimensions, tags marking regions in
//! them, provenance sources and a tree of metadata sections.
//!
//! # Features
//!
//! - Blocks grouping DataArrays, Sources, SimpleTags and DataTags
//! - Typed payloads (`i8`..`u64`, `f32`, `f64`) with resize, hyperslab I/O
//!   and optional Deflate/Zstd compression
//! - Sampled, range and set dimension descriptors
//! - Section/Property/Value metadata trees linked to any entity
//! - Self-describing container file, rewritten atomically on flush
//!
//! # Example
//!
//! ```rust,no_run
//! use nixio::prelude::*;
//! use nixio::{DataInit, File, FileMode};
//! use ndarray::Array1;
//!
//! # fn example() -> nixio::Result<()> {
//! let file = File::open("session.nix", FileMode::Overwrite)?;
//! let block = file.create_block("trial 1", "recording")?;
//!
//! let voltage = Array1::linspace(0.0, 1.0, 100);
//! let array = block.create_data_array_with_data(
//!     "membrane voltage",
//!     "signal",
//!     DataInit::new().with_data(voltage.view()),
//! )?;
//! array.append_sampled_dimension(0.1)?;
//!
//! let spike = block.create_simple_tag("spike", "event", &[&array])?;
//! spike.set_position(&[2.5])?;
//! file.close()?;
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod compression;
pub mod data_array;
pub mod data_tag;
pub mod dimension;
pub mod error;
pub mod feature;
pub mod file;
pub mod format;
pub mod io;
pub mod links;
pub mod options;
pub mod section;
pub mod source;
pub mod tag;
pub mod types;
pub mod utils;

mod entity;
mod handle;
mod layout;
mod payload;
mod registry;
mod store;
mod tree;

// Re-exports
pub use block::Block;
pub use compression::{CompressionLevel, CompressionMethod};
pub use data_array::{DataArray, DataInit};
pub use data_tag::DataTag;
pub use dimension::{
    Dimension, DimensionDescriptor, Dimensions, RangeAxis, RangeDimension, SampledAxis,
    SampledDimension, SetAxis, SetDimension,
};
pub use error::{ErrorKind, NixError, Result};
pub use feature::{Feature, Features};
pub use file::{File, FileMode};
pub use format::FormatVersion;
pub use handle::{EntityHandle, EntityWithMetadata, HasTypedPayload, NamedEntity};
pub use io::{FileSystemBackend, MemoryBackend, StorageBackend};
pub use links::{LinkList, LinkTarget};
pub use options::FileOptions;
pub use section::{Property, Scalar, Section, Value, ValueType};
pub use source::Source;
pub use tag::SimpleTag;
pub use types::{DataType, DimensionType, Element, EntityId, EntityKind, Key, LinkType};

/// Traits needed to call the common entity methods
pub mod prelude {
    pub use crate::handle::{EntityHandle, EntityWithMetadata, HasTypedPayload, NamedEntity};
}

/// Version of the nixio implementation
pub const NIX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Magic number at the start of every container
pub const NIX_MAGIC: &[u8; 4] = b"NIX\0";

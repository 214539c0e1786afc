//! Row-major layout of n-dimensional payloads: strides, hyperslab copies and
//! in-place resizing.

use crate::error::{NixError, Result};
use serde::{Deserialize, Serialize};

/// Number of elements held by an extent. A rank-0 extent holds one element.
///
/// Extents reaching this function have passed [`byte_len`], so the product
/// fits in a `usize`.
pub fn element_count(extent: &[usize]) -> usize {
    extent.iter().product()
}

/// Size in bytes of an extent of `elem_size`-byte elements, or a validation
/// error if it does not fit in memory
pub fn byte_len(extent: &[usize], elem_size: usize) -> Result<usize> {
    extent
        .iter()
        .try_fold(elem_size, |acc, &n| acc.checked_mul(n))
        .ok_or_else(|| NixError::validation(format!("extent {:?} is too large", extent)))
}

/// Row-major strides, in elements
pub fn strides(extent: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; extent.len()];
    for i in (0..extent.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * extent[i + 1];
    }
    strides
}

/// Convert a linear element index to coordinates
pub fn index_to_coords(extent: &[usize], index: usize) -> Vec<usize> {
    let mut remaining = index;
    strides(extent)
        .iter()
        .map(|&stride| {
            let coord = remaining / stride;
            remaining %= stride;
            coord
        })
        .collect()
}

/// A rectangular selection within an extent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub offset: Vec<usize>,
    pub count: Vec<usize>,
}

impl Region {
    pub fn new(offset: Vec<usize>, count: Vec<usize>) -> Self {
        Self { offset, count }
    }

    /// The region covering a whole extent
    pub fn full(extent: &[usize]) -> Self {
        Self {
            offset: vec![0; extent.len()],
            count: extent.to_vec(),
        }
    }

    /// Number of elements selected
    pub fn element_count(&self) -> usize {
        element_count(&self.count)
    }

    /// Check the region against an extent
    pub fn validate(&self, extent: &[usize]) -> Result<()> {
        if self.offset.len() != extent.len() || self.count.len() != extent.len() {
            return Err(NixError::validation(format!(
                "region of rank {}/{} does not match extent of rank {}",
                self.offset.len(),
                self.count.len(),
                extent.len()
            )));
        }

        for ((&off, &cnt), &ext) in self.offset.iter().zip(&self.count).zip(extent) {
            let end = off.checked_add(cnt);
            if end.map_or(true, |end| end > ext) {
                let end = end.unwrap_or(usize::MAX);
                return Err(NixError::OutOfBounds {
                    index: i64::try_from(end).unwrap_or(i64::MAX),
                    len: ext,
                });
            }
        }
        Ok(())
    }
}

/// Call `f(src_row_start, dst_row_start)` in elements for every contiguous
/// innermost row of `region`, where sources are addressed in `src_extent`
/// (offset by `region.offset`) and destinations densely in `region.count`.
fn for_each_row<F>(src_extent: &[usize], region: &Region, mut f: F)
where
    F: FnMut(usize, usize),
{
    if region.element_count() == 0 {
        return;
    }
    let rank = src_extent.len();
    if rank == 0 {
        f(0, 0);
        return;
    }

    let src_strides = strides(src_extent);
    let dst_strides = strides(&region.count);
    let outer = rank - 1;
    let mut coords = vec![0usize; outer];

    loop {
        let src: usize = (0..outer)
            .map(|d| (region.offset[d] + coords[d]) * src_strides[d])
            .sum::<usize>()
            + region.offset[outer];
        let dst: usize = (0..outer).map(|d| coords[d] * dst_strides[d]).sum();
        f(src, dst);

        // Increment coordinates, last outer axis fastest
        let mut dim = outer;
        loop {
            if dim == 0 {
                return;
            }
            dim -= 1;
            coords[dim] += 1;
            if coords[dim] < region.count[dim] {
                break;
            }
            coords[dim] = 0;
        }
    }
}

/// Copy the bytes of `region` out of a payload laid out as `extent`
pub fn read_region(bytes: &[u8], extent: &[usize], region: &Region, elem_size: usize) -> Vec<u8> {
    let mut out = vec![0u8; region.element_count() * elem_size];
    let row = region.count.last().copied().unwrap_or(1) * elem_size;

    for_each_row(extent, region, |src, dst| {
        let (s, d) = (src * elem_size, dst * elem_size);
        out[d..d + row].copy_from_slice(&bytes[s..s + row]);
    });
    out
}

/// Copy densely packed `data` into `region` of a payload laid out as `extent`
pub fn write_region(
    bytes: &mut [u8],
    extent: &[usize],
    region: &Region,
    data: &[u8],
    elem_size: usize,
) {
    let row = region.count.last().copied().unwrap_or(1) * elem_size;

    for_each_row(extent, region, |dst, src| {
        let (d, s) = (dst * elem_size, src * elem_size);
        bytes[d..d + row].copy_from_slice(&data[s..s + row]);
    });
}

/// Re-lay a payload from `old` to `new` extent. Overlapping elements keep
/// their coordinates; new elements are zero bytes.
pub fn resize(bytes: &[u8], old: &[usize], new: &[usize], elem_size: usize) -> Vec<u8> {
    let mut out = vec![0u8; element_count(new) * elem_size];
    let overlap: Vec<usize> = old.iter().zip(new).map(|(&a, &b)| a.min(b)).collect();
    let region = Region::full(&overlap);
    let row = overlap.last().copied().unwrap_or(1) * elem_size;
    let new_strides = strides(new);

    for_each_row(old, &region, |src, dense| {
        let coords = index_to_coords(&overlap, dense);
        let dst: usize = coords.iter().zip(&new_strides).map(|(c, s)| c * s).sum();
        let (s, d) = (src * elem_size, dst * elem_size);
        out[d..d + row].copy_from_slice(&bytes[s..s + row]);
    });
    out
}

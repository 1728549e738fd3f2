//! Change detection between two classified rasters
//!
//! Any class transition counts as change; there is no spatial or temporal
//! smoothing.

use std::collections::BTreeMap;
use ndarray::Array2;
use crate::maybe_rayon::*;
use lulc_core::raster::Raster;
use lulc_core::{Error, Result};

/// Change mask value: class differs between the two dates
pub const CHANGE: u8 = 1;
/// Change mask value: same class on both dates
pub const NO_CHANGE: u8 = 0;
/// Change mask value: either date has no class
pub const CHANGE_NODATA: u8 = u8::MAX;

/// Pixelwise inequality of two class rasters.
///
/// Output is `CHANGE` / `NO_CHANGE`, or `CHANGE_NODATA` where either input
/// is nodata. The operation is symmetric in its arguments.
pub fn class_change(before: &Raster<i32>, after: &Raster<i32>) -> Result<Raster<u8>> {
    before.check_shape(after)?;
    let (rows, cols) = before.shape();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![CHANGE_NODATA; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let b = unsafe { before.get_unchecked(row, col) };
                let a = unsafe { after.get_unchecked(row, col) };
                if before.is_nodata(b) || after.is_nodata(a) {
                    continue;
                }
                *out = if a != b { CHANGE } else { NO_CHANGE };
            }
            row_data
        })
        .collect();

    let mut mask = before.with_same_meta::<u8>();
    mask.set_nodata(Some(CHANGE_NODATA));
    *mask.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(mask)
}

/// Number of `CHANGE` pixels in a change mask
pub fn changed_pixel_count(mask: &Raster<u8>) -> usize {
    mask.data().iter().filter(|&&v| v == CHANGE).count()
}

/// Pixel counts of every (from, to) class pair between two dates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionMatrix {
    counts: BTreeMap<(i32, i32), u64>,
}

impl TransitionMatrix {
    /// Pixels that went from `from` to `to`
    pub fn count(&self, from: i32, to: i32) -> u64 {
        self.counts.get(&(from, to)).copied().unwrap_or(0)
    }

    /// Non-zero transitions in (from, to) order
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32, u64)> + '_ {
        self.counts.iter().map(|(&(f, t), &n)| (f, t, n))
    }

    /// Pixels whose class changed
    pub fn changed(&self) -> u64 {
        self.iter().filter(|(f, t, _)| f != t).map(|(_, _, n)| n).sum()
    }

    /// All counted pixels
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Count from/to class transitions, skipping nodata in either raster
pub fn transition_matrix(before: &Raster<i32>, after: &Raster<i32>) -> Result<TransitionMatrix> {
    before.check_shape(after)?;
    let mut counts = BTreeMap::new();
    for (&b, &a) in before.data().iter().zip(after.data().iter()) {
        if before.is_nodata(b) || after.is_nodata(a) {
            continue;
        }
        *counts.entry((b, a)).or_insert(0u64) += 1;
    }
    Ok(TransitionMatrix { counts })
}

//! Per-class area aggregation
//!
//! For every requested class value the classified raster is masked to that
//! value, weighted by the ground area of each pixel and summed inside the
//! region. Class values that are present but not requested are reported as
//! warnings rather than dropped silently.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use ndarray::s;
use serde::{Deserialize, Serialize};
use tracing::warn;

use lulc_core::{Aoi, Error, Raster, Result};

/// Parameters for [`class_areas`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaParams {
    /// Reduction scale in meters; coarser than the native resolution means
    /// nearest-neighbour resampling first
    pub scale: Option<f64>,
    /// Maximum number of pixels the reduction may visit
    pub max_pixels: u64,
}

impl Default for AreaParams {
    fn default() -> Self {
        Self {
            scale: None,
            max_pixels: 1_000_000_000,
        }
    }
}

/// Ordered mapping from class key to hectares
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaTable {
    entries: Vec<(String, f64)>,
}

impl AreaTable {
    /// Hectares for a class key
    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Areas in key order
    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, v)| v).sum()
    }
}

impl fmt::Display for AreaTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v:.4}")?;
        }
        write!(f, "}}")
    }
}

/// A class value found in the raster but absent from the requested list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmappedClassWarning {
    pub value: i32,
    pub pixel_count: u64,
}

impl fmt::Display for UnmappedClassWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "class value {} is not in the class list ({} pixels ignored)",
            self.value, self.pixel_count
        )
    }
}

/// Areas plus any non-fatal findings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaReport {
    pub table: AreaTable,
    pub warnings: Vec<UnmappedClassWarning>,
}

/// Area in hectares of each class in `classes`, inside `region` (the whole
/// raster when `None`).
///
/// Keys are the decimal forms of the class values, in the order given.
/// Duplicate class values are rejected. Classes with no pixels get 0.
pub fn class_areas(
    classified: &Raster<i32>,
    classes: &[i32],
    region: Option<&Aoi>,
    params: &AreaParams,
) -> Result<AreaReport> {
    let mut slots: HashMap<i32, usize> = HashMap::with_capacity(classes.len());
    for (i, &c) in classes.iter().enumerate() {
        if slots.insert(c, i).is_some() {
            return Err(Error::InvalidParameter {
                name: "classes",
                value: c.to_string(),
                reason: "duplicate class value".into(),
            });
        }
    }

    let stride = params
        .scale
        .map_or(1, |s| classified.stride_for_scale(s));
    let (rows, cols) = classified.shape();
    let mask = region.map(|aoi| aoi.mask(classified));
    let pixel_area = classified.pixel_area_hectares();

    // One block per output cell at the reduction scale. Edge blocks are
    // clipped to the raster, and a block counts the ground area of the
    // source cells it covers.
    let blocks: Vec<(usize, usize, usize, usize)> = (0..rows)
        .step_by(stride)
        .flat_map(|r0| (0..cols).step_by(stride).map(move |c0| (r0, c0)))
        .map(|(r0, c0)| (r0, (r0 + stride).min(rows), c0, (c0 + stride).min(cols)))
        .collect();
    let center = |(r0, r1, c0, c1): (usize, usize, usize, usize)| (r0 + (r1 - r0) / 2, c0 + (c1 - c0) / 2);
    let in_region = |cell: (usize, usize)| mask.as_ref().map_or(true, |m| m.data()[cell] == 1);

    let region_pixels = blocks.iter().filter(|&&b| in_region(center(b))).count() as u64;
    if region_pixels > params.max_pixels {
        return Err(Error::TooManyPixels {
            count: region_pixels,
            max: params.max_pixels,
        });
    }

    let mut sums = vec![0.0f64; classes.len()];
    let mut unmapped: BTreeMap<i32, u64> = BTreeMap::new();

    for &block in &blocks {
        let cell = center(block);
        let value = classified.data()[cell];
        if classified.is_nodata(value) || !in_region(cell) {
            continue;
        }
        let (r0, r1, c0, c1) = block;
        match slots.get(&value) {
            Some(&slot) => {
                sums[slot] += pixel_area
                    .data()
                    .slice(s![r0..r1, c0..c1])
                    .sum();
            }
            None => *unmapped.entry(value).or_insert(0) += 1,
        }
    }

    let warnings: Vec<UnmappedClassWarning> = unmapped
        .into_iter()
        .map(|(value, pixel_count)| UnmappedClassWarning { value, pixel_count })
        .collect();
    for w in &warnings {
        warn!("{}", w);
    }

    let entries = classes
        .iter()
        .map(|c| c.to_string())
        .zip(sums)
        .collect();

    Ok(AreaReport {
        table: AreaTable { entries },
        warnings,
    })
}

//! Multi-band images

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};

/// A named band of an [`Image`]
#[derive(Debug, Clone)]
pub struct Band {
    pub name: String,
    pub raster: Raster<f64>,
}

impl Band {
    pub fn new(name: impl Into<String>, raster: Raster<f64>) -> Self {
        Self {
            name: name.into(),
            raster,
        }
    }
}

/// An ordered set of named `f64` bands sharing one grid.
///
/// NaN marks missing data in every band. Composites, index images and
/// per-scene reflectance stacks are all `Image`s.
#[derive(Debug, Clone)]
pub struct Image {
    bands: Vec<Band>,
}

impl Image {
    /// Build an image, checking band names are unique and shapes agree
    pub fn new(bands: Vec<Band>) -> Result<Self> {
        if bands.is_empty() {
            return Err(Error::InvalidParameter {
                name: "bands",
                value: "[]".into(),
                reason: "an image needs at least one band".into(),
            });
        }
        let first = &bands[0].raster;
        for (i, band) in bands.iter().enumerate() {
            first.check_shape(&band.raster)?;
            if bands[..i].iter().any(|b| b.name == band.name) {
                return Err(Error::DuplicateBand(band.name.clone()));
            }
        }
        Ok(Self { bands })
    }

    /// Single-band image
    pub fn from_band(name: impl Into<String>, raster: Raster<f64>) -> Self {
        Self {
            bands: vec![Band::new(name, raster)],
        }
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    /// Look up a band by name
    pub fn band(&self, name: &str) -> Result<&Raster<f64>> {
        self.bands
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.raster)
            .ok_or_else(|| Error::MissingBand {
                name: name.to_string(),
                available: self.band_names().join(","),
            })
    }

    /// New image with the named bands, in the requested order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Image> {
        let bands = names
            .iter()
            .map(|n| Ok(Band::new(n.as_ref(), self.band(n.as_ref())?.clone())))
            .collect::<Result<Vec<_>>>()?;
        Image::new(bands)
    }

    /// Reference grid (first band)
    pub fn grid(&self) -> &Raster<f64> {
        &self.bands[0].raster
    }

    pub fn shape(&self) -> (usize, usize) {
        self.grid().shape()
    }

    pub fn transform(&self) -> &GeoTransform {
        self.grid().transform()
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.grid().crs()
    }

    /// Fill `out` with the pixel vector at `(row, col)`.
    ///
    /// Returns false when any band is NaN there. Bounds are the caller's
    /// responsibility.
    pub fn pixel_into(&self, row: usize, col: usize, out: &mut Vec<f64>) -> bool {
        out.clear();
        for band in &self.bands {
            let v = unsafe { band.raster.get_unchecked(row, col) };
            if v.is_nan() {
                return false;
            }
            out.push(v);
        }
        true
    }

    /// Number of pixels where every band holds data
    pub fn valid_pixel_count(&self) -> usize {
        let (rows, cols) = self.shape();
        let mut buf = Vec::with_capacity(self.bands.len());
        let mut count = 0;
        for r in 0..rows {
            for c in 0..cols {
                if self.pixel_into(r, c, &mut buf) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Mask every band with `mask`; cells where the mask is 0 become NaN
    pub fn clip(&self, mask: &Raster<u8>) -> Result<Image> {
        let bands = self
            .bands
            .iter()
            .map(|b| {
                let mut raster = b
                    .raster
                    .zip_map(mask, |v, m| if m == 1 { v } else { f64::NAN })?;
                raster.set_nodata(Some(f64::NAN));
                Ok(Band::new(b.name.clone(), raster))
            })
            .collect::<Result<Vec<_>>>()?;
        Image::new(bands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_band() -> Image {
        Image::new(vec![
            Band::new("B4", Raster::filled(3, 3, 0.1)),
            Band::new("B8", Raster::filled(3, 3, 0.5)),
        ])
        .unwrap()
    }

    #[test]
    fn test_select_reorders() {
        let img = two_band().select(&["B8", "B4"]).unwrap();
        assert_eq!(img.band_names(), vec!["B8", "B4"]);
    }

    #[test]
    fn test_missing_band_lists_available() {
        let err = two_band().select(&["B2"]).unwrap_err();
        assert!(err.to_string().contains("B4,B8"));
    }

    #[test]
    fn test_duplicate_and_mismatched_bands_rejected() {
        assert!(Image::new(vec![
            Band::new("A", Raster::new(2, 2)),
            Band::new("A", Raster::new(2, 2)),
        ])
        .is_err());
        assert!(Image::new(vec![
            Band::new("A", Raster::new(2, 2)),
            Band::new("B", Raster::new(3, 2)),
        ])
        .is_err());
    }

    #[test]
    fn test_clip_and_valid_count() {
        let mut mask: Raster<u8> = Raster::filled(3, 3, 1);
        mask.set(0, 0, 0).unwrap();
        let clipped = two_band().clip(&mask).unwrap();
        assert_eq!(clipped.valid_pixel_count(), 8);
        let mut buf = Vec::new();
        assert!(!clipped.pixel_into(0, 0, &mut buf));
        assert!(clipped.pixel_into(1, 1, &mut buf));
        assert_eq!(buf, vec![0.1, 0.5]);
    }
}

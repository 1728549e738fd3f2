//! Normalized-difference spectral indices

use ndarray::Array2;
use crate::maybe_rayon::*;
use lulc_core::raster::Raster;
use lulc_core::{Error, Image, Result};

/// Compute the normalized difference between two bands:
///
/// `(band_a - band_b) / (band_a + band_b)`
///
/// Result is in the range [-1, 1]. Pixels where both bands are zero
/// or either is nodata are set to NaN.
pub fn normalized_difference(band_a: &Raster<f64>, band_b: &Raster<f64>) -> Result<Raster<f64>> {
    band_a.check_shape(band_b)?;

    let (rows, cols) = band_a.shape();
    let nodata_a = band_a.nodata();
    let nodata_b = band_b.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let a = unsafe { band_a.get_unchecked(row, col) };
                let b = unsafe { band_b.get_unchecked(row, col) };

                if is_nodata_f64(a, nodata_a) || is_nodata_f64(b, nodata_b) {
                    continue;
                }

                let sum = a + b;
                if sum.abs() < 1e-10 {
                    continue;
                }

                *out = (a - b) / sum;
            }
            row_data
        })
        .collect();

    build_output(band_a, data)
}

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red)`
///
/// Dense vegetation sits around 0.6 to 0.9, bare soil near 0.1 to 0.2 and
/// water below 0.
pub fn ndvi(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, red)
}

/// Normalized difference of two named bands of an image, as a one-band
/// image called `name`
pub fn normalized_difference_image(image: &Image, band_a: &str, band_b: &str, name: &str) -> Result<Image> {
    let nd = normalized_difference(image.band(band_a)?, image.band(band_b)?)?;
    Ok(Image::from_band(name, nd))
}

fn is_nodata_f64(value: f64, nodata: Option<f64>) -> bool {
    if value.is_nan() {
        return true;
    }
    match nodata {
        Some(nd) if !nd.is_nan() => (value - nd).abs() < f64::EPSILON,
        _ => false,
    }
}

fn build_output(template: &Raster<f64>, data: Vec<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = template.shape();
    let mut output = template.with_same_meta::<f64>();
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

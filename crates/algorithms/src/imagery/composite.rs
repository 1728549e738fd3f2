//! Per-pixel median compositing of an image stack

use ndarray::Array2;
use crate::maybe_rayon::*;
use lulc_core::{Band, Error, Image, Result};

/// Median composite of a stack of images.
///
/// Every image must carry the bands of the first one on the same grid.
/// For each band and pixel the median of the non-NaN values is taken; even
/// counts average the two middle values. Pixels with no valid value stay NaN.
pub fn median_composite(images: &[Image]) -> Result<Image> {
    let first = images.first().ok_or_else(|| Error::InvalidParameter {
        name: "images",
        value: "[]".into(),
        reason: "median composite needs at least one image".into(),
    })?;

    let names: Vec<String> = first.band_names().iter().map(|s| s.to_string()).collect();
    let (rows, cols) = first.shape();

    let mut bands = Vec::with_capacity(names.len());
    for name in &names {
        let stack = images
            .iter()
            .map(|img| {
                let r = img.band(name)?;
                first.grid().check_shape(r)?;
                Ok(r)
            })
            .collect::<Result<Vec<_>>>()?;

        let data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut values = Vec::with_capacity(stack.len());
                let mut row_data = vec![f64::NAN; cols];
                for (col, out) in row_data.iter_mut().enumerate() {
                    values.clear();
                    for r in &stack {
                        let v = unsafe { r.get_unchecked(row, col) };
                        if v.is_finite() {
                            values.push(v);
                        }
                    }
                    if let Some(m) = median(&mut values) {
                        *out = m;
                    }
                }
                row_data
            })
            .collect();

        let mut raster = first.grid().with_same_meta::<f64>();
        raster.set_nodata(Some(f64::NAN));
        *raster.data_mut() =
            Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
        bands.push(Band::new(name.clone(), raster));
    }

    Image::new(bands)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    Some(if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lulc_core::Raster;

    fn scene(b4: f64, b8: f64) -> Image {
        Image::new(vec![
            Band::new("B4", Raster::filled(2, 2, b4)),
            Band::new("B8", Raster::filled(2, 2, b8)),
        ])
        .unwrap()
    }

    #[test]
    fn test_median_odd_and_even() {
        let odd = median_composite(&[scene(1.0, 10.0), scene(5.0, 30.0), scene(3.0, 20.0)]).unwrap();
        assert_eq!(odd.band("B4").unwrap().get(0, 0).unwrap(), 3.0);
        assert_eq!(odd.band("B8").unwrap().get(1, 1).unwrap(), 20.0);

        let even = median_composite(&[scene(1.0, 10.0), scene(4.0, 40.0)]).unwrap();
        assert_eq!(even.band("B4").unwrap().get(0, 0).unwrap(), 2.5);
    }

    #[test]
    fn test_median_skips_clouded_pixels() {
        let mut cloudy = scene(100.0, 100.0);
        let mut b4 = cloudy.band("B4").unwrap().clone();
        b4.set(0, 0, f64::NAN).unwrap();
        cloudy = Image::new(vec![Band::new("B4", b4), Band::new("B8", cloudy.band("B8").unwrap().clone())]).unwrap();

        let out = median_composite(&[cloudy, scene(2.0, 2.0)]).unwrap();
        assert_eq!(out.band("B4").unwrap().get(0, 0).unwrap(), 2.0);
        assert_eq!(out.band("B4").unwrap().get(0, 1).unwrap(), 51.0);
    }

    #[test]
    fn test_empty_stack_is_error() {
        assert!(median_composite(&[]).is_err());
    }

    #[test]
    fn test_missing_band_in_later_scene() {
        let partial = Image::from_band("B4", Raster::filled(2, 2, 1.0));
        assert!(median_composite(&[scene(1.0, 1.0), partial]).is_err());
    }
}

//! Image-to-RGBA rendering from visualization parameters.

use serde::{Deserialize, Serialize};

use crate::error::{ColormapError, Result};
use crate::palette::{Palette, Rgb};
use lulc_core::raster::{Raster, RasterElement};
use lulc_core::Image;

/// How an image is turned into colors: one band through a palette (or
/// grayscale), or three bands as red, green and blue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    /// One or three band names
    pub bands: Vec<String>,
    /// Value mapped to the low end of the ramp
    pub min: f64,
    /// Value mapped to the high end of the ramp
    pub max: f64,
    /// Gamma correction applied after stretching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    /// Color names or hex strings, single-band only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Vec<String>>,
}

impl VisParams {
    /// Three-band composite
    pub fn rgb(bands: [&str; 3], min: f64, max: f64, gamma: Option<f64>) -> Self {
        Self {
            bands: bands.iter().map(|b| b.to_string()).collect(),
            min,
            max,
            gamma,
            palette: None,
        }
    }

    /// Single band through a palette
    pub fn palette<S: AsRef<str>>(band: &str, min: f64, max: f64, colors: &[S]) -> Self {
        Self {
            bands: vec![band.to_string()],
            min,
            max,
            gamma: None,
            palette: Some(colors.iter().map(|c| c.as_ref().to_string()).collect()),
        }
    }

    /// Check band count, range, gamma and palette colors
    pub fn validate(&self) -> Result<()> {
        if self.bands.len() != 1 && self.bands.len() != 3 {
            return Err(ColormapError::InvalidVis(format!(
                "expected 1 or 3 bands, got {}",
                self.bands.len()
            )));
        }
        if !(self.max > self.min) {
            return Err(ColormapError::InvalidVis(format!(
                "max ({}) must exceed min ({})",
                self.max, self.min
            )));
        }
        if let Some(g) = self.gamma {
            if !(g > 0.0) {
                return Err(ColormapError::InvalidVis(format!("gamma must be positive, got {g}")));
            }
        }
        if let Some(p) = &self.palette {
            if self.bands.len() == 3 {
                return Err(ColormapError::InvalidVis("palette requires a single band".into()));
            }
            Palette::parse(p)?;
        }
        Ok(())
    }

    fn stretch(&self, v: f64) -> f64 {
        let t = ((v - self.min) / (self.max - self.min)).clamp(0.0, 1.0);
        match self.gamma {
            Some(g) => t.powf(1.0 / g),
            None => t,
        }
    }
}

/// Render the bands named in `vis` to a row-major RGBA buffer.
///
/// Pixels where any used band is NaN are transparent.
pub fn render_image(image: &Image, vis: &VisParams) -> Result<Vec<u8>> {
    vis.validate()?;
    let bands = vis
        .bands
        .iter()
        .map(|b| image.band(b))
        .collect::<lulc_core::Result<Vec<_>>>()?;

    if bands.len() == 1 {
        return render_raster(bands[0], vis);
    }

    let (rows, cols) = image.shape();
    let mut rgba = vec![0u8; rows * cols * 4];
    for (i, px) in rgba.chunks_exact_mut(4).enumerate() {
        let (r, c) = (i / cols, i % cols);
        let mut channels = [0u8; 3];
        let mut valid = true;
        for (ch, band) in channels.iter_mut().zip(&bands) {
            let v = unsafe { band.get_unchecked(r, c) };
            if !v.is_finite() {
                valid = false;
                break;
            }
            *ch = (vis.stretch(v) * 255.0).round() as u8;
        }
        if valid {
            px.copy_from_slice(&[channels[0], channels[1], channels[2], 255]);
        }
    }
    Ok(rgba)
}

/// Render one raster with a palette (grayscale without one).
///
/// Nodata cells are transparent; the first element of `vis.bands` is only a
/// label here.
pub fn render_raster<T: RasterElement>(raster: &Raster<T>, vis: &VisParams) -> Result<Vec<u8>> {
    vis.validate()?;
    let palette = match &vis.palette {
        Some(p) => Palette::parse(p)?,
        None => Palette::new(vec![Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)])?,
    };
    let nodata = raster.nodata();

    let mut rgba = vec![0u8; raster.len() * 4];
    for (px, val) in rgba.chunks_exact_mut(4).zip(raster.data().iter()) {
        if val.is_nodata(nodata) {
            continue;
        }
        if let Some(v) = val.to_f64().filter(|v| v.is_finite()) {
            let Rgb { r, g, b } = palette.evaluate(vis.stretch(v));
            px.copy_from_slice(&[r, g, b, 255]);
        }
    }
    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lulc_core::Band;

    #[test]
    fn grayscale_single_band() {
        let mut r = Raster::<f64>::new(2, 2);
        r.set(0, 1, 0.5).unwrap();
        r.set(1, 0, 1.0).unwrap();
        r.set(1, 1, f64::NAN).unwrap();
        r.set_nodata(Some(f64::NAN));

        let vis = VisParams {
            bands: vec!["x".into()],
            min: 0.0,
            max: 1.0,
            gamma: None,
            palette: None,
        };
        let rgba = render_raster(&r, &vis).unwrap();
        assert_eq!(rgba.len(), 16);
        assert_eq!(&rgba[0..4], &[0, 0, 0, 255]);
        assert_eq!(&rgba[4..8], &[128, 128, 128, 255]);
        assert_eq!(&rgba[8..12], &[255, 255, 255, 255]);
        assert_eq!(&rgba[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn class_palette_on_integers() {
        let mut r = Raster::from_vec(vec![0i32, 1, 2, 3], 1, 4).unwrap();
        r.set_nodata(Some(i32::MIN));
        let vis = VisParams::palette("classification", 0.0, 3.0, &["black", "green", "brown", "blue"]);
        let rgba = render_raster(&r, &vis).unwrap();
        assert_eq!(&rgba[4..8], &[0, 128, 0, 255]);
        assert_eq!(&rgba[12..16], &[0, 0, 255, 255]);
    }

    #[test]
    fn true_color_with_gamma() {
        let img = Image::new(vec![
            Band::new("B4", Raster::filled(1, 1, 3000.0)),
            Band::new("B3", Raster::filled(1, 1, 750.0)),
            Band::new("B2", Raster::filled(1, 1, -5.0)),
        ])
        .unwrap();
        let vis = VisParams::rgb(["B4", "B3", "B2"], 0.0, 3000.0, Some(1.4));
        let rgba = render_image(&img, &vis).unwrap();
        let expected_g = (0.25f64.powf(1.0 / 1.4) * 255.0).round() as u8;
        assert_eq!(rgba, vec![255, expected_g, 0, 255]);
    }

    #[test]
    fn invalid_vis_rejected() {
        let img = Image::from_band("a", Raster::filled(1, 1, 0.0));
        let mut vis = VisParams::palette("a", 1.0, 0.0, &["red"]);
        assert!(render_image(&img, &vis).is_err());
        vis.max = 2.0;
        vis.palette = Some(vec!["nope".into()]);
        assert!(render_image(&img, &vis).is_err());
        assert!(render_image(&img, &VisParams::palette("missing", 0.0, 1.0, &["red"])).is_err());
    }
}

//! Coordinate reference systems and per-pixel ground area

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean Earth radius used for geographic cell areas (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Square meters per hectare
pub const M2_PER_HECTARE: f64 = 10_000.0;

/// Coordinate Reference System, identified by EPSG code.
///
/// Only the distinction that matters for area computation is modelled:
/// geographic systems (degrees) versus projected systems (meters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CRS {
    epsg: u32,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self { epsg: code }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// UTM zone on WGS84, e.g. `utm(36, false)` is EPSG:32736
    pub fn utm(zone: u8, north: bool) -> Self {
        let base = if north { 32600 } else { 32700 };
        Self::from_epsg(base + zone as u32)
    }

    /// EPSG code
    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Whether coordinates are longitude/latitude degrees
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, 4326 | 4269 | 4258 | 4674)
    }

    /// Ground area in square meters of a cell spanning `dx` horizontally and
    /// bounded by `y_top` / `y_bottom` vertically (both in CRS units).
    ///
    /// For geographic systems the spherical zone formula is used:
    /// `R² · Δλ · |sin φ₁ − sin φ₂|`.
    pub fn cell_area_m2(&self, dx: f64, y_top: f64, y_bottom: f64) -> f64 {
        if self.is_geographic() {
            let dlon = dx.abs().to_radians();
            let s1 = y_top.to_radians().sin();
            let s2 = y_bottom.to_radians().sin();
            EARTH_RADIUS_M * EARTH_RADIUS_M * dlon * (s1 - s2).abs()
        } else {
            (dx * (y_top - y_bottom)).abs()
        }
    }

    /// Approximate ground length in meters of `units` CRS units at latitude `lat`
    pub fn units_to_meters(&self, units: f64, lat: f64) -> f64 {
        if self.is_geographic() {
            units.abs().to_radians() * EARTH_RADIUS_M * lat.to_radians().cos().abs()
        } else {
            units.abs()
        }
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        format!("EPSG:{}", self.epsg)
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::utm(36, false);
        assert_eq!(crs.epsg(), 32736);
        assert_eq!(crs.identifier(), "EPSG:32736");
        assert!(!crs.is_geographic());
        assert!(CRS::wgs84().is_geographic());
    }

    #[test]
    fn test_projected_cell_area() {
        let crs = CRS::utm(36, false);
        assert_relative_eq!(crs.cell_area_m2(10.0, 100.0, 90.0), 100.0);
    }

    #[test]
    fn test_geographic_cell_area_shrinks_poleward() {
        let crs = CRS::wgs84();
        let equator = crs.cell_area_m2(0.001, 0.0005, -0.0005);
        let high = crs.cell_area_m2(0.001, 60.0005, 59.9995);
        assert!(equator > high);
        // Roughly half at 60 degrees
        assert_relative_eq!(high / equator, 0.5, epsilon = 1e-3);
        // ~111 m x ~111 m at the equator
        assert_relative_eq!(equator, 12_364.0, epsilon = 20.0);
    }
}

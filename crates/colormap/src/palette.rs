//! Colors, color stops and palettes with multi-stop interpolation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ColormapError, Result};

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// CSS color keywords used by map palettes
const NAMED: &[(&str, Rgb)] = &[
    ("black", Rgb::new(0, 0, 0)),
    ("white", Rgb::new(255, 255, 255)),
    ("red", Rgb::new(255, 0, 0)),
    ("green", Rgb::new(0, 128, 0)),
    ("lime", Rgb::new(0, 255, 0)),
    ("blue", Rgb::new(0, 0, 255)),
    ("yellow", Rgb::new(255, 255, 0)),
    ("cyan", Rgb::new(0, 255, 255)),
    ("aqua", Rgb::new(0, 255, 255)),
    ("magenta", Rgb::new(255, 0, 255)),
    ("fuchsia", Rgb::new(255, 0, 255)),
    ("gray", Rgb::new(128, 128, 128)),
    ("grey", Rgb::new(128, 128, 128)),
    ("silver", Rgb::new(192, 192, 192)),
    ("maroon", Rgb::new(128, 0, 0)),
    ("olive", Rgb::new(128, 128, 0)),
    ("navy", Rgb::new(0, 0, 128)),
    ("purple", Rgb::new(128, 0, 128)),
    ("teal", Rgb::new(0, 128, 128)),
    ("orange", Rgb::new(255, 165, 0)),
    ("brown", Rgb::new(165, 42, 42)),
    ("tan", Rgb::new(210, 180, 140)),
    ("darkgreen", Rgb::new(0, 100, 0)),
    ("forestgreen", Rgb::new(34, 139, 34)),
    ("darkblue", Rgb::new(0, 0, 139)),
    ("beige", Rgb::new(245, 245, 220)),
];

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a CSS color keyword or a hex color (`#rgb`, `#rrggbb`, with or
    /// without the leading `#`).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();
        if let Some((_, c)) = NAMED.iter().find(|(name, _)| *name == lower) {
            return Ok(*c);
        }

        let hex = lower.strip_prefix('#').unwrap_or(&lower);
        let digits: Vec<u8> = hex
            .chars()
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<_>>()
            .ok_or_else(|| ColormapError::InvalidColor(s.to_string()))?;
        match digits.as_slice() {
            [r, g, b] => Ok(Rgb::new(r * 17, g * 17, b * 17)),
            [r1, r2, g1, g2, b1, b2] => Ok(Rgb::new(r1 * 16 + r2, g1 * 16 + g2, b1 * 16 + b2)),
            _ => Err(ColormapError::InvalidColor(s.to_string())),
        }
    }

    /// `#rrggbb`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Rgb {
    type Err = ColormapError;

    fn from_str(s: &str) -> Result<Self> {
        Rgb::parse(s)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Rgb::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A color stop: position in [0, 1] mapped to an RGB color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub t: f64,
    pub color: Rgb,
}

/// Ordered colors spread evenly over [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    stops: Vec<ColorStop>,
}

impl Palette {
    pub fn new(colors: Vec<Rgb>) -> Result<Self> {
        if colors.is_empty() {
            return Err(ColormapError::InvalidVis("empty palette".into()));
        }
        let last = (colors.len() - 1).max(1) as f64;
        let stops = colors
            .into_iter()
            .enumerate()
            .map(|(i, color)| ColorStop {
                t: i as f64 / last,
                color,
            })
            .collect();
        Ok(Self { stops })
    }

    /// Palette from color names or hex strings
    pub fn parse<S: AsRef<str>>(colors: &[S]) -> Result<Self> {
        Self::new(
            colors
                .iter()
                .map(|c| Rgb::parse(c.as_ref()))
                .collect::<Result<Vec<_>>>()?,
        )
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Color at normalized position `t`, clamped to [0, 1]
    pub fn evaluate(&self, t: f64) -> Rgb {
        multi_stop(&self.stops, t)
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

fn multi_stop(stops: &[ColorStop], t: f64) -> Rgb {
    if t <= 0.0 || stops.len() == 1 {
        return stops[0].color;
    }
    if t >= 1.0 {
        return stops[stops.len() - 1].color;
    }
    for i in 1..stops.len() {
        if t <= stops[i].t {
            let ratio = (t - stops[i - 1].t) / (stops[i].t - stops[i - 1].t);
            return lerp_color(stops[i - 1].color, stops[i].color, ratio);
        }
    }
    stops[stops.len() - 1].color
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names_and_hex() {
        assert_eq!(Rgb::parse("Green").unwrap(), Rgb::new(0, 128, 0));
        assert_eq!(Rgb::parse("#ff8000").unwrap(), Rgb::new(255, 128, 0));
        assert_eq!(Rgb::parse("00f").unwrap(), Rgb::new(0, 0, 255));
        assert!(Rgb::parse("notacolor").is_err());
        assert!(Rgb::parse("#12345").is_err());
    }

    #[test]
    fn hex_roundtrip_format() {
        assert_eq!(Rgb::new(165, 42, 42).to_hex(), "#a52a2a");
    }

    #[test]
    fn palette_endpoints_and_midpoint() {
        let p = Palette::parse(&["black", "white"]).unwrap();
        assert_eq!(p.evaluate(-1.0), Rgb::new(0, 0, 0));
        assert_eq!(p.evaluate(0.5), Rgb::new(128, 128, 128));
        assert_eq!(p.evaluate(2.0), Rgb::new(255, 255, 255));
    }

    #[test]
    fn discrete_palette_hits_stops() {
        let p = Palette::parse(&["black", "green", "brown", "blue"]).unwrap();
        assert_eq!(p.evaluate(1.0 / 3.0), Rgb::new(0, 128, 0));
        assert_eq!(p.evaluate(2.0 / 3.0), Rgb::new(165, 42, 42));
    }

    #[test]
    fn single_color_palette() {
        let p = Palette::parse(&["red"]).unwrap();
        assert_eq!(p.evaluate(0.7), Rgb::new(255, 0, 0));
        assert!(Palette::new(vec![]).is_err());
    }
}

//! Map legends

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::palette::Rgb;
use lulc_core::ClassScheme;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub title: String,
    pub entries: Vec<LegendEntry>,
}

impl Legend {
    /// Legend from explicit `(label, color)` pairs
    pub fn new<S: AsRef<str>>(title: &str, entries: &[(S, S)]) -> Result<Self> {
        let entries = entries
            .iter()
            .map(|(label, color)| {
                Ok(LegendEntry {
                    label: label.as_ref().to_string(),
                    color: Rgb::parse(color.as_ref())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            title: title.to_string(),
            entries,
        })
    }

    /// One entry per class, in class-value order
    pub fn from_scheme(title: &str, scheme: &ClassScheme) -> Result<Self> {
        let entries = scheme
            .classes()
            .iter()
            .map(|c| {
                Ok(LegendEntry {
                    label: c.label.clone(),
                    color: Rgb::parse(&c.color)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            title: title.to_string(),
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legend_follows_scheme_order() {
        let legend = Legend::from_scheme("Land cover", &ClassScheme::default_land_cover()).unwrap();
        let labels: Vec<_> = legend.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Built-up", "Vegetation", "Bareland", "Water Body"]);
        assert_eq!(legend.entries[3].color, Rgb::new(0, 0, 255));
    }

    #[test]
    fn explicit_legend_rejects_bad_color() {
        assert!(Legend::new("Change", &[("No change", "white"), ("Change", "black")]).is_ok());
        assert!(Legend::new("Change", &[("x", "sparkly")]).is_err());
    }
}

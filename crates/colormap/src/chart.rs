//! Grouped column charts
//!
//! Serialized as JSON for external plotting and rendered as a horizontal text
//! bar chart for the console.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{ColormapError, Result};
use crate::palette::Rgb;

/// One series of values, aligned with the chart's categories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub categories: Vec<String>,
    pub series: Vec<Series>,
}

impl ColumnChart {
    pub fn new(title: &str, x_label: &str, y_label: &str, categories: Vec<String>) -> Self {
        Self {
            title: title.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            categories,
            series: Vec::new(),
        }
    }

    /// Add a series; it must have one value per category
    pub fn push_series(&mut self, name: &str, values: Vec<f64>, color: Option<Rgb>) -> Result<()> {
        if values.len() != self.categories.len() {
            return Err(ColormapError::Chart(format!(
                "series '{}' has {} values for {} categories",
                name,
                values.len(),
                self.categories.len()
            )));
        }
        self.series.push(Series {
            name: name.to_string(),
            values,
            color,
        });
        Ok(())
    }

    /// Horizontal bar chart, bars scaled so the largest value spans `width`
    /// characters
    pub fn render_text(&self, width: usize) -> String {
        let max = self
            .series
            .iter()
            .flat_map(|s| s.values.iter().copied())
            .filter(|v| v.is_finite())
            .fold(0.0f64, f64::max);
        let label_w = self
            .categories
            .iter()
            .map(String::len)
            .chain(self.series.iter().map(|s| s.name.len()))
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        let _ = writeln!(out, "{} ({} by {})", self.title, self.y_label, self.x_label);
        for (i, category) in self.categories.iter().enumerate() {
            let _ = writeln!(out, "{category}");
            for s in &self.series {
                let v = s.values[i];
                let len = if max > 0.0 && v.is_finite() && v > 0.0 {
                    ((v / max) * width as f64).round() as usize
                } else {
                    0
                };
                let _ = writeln!(out, "  {:<label_w$} |{} {:.2}", s.name, "#".repeat(len), v);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart() -> ColumnChart {
        let mut c = ColumnChart::new(
            "Area by class",
            "Land cover class",
            "Area (ha)",
            vec!["Built-up".into(), "Water Body".into()],
        );
        c.push_series("2020", vec![10.0, 5.0], None).unwrap();
        c.push_series("2024", vec![20.0, 0.0], Some(Rgb::new(255, 0, 0))).unwrap();
        c
    }

    #[test]
    fn series_length_checked() {
        let mut c = chart();
        assert!(c.push_series("bad", vec![1.0], None).is_err());
    }

    #[test]
    fn text_bars_scale_to_max() {
        let text = chart().render_text(10);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Area by class"));
        assert!(lines[2].contains("|##### 10.00"));
        assert!(lines[3].contains("|########## 20.00"));
        assert!(lines[6].contains("| 0.00"));
    }

    #[test]
    fn chart_serializes_colors_as_hex() {
        let json = serde_json::to_string(&chart()).unwrap();
        assert!(json.contains("\"#ff0000\""));
    }
}

//! Sample tables: band values extracted at labelled geometries

use crate::error::{Error, Result};
use crate::vector::AttributeValue;

/// One sampled geometry
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow {
    /// Id of the source feature, if it had one
    pub feature_id: Option<String>,
    /// Band values, aligned with [`SampleTable::band_names`]
    pub values: Vec<f64>,
    /// Carried properties, aligned with [`SampleTable::property_names`]
    pub properties: Vec<AttributeValue>,
}

/// Tabular extraction of band values plus carried properties
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleTable {
    band_names: Vec<String>,
    property_names: Vec<String>,
    rows: Vec<SampleRow>,
}

impl SampleTable {
    pub fn new(band_names: Vec<String>, property_names: Vec<String>) -> Self {
        Self {
            band_names,
            property_names,
            rows: Vec::new(),
        }
    }

    /// Append a row, checking it matches the table's columns
    pub fn push(&mut self, row: SampleRow) -> Result<()> {
        if row.values.len() != self.band_names.len()
            || row.properties.len() != self.property_names.len()
        {
            return Err(Error::InvalidParameter {
                name: "row",
                value: format!("{} values, {} properties", row.values.len(), row.properties.len()),
                reason: format!(
                    "table has {} bands and {} properties",
                    self.band_names.len(),
                    self.property_names.len()
                ),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn band_names(&self) -> &[String] {
        &self.band_names
    }

    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }

    pub fn rows(&self) -> &[SampleRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header: band names followed by property names
    pub fn columns(&self) -> Vec<&str> {
        self.band_names
            .iter()
            .chain(self.property_names.iter())
            .map(String::as_str)
            .collect()
    }

    fn band_index(&self, name: &str) -> Result<usize> {
        self.band_names
            .iter()
            .position(|b| b == name)
            .ok_or_else(|| Error::MissingBand {
                name: name.to_string(),
                available: self.band_names.join(","),
            })
    }

    fn property_index(&self, name: &str) -> Result<usize> {
        self.property_names
            .iter()
            .position(|p| p == name)
            .ok_or_else(|| Error::MissingProperty {
                feature: "<table>".to_string(),
                property: name.to_string(),
            })
    }

    /// Feature vectors for the named input bands, one per row
    pub fn feature_matrix<S: AsRef<str>>(&self, inputs: &[S]) -> Result<Vec<Vec<f64>>> {
        let idx = inputs
            .iter()
            .map(|n| self.band_index(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(self
            .rows
            .iter()
            .map(|row| idx.iter().map(|&i| row.values[i]).collect())
            .collect())
    }

    /// Integer labels from a carried property
    pub fn labels(&self, property: &str) -> Result<Vec<i64>> {
        let i = self.property_index(property)?;
        self.rows
            .iter()
            .map(|row| {
                row.properties[i].as_i64().ok_or_else(|| Error::MissingProperty {
                    feature: row.feature_id.clone().unwrap_or_else(|| "<unnamed>".into()),
                    property: property.to_string(),
                })
            })
            .collect()
    }

    /// Add (or replace) a property column
    pub fn with_property(mut self, name: &str, values: Vec<AttributeValue>) -> Result<Self> {
        if values.len() != self.rows.len() {
            return Err(Error::InvalidParameter {
                name: "values",
                value: values.len().to_string(),
                reason: format!("table has {} rows", self.rows.len()),
            });
        }
        let slot = match self.property_names.iter().position(|p| p == name) {
            Some(i) => Some(i),
            None => {
                self.property_names.push(name.to_string());
                None
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            match slot {
                Some(i) => row.properties[i] = value,
                None => row.properties.push(value),
            }
        }
        Ok(self)
    }
}

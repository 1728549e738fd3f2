//! Land-cover class schemes
//!
//! A scheme is one ordered list of `(value, label, color)` records. Legends,
//! palettes and area tables are all derived from it, so labels and colors
//! cannot drift out of alignment with class values.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// One land-cover class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandCoverClass {
    /// Value written in classified rasters and the `class` property
    pub value: i32,
    /// Human-readable name
    pub label: String,
    /// CSS color name or `#rrggbb`
    pub color: String,
}

impl LandCoverClass {
    pub fn new(value: i32, label: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
            color: color.into(),
        }
    }
}

/// Validated, value-ordered list of land-cover classes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LandCoverClass>", into = "Vec<LandCoverClass>")]
pub struct ClassScheme {
    classes: Vec<LandCoverClass>,
}

impl ClassScheme {
    /// Validate and sort classes by value.
    ///
    /// Rejects empty schemes, duplicate values, duplicate labels and empty colors.
    pub fn new(mut classes: Vec<LandCoverClass>) -> Result<Self> {
        if classes.is_empty() {
            return Err(Error::InvalidClassScheme("no classes defined".into()));
        }
        classes.sort_by_key(|c| c.value);
        for (i, class) in classes.iter().enumerate() {
            if class.color.trim().is_empty() {
                return Err(Error::InvalidClassScheme(format!(
                    "class {} ({}) has no color",
                    class.value, class.label
                )));
            }
            for other in &classes[..i] {
                if other.value == class.value {
                    return Err(Error::InvalidClassScheme(format!(
                        "duplicate class value {}",
                        class.value
                    )));
                }
                if other.label == class.label {
                    return Err(Error::InvalidClassScheme(format!(
                        "duplicate class label '{}'",
                        class.label
                    )));
                }
            }
        }
        Ok(Self { classes })
    }

    /// Built-up, vegetation, bareland and water body, valued 0 to 3
    pub fn default_land_cover() -> Self {
        Self {
            classes: vec![
                LandCoverClass::new(0, "Built-up", "black"),
                LandCoverClass::new(1, "Vegetation", "green"),
                LandCoverClass::new(2, "Bareland", "brown"),
                LandCoverClass::new(3, "Water Body", "blue"),
            ],
        }
    }

    pub fn classes(&self) -> &[LandCoverClass] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn values(&self) -> Vec<i32> {
        self.classes.iter().map(|c| c.value).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.classes.iter().map(|c| c.label.as_str()).collect()
    }

    pub fn get(&self, value: i32) -> Option<&LandCoverClass> {
        self.classes.iter().find(|c| c.value == value)
    }

    pub fn contains(&self, value: i32) -> bool {
        self.get(value).is_some()
    }

    /// Smallest and largest class value
    pub fn value_range(&self) -> (i32, i32) {
        let first = self.classes.first().map_or(0, |c| c.value);
        let last = self.classes.last().map_or(0, |c| c.value);
        (first, last)
    }
}

impl Default for ClassScheme {
    fn default() -> Self {
        Self::default_land_cover()
    }
}

impl TryFrom<Vec<LandCoverClass>> for ClassScheme {
    type Error = Error;

    fn try_from(classes: Vec<LandCoverClass>) -> Result<Self> {
        Self::new(classes)
    }
}

impl From<ClassScheme> for Vec<LandCoverClass> {
    fn from(scheme: ClassScheme) -> Self {
        scheme.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scheme_is_valid() {
        let scheme = ClassScheme::default();
        assert_eq!(scheme.values(), vec![0, 1, 2, 3]);
        assert_eq!(scheme.get(3).unwrap().label, "Water Body");
        assert_eq!(scheme.value_range(), (0, 3));
        assert!(ClassScheme::new(scheme.classes().to_vec()).is_ok());
    }

    #[test]
    fn test_sorted_by_value() {
        let scheme = ClassScheme::new(vec![
            LandCoverClass::new(2, "B", "red"),
            LandCoverClass::new(1, "A", "blue"),
        ])
        .unwrap();
        assert_eq!(scheme.labels(), vec!["A", "B"]);
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        assert!(ClassScheme::new(vec![]).is_err());
        assert!(ClassScheme::new(vec![
            LandCoverClass::new(1, "A", "red"),
            LandCoverClass::new(1, "B", "blue"),
        ])
        .is_err());
        assert!(ClassScheme::new(vec![
            LandCoverClass::new(1, "A", "red"),
            LandCoverClass::new(2, "A", "blue"),
        ])
        .is_err());
        assert!(ClassScheme::new(vec![LandCoverClass::new(1, "A", " ")]).is_err());
    }
}

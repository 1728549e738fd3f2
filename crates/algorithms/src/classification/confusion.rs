//! Confusion (error) matrix and the accuracy figures derived from it
//!
//! Rows are actual classes, columns predicted classes, both in ascending
//! class order over the union of observed values.

use std::fmt;

use serde::{Deserialize, Serialize};
use lulc_core::{Error, Result, SampleTable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    classes: Vec<i64>,
    counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    /// Build from aligned actual/predicted label lists
    pub fn from_pairs(actual: &[i64], predicted: &[i64]) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(Error::InvalidParameter {
                name: "predicted",
                value: predicted.len().to_string(),
                reason: format!("expected {} labels to match actual", actual.len()),
            });
        }
        let mut classes: Vec<i64> = actual.iter().chain(predicted).copied().collect();
        classes.sort_unstable();
        classes.dedup();

        let k = classes.len();
        let mut counts = vec![vec![0u64; k]; k];
        for (a, p) in actual.iter().zip(predicted) {
            let (Ok(i), Ok(j)) = (classes.binary_search(a), classes.binary_search(p)) else {
                continue;
            };
            counts[i][j] += 1;
        }
        Ok(Self { classes, counts })
    }

    /// Build from two integer properties of a sample table.
    /// Rows where either property is missing or non-integral are skipped.
    pub fn from_table(table: &SampleTable, actual: &str, predicted: &str) -> Result<Self> {
        let ai = property_index(table, actual)?;
        let pi = property_index(table, predicted)?;
        let (a, p): (Vec<i64>, Vec<i64>) = table
            .rows()
            .iter()
            .filter_map(|row| Some((row.properties[ai].as_i64()?, row.properties[pi].as_i64()?)))
            .unzip();
        Self::from_pairs(&a, &p)
    }

    /// Build from explicit counts; `counts` must be square and match `classes`
    pub fn from_counts(classes: Vec<i64>, counts: Vec<Vec<u64>>) -> Result<Self> {
        let k = classes.len();
        if counts.len() != k || counts.iter().any(|r| r.len() != k) {
            return Err(Error::InvalidParameter {
                name: "counts",
                value: format!("{} rows", counts.len()),
                reason: format!("expected a {k} x {k} matrix"),
            });
        }
        if classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidParameter {
                name: "classes",
                value: format!("{classes:?}"),
                reason: "must be strictly ascending".into(),
            });
        }
        Ok(Self { classes, counts })
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Row-major counts, actual by predicted
    pub fn counts(&self) -> &[Vec<u64>] {
        &self.counts
    }

    /// Count of rows labelled `actual` and predicted `predicted`
    pub fn get(&self, actual: i64, predicted: i64) -> u64 {
        match (self.classes.binary_search(&actual), self.classes.binary_search(&predicted)) {
            (Ok(i), Ok(j)) => self.counts[i][j],
            _ => 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Correctly classified rows
    pub fn correct(&self) -> u64 {
        (0..self.classes.len()).map(|i| self.counts[i][i]).sum()
    }

    /// Overall accuracy: trace / total, 0 for an empty matrix
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.correct() as f64 / total as f64
    }

    /// Cohen's kappa, 0 when undefined
    pub fn kappa(&self) -> f64 {
        let total = self.total() as f64;
        if total == 0.0 {
            return 0.0;
        }
        let po = self.correct() as f64 / total;
        let pe: f64 = (0..self.classes.len())
            .map(|i| self.row_total(i) as f64 * self.col_total(i) as f64)
            .sum::<f64>()
            / (total * total);
        if (1.0 - pe).abs() < 1e-12 {
            return 0.0;
        }
        (po - pe) / (1.0 - pe)
    }

    /// Producer's accuracy (recall) per class; 0 for classes never observed
    pub fn producers_accuracy(&self) -> Vec<f64> {
        (0..self.classes.len())
            .map(|i| ratio(self.counts[i][i], self.row_total(i)))
            .collect()
    }

    /// Consumer's (user's) accuracy, i.e. precision per class; 0 for classes
    /// never predicted
    pub fn consumers_accuracy(&self) -> Vec<f64> {
        (0..self.classes.len())
            .map(|j| ratio(self.counts[j][j], self.col_total(j)))
            .collect()
    }

    fn row_total(&self, i: usize) -> u64 {
        self.counts[i].iter().sum()
    }

    fn col_total(&self, j: usize) -> u64 {
        self.counts.iter().map(|r| r[j]).sum()
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn property_index(table: &SampleTable, name: &str) -> Result<usize> {
    table
        .property_names()
        .iter()
        .position(|p| p == name)
        .ok_or_else(|| Error::MissingProperty {
            feature: "<table>".into(),
            property: name.into(),
        })
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.to_string().len())
            .chain(self.counts.iter().flatten().map(|c| c.to_string().len()))
            .max()
            .unwrap_or(1)
            .max(6);

        write!(f, "{:>width$}", "actual")?;
        for c in &self.classes {
            write!(f, " {c:>width$}")?;
        }
        writeln!(f)?;
        for (c, row) in self.classes.iter().zip(&self.counts) {
            write!(f, "{c:>width$}")?;
            for n in row {
                write!(f, " {n:>width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

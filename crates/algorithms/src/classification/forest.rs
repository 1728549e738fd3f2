//! Random forest classifier
//!
//! Each tree is grown on a bootstrap sample of the training rows, trying a
//! random subset of the inputs at every split. Trees are seeded from
//! `seed + tree index`, so a forest is reproducible regardless of how many
//! threads grew it. Prediction is a plurality vote.

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::tree::{majority, DecisionTree, TreeParams};
use crate::maybe_rayon::*;
use lulc_core::{AttributeValue, Error, Image, Raster, Result, SampleTable};

/// Parameters for random forest training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestParams {
    /// Number of trees
    pub n_trees: usize,
    /// Inputs tried per split (default: square root of the input count)
    pub features_per_split: Option<usize>,
    /// Minimum rows in a leaf
    pub min_samples_leaf: usize,
    /// Minimum rows needed to split a node
    pub min_samples_split: usize,
    /// Maximum tree depth (unlimited when `None`)
    pub max_depth: Option<usize>,
    /// Bootstrap sample size as a fraction of the training rows
    pub bag_fraction: f64,
    /// Random seed
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_trees: 10,
            features_per_split: None,
            min_samples_leaf: 1,
            min_samples_split: 2,
            max_depth: None,
            bag_fraction: 0.5,
            seed: 0,
        }
    }
}

/// Trained random forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    inputs: Vec<String>,
    classes: Vec<i64>,
    trees: Vec<DecisionTree>,
    importance: Vec<f64>,
}

impl RandomForest {
    /// Train on a sample table, predicting `class_property` from `inputs`
    pub fn train<S: AsRef<str>>(
        table: &SampleTable,
        class_property: &str,
        inputs: &[S],
        params: &RandomForestParams,
    ) -> Result<Self> {
        let features = table.feature_matrix(inputs)?;
        let labels = table.labels(class_property)?;
        let names = inputs.iter().map(|s| s.as_ref().to_string()).collect();
        Self::fit(names, &features, &labels, params)
    }

    /// Train on raw feature vectors. Rows with non-finite values are skipped.
    pub fn fit(
        inputs: Vec<String>,
        features: &[Vec<f64>],
        labels: &[i64],
        params: &RandomForestParams,
    ) -> Result<Self> {
        if params.n_trees == 0 {
            return Err(Error::InvalidParameter {
                name: "n_trees",
                value: "0".into(),
                reason: "forest needs at least one tree".into(),
            });
        }
        if !(params.bag_fraction > 0.0) {
            return Err(Error::InvalidParameter {
                name: "bag_fraction",
                value: params.bag_fraction.to_string(),
                reason: "must be positive".into(),
            });
        }
        if features.len() != labels.len() {
            return Err(Error::InvalidParameter {
                name: "labels",
                value: labels.len().to_string(),
                reason: format!("expected one label per row ({} rows)", features.len()),
            });
        }
        if inputs.is_empty() {
            return Err(Error::InvalidParameter {
                name: "inputs",
                value: "[]".into(),
                reason: "at least one input band is required".into(),
            });
        }

        let mut x = Vec::with_capacity(features.len());
        let mut raw_y = Vec::with_capacity(labels.len());
        for (row, &label) in features.iter().zip(labels) {
            if row.len() != inputs.len() {
                return Err(Error::InvalidParameter {
                    name: "features",
                    value: row.len().to_string(),
                    reason: format!("expected {} values per row", inputs.len()),
                });
            }
            if row.iter().all(|v| v.is_finite()) {
                x.push(row.clone());
                raw_y.push(label);
            }
        }
        if x.len() < features.len() {
            warn!("Skipped {} training rows with missing values", features.len() - x.len());
        }
        if x.is_empty() {
            return Err(Error::Algorithm("no usable training samples".into()));
        }

        let mut classes = raw_y.clone();
        classes.sort_unstable();
        classes.dedup();
        let y: Vec<usize> = raw_y
            .iter()
            .map(|v| classes.binary_search(v).unwrap_or(0))
            .collect();

        let n_features = inputs.len();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            features_per_split: params
                .features_per_split
                .unwrap_or_else(|| ((n_features as f64).sqrt().floor() as usize).max(1)),
        };
        let n = x.len();
        let bag = ((params.bag_fraction * n as f64).round() as usize).max(1);

        let grown: Vec<(DecisionTree, Vec<f64>)> = (0..params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let sample: Vec<usize> = (0..bag).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(&x, &y, classes.len(), sample, &tree_params, &mut rng)
            })
            .collect();

        let mut importance = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, imp) in grown {
            for (total, v) in importance.iter_mut().zip(imp) {
                *total += v;
            }
            trees.push(tree);
        }
        let sum: f64 = importance.iter().sum();
        if sum > 0.0 {
            importance.iter_mut().for_each(|v| *v /= sum);
        }

        debug!(
            "Trained {} trees on {} rows, {} inputs, {} classes",
            trees.len(),
            n,
            n_features,
            classes.len()
        );

        Ok(Self {
            inputs,
            classes,
            trees,
            importance,
        })
    }

    /// Input band names, in the order `predict` expects
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Class values seen in training, ascending
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Normalized Gini importance per input
    pub fn feature_importance(&self) -> Vec<(&str, f64)> {
        self.inputs
            .iter()
            .map(String::as_str)
            .zip(self.importance.iter().copied())
            .collect()
    }

    /// Vote count per class, aligned with [`RandomForest::classes`]
    pub fn votes(&self, row: &[f64]) -> Vec<usize> {
        let mut votes = vec![0usize; self.classes.len()];
        for tree in &self.trees {
            votes[tree.predict(row)] += 1;
        }
        votes
    }

    /// Plurality class; ties go to the smaller class value
    pub fn predict(&self, row: &[f64]) -> i64 {
        self.classes[majority(&self.votes(row))]
    }
}

/// Classify every pixel of `image` with `model`.
///
/// The model's inputs are looked up by name, so the image may carry extra
/// bands. Pixels missing any input become nodata (`i32::MIN`).
pub fn classify_image(model: &RandomForest, image: &Image) -> Result<Raster<i32>> {
    let selected = image.select(model.inputs())?;
    let labels = model
        .classes()
        .iter()
        .map(|&c| {
            i32::try_from(c).map_err(|_| Error::InvalidParameter {
                name: "class",
                value: c.to_string(),
                reason: "class values must fit in 32 bits".into(),
            })
        })
        .collect::<Result<Vec<i32>>>()?;

    let (rows, cols) = selected.shape();
    let data: Vec<i32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut pixel = Vec::with_capacity(selected.band_count());
            let mut row_data = vec![i32::MIN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                if selected.pixel_into(row, col, &mut pixel) {
                    *out = labels[majority(&model.votes(&pixel))];
                }
            }
            row_data
        })
        .collect();

    let mut output = selected.grid().with_same_meta::<i32>();
    output.set_nodata(Some(i32::MIN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Classify every row of a sample table, storing the prediction in
/// `output_property`. Rows with missing inputs get a null prediction.
pub fn classify_table(model: &RandomForest, table: &SampleTable, output_property: &str) -> Result<SampleTable> {
    let features = table.feature_matrix(model.inputs())?;
    let predictions = features
        .iter()
        .map(|row| {
            if row.iter().all(|v| v.is_finite()) {
                AttributeValue::Int(model.predict(row))
            } else {
                AttributeValue::Null
            }
        })
        .collect();
    table.clone().with_property(output_property, predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lulc_core::{Band, SampleRow};

    /// Three well separated clusters in two dimensions
    fn clusters() -> (Vec<Vec<f64>>, Vec<i64>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for (class, (cx, cy)) in [(0i64, (0.0, 0.0)), (1, (100.0, 0.0)), (2, (0.0, 100.0))] {
            for i in 0..20 {
                let d = i as f64 * 0.5;
                x.push(vec![cx + d, cy - d]);
                y.push(class);
            }
        }
        (x, y)
    }

    fn names() -> Vec<String> {
        vec!["a".into(), "b".into()]
    }

    #[test]
    fn test_fits_separable_clusters() {
        let (x, y) = clusters();
        let rf = RandomForest::fit(names(), &x, &y, &RandomForestParams::default()).unwrap();
        assert_eq!(rf.n_trees(), 10);
        assert_eq!(rf.classes(), &[0, 1, 2]);
        assert_eq!(rf.predict(&[1.0, -1.0]), 0);
        assert_eq!(rf.predict(&[103.0, -2.0]), 1);
        assert_eq!(rf.predict(&[2.0, 97.0]), 2);
        let total: f64 = rf.feature_importance().iter().map(|(_, v)| v).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = clusters();
        let p = RandomForestParams {
            seed: 42,
            ..Default::default()
        };
        let a = RandomForest::fit(names(), &x, &y, &p).unwrap();
        let b = RandomForest::fit(names(), &x, &y, &p).unwrap();
        for probe in [[50.0, 50.0], [30.0, 10.0], [5.0, 40.0]] {
            assert_eq!(a.votes(&probe), b.votes(&probe));
        }
    }

    #[test]
    fn test_single_class_predicts_it() {
        let x = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let rf = RandomForest::fit(names(), &x, &[7, 7], &RandomForestParams::default()).unwrap();
        assert_eq!(rf.predict(&[-100.0, 100.0]), 7);
    }

    #[test]
    fn test_invalid_training_input() {
        let (x, y) = clusters();
        let zero = RandomForestParams {
            n_trees: 0,
            ..Default::default()
        };
        assert!(RandomForest::fit(names(), &x, &y, &zero).is_err());
        assert!(RandomForest::fit(names(), &x, &y[..3], &RandomForestParams::default()).is_err());
        let nan = vec![vec![f64::NAN, 1.0]];
        assert!(RandomForest::fit(names(), &nan, &[1], &RandomForestParams::default()).is_err());
    }

    #[test]
    fn test_classify_image_and_table() {
        let (x, y) = clusters();
        let rf = RandomForest::fit(names(), &x, &y, &RandomForestParams::default()).unwrap();

        let mut a = Raster::from_vec(vec![0.0, 100.0, 0.0, f64::NAN], 2, 2).unwrap();
        a.set_nodata(Some(f64::NAN));
        let b = Raster::from_vec(vec![0.0, 0.0, 100.0, 0.0], 2, 2).unwrap();
        let extra = Raster::filled(2, 2, 9.0);
        let image = Image::new(vec![Band::new("extra", extra), Band::new("b", b), Band::new("a", a)]).unwrap();

        let classified = classify_image(&rf, &image).unwrap();
        assert_eq!(classified.get(0, 0).unwrap(), 0);
        assert_eq!(classified.get(0, 1).unwrap(), 1);
        assert_eq!(classified.get(1, 0).unwrap(), 2);
        assert_eq!(classified.get(1, 1).unwrap(), i32::MIN);
        assert!(classified.is_nodata(i32::MIN));

        let mut table = SampleTable::new(names(), vec!["class".into()]);
        table
            .push(SampleRow {
                feature_id: None,
                values: vec![100.0, 0.0],
                properties: vec![AttributeValue::Int(1)],
            })
            .unwrap();
        let out = classify_table(&rf, &table, "classification").unwrap();
        assert_eq!(out.labels("classification").unwrap(), vec![1]);
    }
}

//! CART decision tree with Gini splits
//!
//! Labels arrive as dense indices `0..n_classes`; the forest owns the mapping
//! back to class values. Leaves store the majority index, ties going to the
//! smallest one.

use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Growth limits for a single tree
#[derive(Debug, Clone)]
pub(crate) struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub features_per_split: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct Builder<'a, R: Rng> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_classes: usize,
    n_features: usize,
    params: &'a TreeParams,
    rng: &'a mut R,
    importance: Vec<f64>,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl DecisionTree {
    /// Grow a tree on the rows listed in `sample`.
    ///
    /// Returns the tree and its total Gini decrease per feature.
    pub(crate) fn fit<R: Rng>(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        sample: Vec<usize>,
        params: &TreeParams,
        rng: &mut R,
    ) -> (Self, Vec<f64>) {
        let n_features = x.first().map_or(0, Vec::len);
        let mut builder = Builder {
            x,
            y,
            n_classes,
            n_features,
            params,
            rng,
            importance: vec![0.0; n_features],
            nodes: Vec::new(),
        };
        builder.grow(sample, 0);
        (
            DecisionTree {
                nodes: builder.nodes,
            },
            builder.importance,
        )
    }

    /// Dense class index for one feature vector
    pub fn predict(&self, row: &[f64]) -> usize {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf { class } => return *class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], i: usize) -> usize {
            match &nodes[i] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

impl<R: Rng> Builder<'_, R> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let counts = self.class_counts(&indices);
        let n = indices.len();
        let parent_gini = gini(&counts, n);
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf {
            class: majority(&counts),
        });

        let depth_reached = self.params.max_depth.is_some_and(|d| depth >= d);
        if parent_gini <= 0.0 || depth_reached || n < self.params.min_samples_split.max(2) {
            return slot;
        }

        let Some(best) = self.best_split(&indices, &counts, parent_gini) else {
            return slot;
        };

        self.importance[best.feature] += n as f64 * (parent_gini - best.impurity);

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][best.feature] <= best.threshold);

        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[slot] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        slot
    }

    fn best_split(&mut self, indices: &[usize], counts: &[usize], parent_gini: f64) -> Option<BestSplit> {
        let n = indices.len();
        let k = self.params.features_per_split.max(1);
        // Random visiting order; keep going past `k` inputs until one splits
        let order = sample(&mut *self.rng, self.n_features, self.n_features);
        let min_leaf = self.params.min_samples_leaf.max(1);

        let mut best: Option<BestSplit> = None;
        let mut column: Vec<(f64, usize)> = Vec::with_capacity(n);

        for (tried, feature) in order.iter().enumerate() {
            if tried >= k && best.is_some() {
                break;
            }
            column.clear();
            column.extend(indices.iter().map(|&i| (self.x[i][feature], self.y[i])));
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = vec![0usize; self.n_classes];
            let mut right = counts.to_vec();

            for split in 0..n - 1 {
                let (value, class) = column[split];
                left[class] += 1;
                right[class] -= 1;

                let next = column[split + 1].0;
                if value == next {
                    continue;
                }
                let nl = split + 1;
                let nr = n - nl;
                if nl < min_leaf || nr < min_leaf {
                    continue;
                }

                let impurity = (nl as f64 * gini(&left, nl) + nr as f64 * gini(&right, nr)) / n as f64;
                if impurity < parent_gini - 1e-12
                    && best.as_ref().map_or(true, |b| impurity < b.impurity)
                {
                    best = Some(BestSplit {
                        feature,
                        threshold: (value + next) / 2.0,
                        impurity,
                    });
                }
            }
        }
        best
    }

    fn class_counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &i in indices {
            counts[self.y[i]] += 1;
        }
        counts
    }
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

/// Index of the largest count; ties resolve to the smallest index
pub(crate) fn majority(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn params() -> TreeParams {
        TreeParams {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            features_per_split: 2,
        }
    }

    #[test]
    fn test_separable_data_fits_exactly() {
        let x = vec![vec![0.0, 5.0], vec![1.0, 5.0], vec![10.0, 5.0], vec![11.0, 5.0]];
        let y = vec![0, 0, 1, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (tree, importance) = DecisionTree::fit(&x, &y, 2, (0..4).collect(), &params(), &mut rng);
        for (row, &label) in x.iter().zip(&y) {
            assert_eq!(tree.predict(row), label);
        }
        assert_eq!(tree.depth(), 1);
        assert!(importance[0] > 0.0);
        assert_eq!(importance[1], 0.0);
    }

    #[test]
    fn test_pure_node_is_leaf() {
        let x = vec![vec![1.0], vec![2.0]];
        let y = vec![1, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let (tree, _) = DecisionTree::fit(&x, &y, 2, vec![0, 1], &params(), &mut rng);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict(&[100.0]), 1);
    }

    #[test]
    fn test_max_depth_zero_gives_majority() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0]];
        let y = vec![0, 1, 1];
        let mut p = params();
        p.max_depth = Some(0);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let (tree, _) = DecisionTree::fit(&x, &y, 2, vec![0, 1, 2], &p, &mut rng);
        assert_eq!(tree.predict(&[0.0]), 1);
    }

    #[test]
    fn test_majority_tie_takes_smallest() {
        assert_eq!(majority(&[2, 3, 3]), 1);
        assert_eq!(majority(&[0, 0]), 0);
    }
}

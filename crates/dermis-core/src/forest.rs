//! Random forest classifier: bagged Gini decision trees with class weighting.
//!
//! Each tree is grown on a bootstrap sample with `floor(sqrt(n_features))`
//! candidate features per split. Leaves keep the weighted class distribution
//! of their training samples, and the forest averages those distributions.
//! Trees are fitted in parallel, each with its own generator seeded from
//! `seed + tree_index`, so the result does not depend on thread scheduling.

use ndarray::{Array2, ArrayView2};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ForestError {
    #[error("cannot fit on zero samples")]
    Empty,
    #[error("{features} feature rows but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },
    #[error("label {label} out of range for {n_classes} classes")]
    LabelOutOfRange { label: usize, n_classes: usize },
    #[error("forest needs at least one tree")]
    NoTrees,
    #[error("expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Split {
        feature: usize,
        /// Samples with `x[feature] <= threshold` go left.
        threshold: f32,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
    Leaf {
        /// Class probabilities, indexed by class code.
        distribution: Vec<f32>,
    },
}

impl TreeNode {
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn leaf_distribution(&self, row: &[f32]) -> &[f32] {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { distribution } => return distribution,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                }
            }
        }
    }

    fn is_consistent(&self, n_features: usize, n_classes: usize) -> bool {
        match self {
            TreeNode::Leaf { distribution } => {
                distribution.len() == n_classes && distribution.iter().all(|p| p.is_finite())
            }
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                *feature < n_features
                    && threshold.is_finite()
                    && left.is_consistent(n_features, n_classes)
                    && right.is_consistent(n_features, n_classes)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    n_features: usize,
    n_classes: usize,
    trees: Vec<TreeNode>,
}

impl RandomForest {
    /// Fit a forest on `x` (rows are samples) with integer labels in `0..n_classes`.
    pub fn fit(
        config: ForestConfig,
        x: ArrayView2<'_, f32>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<Self, ForestError> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(ForestError::Empty);
        }
        if n_samples != y.len() {
            return Err(ForestError::LengthMismatch {
                features: n_samples,
                labels: y.len(),
            });
        }
        if let Some(&label) = y.iter().find(|&&l| l >= n_classes) {
            return Err(ForestError::LabelOutOfRange { label, n_classes });
        }
        if config.n_trees == 0 {
            return Err(ForestError::NoTrees);
        }

        let n_features = x.ncols();
        let class_weights = class_weights(y, n_classes);
        let max_features = ((n_features as f64).sqrt().floor() as usize).max(1);

        let trees: Vec<TreeNode> = (0..config.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(i as u64));
                let weights = bootstrap_weights(y, &class_weights, &mut rng);
                let indices: Vec<usize> = (0..n_samples).filter(|&s| weights[s] > 0.0).collect();
                let mut builder = TreeBuilder {
                    x,
                    y,
                    weights,
                    n_classes,
                    max_depth: config.max_depth,
                    max_features,
                    rng,
                };
                builder.build(indices, 0)
            })
            .collect();

        tracing::debug!(
            n_trees = trees.len(),
            n_samples,
            n_features,
            n_classes,
            max_depth = config.max_depth,
            deepest = trees.iter().map(TreeNode::depth).max().unwrap_or(0),
            "random forest fitted"
        );

        Ok(Self {
            config,
            n_features,
            n_classes,
            trees,
        })
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Structural sanity check for forests read back from storage.
    pub fn is_consistent(&self) -> bool {
        !self.trees.is_empty()
            && self.n_classes > 0
            && self
                .trees
                .iter()
                .all(|t| t.is_consistent(self.n_features, self.n_classes))
    }

    /// Averaged class distribution for one sample; sums to 1.
    pub fn predict_proba_row(&self, row: &[f32]) -> Result<Vec<f32>, ForestError> {
        if row.len() != self.n_features {
            return Err(ForestError::DimensionMismatch {
                expected: self.n_features,
                actual: row.len(),
            });
        }
        let mut acc = vec![0.0f64; self.n_classes];
        for tree in &self.trees {
            for (a, &p) in acc.iter_mut().zip(tree.leaf_distribution(row)) {
                *a += p as f64;
            }
        }
        let total: f64 = acc.iter().sum();
        if total <= 0.0 {
            return Ok(vec![1.0 / self.n_classes as f32; self.n_classes]);
        }
        Ok(acc.iter().map(|a| (a / total) as f32).collect())
    }

    pub fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, ForestError> {
        let mut out = Array2::<f32>::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.outer_iter().enumerate() {
            let row = row.to_vec();
            let proba = self.predict_proba_row(&row)?;
            for (j, p) in proba.into_iter().enumerate() {
                out[[i, j]] = p;
            }
        }
        Ok(out)
    }

    /// Arg-max class per sample (ties go to the lowest class).
    pub fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Vec<usize>, ForestError> {
        let proba = self.predict_proba(x)?;
        Ok(proba.outer_iter().map(|row| argmax(row.iter().copied())).collect())
    }
}

pub(crate) fn argmax(values: impl Iterator<Item = f32>) -> usize {
    let mut best = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_val {
            best = i;
            best_val = v;
        }
    }
    best
}

/// Balanced weights: `n_samples / (n_present_classes * class_count)`, zero for
/// classes absent from `y`.
fn class_weights(y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        counts[label] += 1;
    }
    let present = counts.iter().filter(|&&c| c > 0).count() as f64;
    let n = y.len() as f64;
    counts
        .iter()
        .map(|&c| if c > 0 { n / (present * c as f64) } else { 0.0 })
        .collect()
}

/// Draw a bootstrap sample and fold its multiplicities into per-sample weights.
fn bootstrap_weights(y: &[usize], class_weights: &[f64], rng: &mut ChaCha8Rng) -> Vec<f64> {
    let n = y.len();
    let mut counts = vec![0u32; n];
    for _ in 0..n {
        counts[rng.gen_range(0..n)] += 1;
    }
    counts
        .iter()
        .zip(y)
        .map(|(&c, &label)| c as f64 * class_weights[label])
        .collect()
}

fn gini(class_totals: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - class_totals
        .iter()
        .map(|&w| {
            let p = w / total;
            p * p
        })
        .sum::<f64>()
}

struct BestSplit {
    feature: usize,
    threshold: f32,
    impurity: f64,
}

struct TreeBuilder<'a> {
    x: ArrayView2<'a, f32>,
    y: &'a [usize],
    weights: Vec<f64>,
    n_classes: usize,
    max_depth: usize,
    max_features: usize,
    rng: ChaCha8Rng,
}

impl TreeBuilder<'_> {
    fn class_totals(&self, indices: &[usize]) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_classes];
        for &i in indices {
            totals[self.y[i]] += self.weights[i];
        }
        totals
    }

    fn leaf(totals: &[f64]) -> TreeNode {
        let sum: f64 = totals.iter().sum();
        let distribution = if sum > 0.0 {
            totals.iter().map(|&w| (w / sum) as f32).collect()
        } else {
            vec![1.0 / totals.len() as f32; totals.len()]
        };
        TreeNode::Leaf { distribution }
    }

    fn build(&mut self, indices: Vec<usize>, depth: usize) -> TreeNode {
        let totals = self.class_totals(&indices);
        let total: f64 = totals.iter().sum();
        let impurity = gini(&totals, total);

        if depth >= self.max_depth || indices.len() < 2 || impurity <= f64::EPSILON {
            return Self::leaf(&totals);
        }

        let Some(split) = self.find_split(&indices) else {
            return Self::leaf(&totals);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[[i, split.feature]] <= split.threshold);
        if left.is_empty() || right.is_empty() {
            return Self::leaf(&totals);
        }

        tracing::trace!(
            depth,
            feature = split.feature,
            threshold = split.threshold,
            impurity = split.impurity,
            "split"
        );

        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.build(left, depth + 1)),
            right: Box::new(self.build(right, depth + 1)),
        }
    }

    /// Search randomly ordered features until `max_features` non-constant
    /// ones have been evaluated.
    fn find_split(&mut self, indices: &[usize]) -> Option<BestSplit> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(&mut self.rng);

        let mut best: Option<BestSplit> = None;
        let mut evaluated = 0;
        for feature in features {
            if evaluated >= self.max_features {
                break;
            }
            let mut order: Vec<(f32, usize)> =
                indices.iter().map(|&i| (self.x[[i, feature]], i)).collect();
            order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let first = order[0].0;
            let last = order[order.len() - 1].0;
            if first >= last {
                continue;
            }
            evaluated += 1;

            if let Some(candidate) = self.best_threshold(feature, &order) {
                if best.as_ref().map_or(true, |b| candidate.impurity < b.impurity) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    /// Sweep sorted values, scoring every boundary between distinct values by
    /// the weighted Gini impurity of the two children.
    fn best_threshold(&self, feature: usize, order: &[(f32, usize)]) -> Option<BestSplit> {
        let mut right = vec![0.0; self.n_classes];
        for &(_, i) in order {
            right[self.y[i]] += self.weights[i];
        }
        let mut right_total: f64 = right.iter().sum();
        let mut left = vec![0.0; self.n_classes];
        let mut left_total = 0.0;
        let total = right_total;

        let mut best: Option<BestSplit> = None;
        for k in 0..order.len() - 1 {
            let (value, i) = order[k];
            let w = self.weights[i];
            left[self.y[i]] += w;
            right[self.y[i]] -= w;
            left_total += w;
            right_total -= w;

            let next = order[k + 1].0;
            if next <= value {
                continue;
            }

            let impurity = (left_total * gini(&left, left_total)
                + right_total * gini(&right, right_total))
                / total;

            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                let mut threshold = value + (next - value) / 2.0;
                if threshold >= next {
                    threshold = value;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
        best
    }
}

//! CART decision tree for binary classification.
//!
//! Splits minimise weighted Gini impurity. Sample weights carry both the
//! class-imbalance correction and bootstrap multiplicity, so rows are never
//! duplicated or dropped to rebalance classes.

use crate::rng::StreamRng;
use serde::{Deserialize, Serialize};

/// Gains at or below this are treated as no improvement.
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        /// Weighted share of positive samples that reached this leaf.
        probability: f64,
    },
    Split {
        feature:   usize,
        threshold: f64,
        left:      usize,
        right:     usize,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth:         usize,
    pub min_samples_split: usize,
    pub min_samples_leaf:  usize,
    pub max_features:      usize,
}

/// Borrowed training data for one tree.
pub struct TreeInput<'a> {
    pub rows:    &'a [Vec<f64>],
    pub targets: &'a [u8],
    pub weights: &'a [f64],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

impl DecisionTree {
    /// Grow a tree over `samples` (row indices with positive weight).
    /// Returns the tree and its unnormalised impurity decrease per feature.
    pub fn fit(
        input: &TreeInput<'_>,
        samples: Vec<usize>,
        params: &TreeParams,
        rng: &mut StreamRng,
    ) -> (Self, Vec<f64>) {
        let n_features = input.rows.first().map(|r| r.len()).unwrap_or(0);
        let mut builder = Builder {
            input,
            params,
            rng,
            n_features,
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
        };
        builder.grow(samples, 0);
        (Self { nodes: builder.nodes }, builder.importances)
    }

    /// Positive-class probability for one row.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { probability } => return *probability,
                Node::Split { feature, threshold, left, right } => {
                    at = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], at: usize) -> usize {
            match &nodes[at] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }
}

struct Builder<'a, 'b> {
    input:       &'a TreeInput<'a>,
    params:      &'a TreeParams,
    rng:         &'b mut StreamRng,
    n_features:  usize,
    nodes:       Vec<Node>,
    importances: Vec<f64>,
}

struct BestSplit {
    feature:   usize,
    threshold: f64,
    gain:      f64,
}

impl Builder<'_, '_> {
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let (w_total, w_pos) = self.totals(&samples);
        let probability = if w_total > 0.0 { w_pos / w_total } else { 0.0 };
        let impurity = gini(w_pos, w_total);

        let stop = depth >= self.params.max_depth
            || samples.len() < self.params.min_samples_split
            || impurity <= 0.0;
        let best = if stop { None } else { self.best_split(&samples, w_total, impurity) };

        let Some(best) = best else {
            self.nodes.push(Node::Leaf { probability });
            return self.nodes.len() - 1;
        };

        self.importances[best.feature] += best.gain;
        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.input.rows[i][best.feature] <= best.threshold);

        let at = self.nodes.len();
        self.nodes.push(Node::Leaf { probability });
        let left_at = self.grow(left, depth + 1);
        let right_at = self.grow(right, depth + 1);
        self.nodes[at] = Node::Split {
            feature:   best.feature,
            threshold: best.threshold,
            left:      left_at,
            right:     right_at,
        };
        at
    }

    fn totals(&self, samples: &[usize]) -> (f64, f64) {
        samples.iter().fold((0.0, 0.0), |(w, p), &i| {
            let wi = self.input.weights[i];
            (w + wi, if self.input.targets[i] == 1 { p + wi } else { p })
        })
    }

    fn best_split(&mut self, samples: &[usize], w_total: f64, impurity: f64) -> Option<BestSplit> {
        let candidates = self.rng.sample_indices(self.n_features, self.params.max_features);
        let rows = self.input.rows;
        let min_leaf = self.params.min_samples_leaf;
        let parent = w_total * impurity;

        let mut best: Option<BestSplit> = None;
        let mut sorted = samples.to_vec();
        for feature in candidates {
            sorted.sort_by(|&a, &b| rows[a][feature].total_cmp(&rows[b][feature]).then(a.cmp(&b)));

            let (mut w_left, mut p_left) = (0.0, 0.0);
            let w_pos: f64 = sorted.iter().filter(|&&i| self.input.targets[i] == 1).map(|&i| self.input.weights[i]).sum();
            for k in 0..sorted.len() - 1 {
                let i = sorted[k];
                w_left += self.input.weights[i];
                if self.input.targets[i] == 1 {
                    p_left += self.input.weights[i];
                }

                let here = rows[i][feature];
                let next = rows[sorted[k + 1]][feature];
                if here == next || k + 1 < min_leaf || sorted.len() - (k + 1) < min_leaf {
                    continue;
                }

                let w_right = w_total - w_left;
                let p_right = w_pos - p_left;
                let children = w_left * gini(p_left, w_left) + w_right * gini(p_right, w_right);
                let gain = parent - children;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mid = here + (next - here) / 2.0;
                    let threshold = if mid < next { mid } else { here };
                    best = Some(BestSplit { feature, threshold, gain });
                }
            }
        }
        best
    }
}

/// Gini impurity of a weighted binary node.
fn gini(w_pos: f64, w_total: f64) -> f64 {
    if w_total <= 0.0 {
        return 0.0;
    }
    let p = w_pos / w_total;
    2.0 * p * (1.0 - p)
}

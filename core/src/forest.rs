//! Random forest ensemble with class-imbalance weighting.
//!
//! Each tree draws a bootstrap sample and a feature subset per split from
//! its own RNG streams, so trees are built in parallel without changing
//! the result. Class correction is applied through sample weights only.

use crate::{
    config::{ClassWeightMode, Hyperparameters},
    error::{PipelineError, PipelineResult},
    rng::{RngBank, StreamSlot},
    tree::{DecisionTree, TreeInput, TreeParams},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub trees:      Vec<DecisionTree>,
}

/// A fitted forest plus its normalised feature importances.
pub struct FittedForest {
    pub forest:      RandomForest,
    pub importances: Vec<f64>,
}

/// "Balanced" weights: n / (2 * n_class) for each class present.
/// `counts` are (negatives, positives), possibly bootstrap-weighted.
pub fn balanced_class_weights(counts: (f64, f64)) -> [f64; 2] {
    let (neg, pos) = counts;
    let n = neg + pos;
    let weight = |c: f64| if c > 0.0 { n / (2.0 * c) } else { 0.0 };
    [weight(neg), weight(pos)]
}

impl RandomForest {
    pub fn fit(rows: &[Vec<f64>], targets: &[u8], hp: &Hyperparameters) -> PipelineResult<FittedForest> {
        if rows.is_empty() {
            return Err(PipelineError::InsufficientData("cannot fit a forest on zero rows".into()));
        }
        let n = rows.len();
        let n_features = rows[0].len();
        let params = TreeParams {
            max_depth:         hp.max_depth,
            min_samples_split: hp.min_samples_split,
            min_samples_leaf:  hp.min_samples_leaf,
            max_features:      hp.max_features.resolve(n_features),
        };

        let positives = targets.iter().filter(|&&t| t == 1).count() as f64;
        let split_weights = match hp.class_weight_mode {
            ClassWeightMode::None => [1.0, 1.0],
            _ => balanced_class_weights((n as f64 - positives, positives)),
        };
        log::debug!(
            "Fitting {} trees (depth<={}, {} features/split), class weights {:?}",
            hp.n_estimators,
            params.max_depth,
            params.max_features,
            split_weights
        );

        let bank = RngBank::new(hp.random_seed);
        let fitted: Vec<(DecisionTree, Vec<f64>)> = (0..hp.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut boot = bank.for_tree(StreamSlot::Bootstrap, t);
                let mut counts = vec![0u32; n];
                for _ in 0..n {
                    counts[boot.next_below(n)] += 1;
                }

                let class_weights = match hp.class_weight_mode {
                    ClassWeightMode::BalancedSubsample => {
                        let (neg, pos) = counts.iter().zip(targets).fold((0.0, 0.0), |(neg, pos), (&c, &y)| {
                            if y == 1 { (neg, pos + c as f64) } else { (neg + c as f64, pos) }
                        });
                        balanced_class_weights((neg, pos))
                    }
                    _ => split_weights,
                };
                let weights: Vec<f64> = counts
                    .iter()
                    .zip(targets)
                    .map(|(&c, &y)| c as f64 * class_weights[y as usize])
                    .collect();
                let samples: Vec<usize> = (0..n).filter(|&i| weights[i] > 0.0).collect();

                let input = TreeInput { rows, targets, weights: &weights };
                let mut features = bank.for_tree(StreamSlot::FeatureSampling, t);
                let (tree, raw) = DecisionTree::fit(&input, samples, &params, &mut features);
                (tree, normalise(&raw))
            })
            .collect();

        // Summed in tree order so the result never depends on scheduling.
        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(fitted.len());
        for (tree, imp) in fitted {
            for (acc, v) in importances.iter_mut().zip(&imp) {
                *acc += v;
            }
            trees.push(tree);
        }
        let mut importances = normalise(&importances);
        if importances.iter().all(|&v| v == 0.0) && n_features > 0 {
            log::warn!("No tree found a useful split; reporting uniform feature importance");
            importances = vec![1.0 / n_features as f64; n_features];
        }

        Ok(FittedForest {
            forest: RandomForest { n_features, trees },
            importances,
        })
    }

    /// Mean positive-class probability across trees, clamped to [0, 1].
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict_proba(row)).sum();
        (sum / self.trees.len() as f64).clamp(0.0, 1.0)
    }
}

fn normalise(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter().map(|v| v / total).collect()
    } else {
        vec![0.0; values.len()]
    }
}

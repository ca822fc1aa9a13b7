//! Imbalanced classifier trainer.
//!
//! This stage:
//!   1. Splits the assembled rows into a stratified, seeded holdout
//!   2. Fits the random forest with class weighting (never resampling)
//!   3. Scores the holdout and computes positive-class metrics
//!   4. Ranks feature importance and correlates each feature with the label
//!   5. Freezes everything into a ModelArtifact
//!
//! Identical (data, seed, hyperparameters) always reproduce an identical
//! artifact and identical metrics.

use crate::{
    artifact::{ModelArtifact, RankedFeature},
    config::{Hyperparameters, RiskThresholds},
    error::{PipelineError, PipelineResult},
    features::AssembledData,
    forest::RandomForest,
    metrics::{self, HoldoutMetrics},
    rng::{RngBank, StreamSlot},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCorrelation {
    pub feature:     String,
    /// Pearson correlation with the label; None for constant columns.
    pub correlation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldoutSplit {
    pub train: Vec<usize>,
    pub test:  Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub artifact:     ModelArtifact,
    pub importance:   Vec<RankedFeature>,
    pub metrics:      HoldoutMetrics,
    pub correlations: Vec<FeatureCorrelation>,
    /// Share of bankrupt rows in the full assembled dataset.
    pub prevalence:   f64,
    pub train_rows:   usize,
    pub test_rows:    usize,
}

/// Stratified holdout: each class contributes round(n_class * fraction)
/// rows to the test side, but always keeps at least one training row.
/// Both sides are returned in ascending row order.
pub fn stratified_split(targets: &[u8], test_fraction: f64, seed: u64) -> HoldoutSplit {
    let mut rng = RngBank::new(seed).for_slot(StreamSlot::HoldoutSplit);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = (0..targets.len()).filter(|&i| targets[i] == class).collect();
        if members.is_empty() {
            continue;
        }
        rng.shuffle(&mut members);
        let n_test = ((members.len() as f64 * test_fraction).round() as usize).min(members.len() - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    HoldoutSplit { train, test }
}

pub struct Trainer<'a> {
    hyperparameters: &'a Hyperparameters,
    thresholds:      RiskThresholds,
}

impl<'a> Trainer<'a> {
    pub fn new(hyperparameters: &'a Hyperparameters, thresholds: RiskThresholds) -> Self {
        Self { hyperparameters, thresholds }
    }

    pub fn train(&self, data: &AssembledData) -> PipelineResult<TrainingReport> {
        let hp = self.hyperparameters;
        if data.len() < 2 {
            return Err(PipelineError::InsufficientData(format!(
                "training needs at least 2 rows, got {}",
                data.len()
            )));
        }

        let prevalence = data.positives() as f64 / data.len() as f64;
        log::info!(
            "Training on {} rows, {} bankrupt ({:.2}% prevalence)",
            data.len(),
            data.positives(),
            prevalence * 100.0
        );

        let split = stratified_split(&data.targets, hp.test_fraction, hp.random_seed);
        let train_x = data.features.select(&split.train);
        let train_y: Vec<u8> = split.train.iter().map(|&i| data.targets[i]).collect();
        if train_y.iter().all(|&y| y == train_y[0]) {
            log::warn!("Training split contains a single class; every tree will predict it");
        }

        let fitted = RandomForest::fit(&train_x.rows, &train_y, hp)?;
        let artifact = ModelArtifact::new(
            data.features.schema.clone(),
            &data.label_column,
            fitted.forest,
            fitted.importances,
            hp.clone(),
            self.thresholds,
        );

        let test_probs: Vec<f64> = split
            .test
            .iter()
            .map(|&i| artifact.forest().predict_proba(&data.features.rows[i]))
            .collect();
        let test_y: Vec<u8> = split.test.iter().map(|&i| data.targets[i]).collect();
        let metrics = metrics::evaluate(&test_probs, &test_y, self.thresholds.medium_max);

        let labels: Vec<f64> = data.targets.iter().map(|&t| t as f64).collect();
        let correlations = data
            .features
            .schema
            .columns
            .iter()
            .enumerate()
            .map(|(j, name)| FeatureCorrelation {
                feature:     name.clone(),
                correlation: metrics::pearson(&data.features.column(j), &labels),
            })
            .collect();

        log::info!(
            "Holdout ({} rows): accuracy {:?}, roc_auc {:?}, precision {:?}, recall {:?}",
            metrics.rows,
            metrics.accuracy,
            metrics.roc_auc,
            metrics.precision,
            metrics.recall
        );

        Ok(TrainingReport {
            importance: artifact.importance_ranking(),
            artifact,
            metrics,
            correlations,
            prevalence,
            train_rows: split.train.len(),
            test_rows: split.test.len(),
        })
    }
}

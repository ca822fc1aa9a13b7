//! Trained model artifact: the only thing training hands to scoring.
//!
//! RULE: An artifact is immutable once built. Fields are private and the
//! scorer reads it through `&ModelArtifact`. Nothing time- or host-dependent
//! is stored, so identical training inputs serialise to identical bytes.

use crate::{
    config::{Hyperparameters, RiskThresholds},
    error::PipelineResult,
    features::FeatureSchema,
    forest::RandomForest,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    engine_version:      String,
    feature_schema:      FeatureSchema,
    label_column:        String,
    forest:              RandomForest,
    feature_importances: Vec<f64>,
    random_seed:         u64,
    hyperparameters:     Hyperparameters,
    risk_thresholds:     RiskThresholds,
}

/// One row of the feature-importance report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFeature {
    pub rank:       usize,
    pub feature:    String,
    pub importance: f64,
}

impl ModelArtifact {
    pub fn new(
        feature_schema: FeatureSchema,
        label_column: impl Into<String>,
        forest: RandomForest,
        feature_importances: Vec<f64>,
        hyperparameters: Hyperparameters,
        risk_thresholds: RiskThresholds,
    ) -> Self {
        Self {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            random_seed: hyperparameters.random_seed,
            feature_schema,
            label_column: label_column.into(),
            forest,
            feature_importances,
            hyperparameters,
            risk_thresholds,
        }
    }

    pub fn feature_schema(&self) -> &FeatureSchema {
        &self.feature_schema
    }

    /// Target column the model was trained on. Scoring excludes it from features.
    pub fn label_column(&self) -> &str {
        &self.label_column
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Importances in feature-schema order.
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn random_seed(&self) -> u64 {
        self.random_seed
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn risk_thresholds(&self) -> RiskThresholds {
        self.risk_thresholds
    }

    /// Importances sorted descending; ties keep schema order.
    pub fn importance_ranking(&self) -> Vec<RankedFeature> {
        let mut pairs: Vec<(&String, f64)> = self
            .feature_schema
            .columns
            .iter()
            .zip(self.feature_importances.iter().copied())
            .collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs
            .into_iter()
            .enumerate()
            .map(|(i, (feature, importance))| RankedFeature {
                rank: i + 1,
                feature: feature.clone(),
                importance,
            })
            .collect()
    }

    pub fn to_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

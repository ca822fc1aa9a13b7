//! Risk scoring: probabilities and tiers for unseen entities.
//!
//! RULE: A feature matrix whose schema differs from the artifact's
//! training schema is rejected with FeatureSchemaMismatch before any
//! row is scored. There is no partial output.

use crate::{
    artifact::ModelArtifact,
    config::RiskThresholds,
    consolidate::index_by_entity,
    error::{PipelineError, PipelineResult},
    features::{FeatureAssembler, FeatureMatrix},
    table::SourceTable,
    types::EntityId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Closed-open bucketing against the configured boundaries.
    pub fn from_probability(p: f64, thresholds: &RiskThresholds) -> Self {
        if p < thresholds.low_max {
            RiskTier::Low
        } else if p < thresholds.medium_max {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low    => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High   => "HIGH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub entity_id:   EntityId,
    pub probability: f64,
    pub tier:        RiskTier,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSummary {
    pub low:    usize,
    pub medium: usize,
    pub high:   usize,
}

impl TierSummary {
    pub fn from_predictions(predictions: &[PredictionRecord]) -> Self {
        predictions.iter().fold(TierSummary::default(), |mut s, p| {
            match p.tier {
                RiskTier::Low    => s.low += 1,
                RiskTier::Medium => s.medium += 1,
                RiskTier::High   => s.high += 1,
            }
            s
        })
    }
}

pub struct RiskScorer<'a> {
    artifact:   &'a ModelArtifact,
    thresholds: RiskThresholds,
}

impl<'a> RiskScorer<'a> {
    /// Scorer using the thresholds frozen into the artifact.
    pub fn new(artifact: &'a ModelArtifact) -> Self {
        Self { thresholds: artifact.risk_thresholds(), artifact }
    }

    /// Override tier boundaries without retraining.
    pub fn with_thresholds(mut self, thresholds: RiskThresholds) -> PipelineResult<Self> {
        thresholds.validate()?;
        self.thresholds = thresholds;
        Ok(self)
    }

    pub fn thresholds(&self) -> RiskThresholds {
        self.thresholds
    }

    /// Score an already-assembled matrix. `entity_ids[i]` names `features.rows[i]`.
    pub fn score(&self, features: &FeatureMatrix, entity_ids: &[EntityId]) -> PipelineResult<Vec<PredictionRecord>> {
        self.artifact.feature_schema().ensure_matches(&features.schema)?;
        if entity_ids.len() != features.n_rows() {
            return Err(PipelineError::schema(
                "feature_matrix",
                format!("{} entity ids for {} rows", entity_ids.len(), features.n_rows()),
            ));
        }

        let forest = self.artifact.forest();
        Ok(features
            .rows
            .iter()
            .zip(entity_ids)
            .map(|(row, entity)| {
                let probability = forest.predict_proba(row);
                PredictionRecord {
                    entity_id: entity.clone(),
                    probability,
                    tier: RiskTier::from_probability(probability, &self.thresholds),
                }
            })
            .collect())
    }

    /// Assemble a reconciled table with the training schema, then score it.
    /// Duplicate or empty entity keys are rejected before any row is scored.
    pub fn score_table(&self, table: &SourceTable) -> PipelineResult<Vec<PredictionRecord>> {
        index_by_entity(table)?;
        let assembler =
            FeatureAssembler::new(self.artifact.feature_schema().clone(), self.artifact.label_column())?;
        let (features, entity_ids) = assembler.assemble_inference(table)?;
        let predictions = self.score(&features, &entity_ids)?;
        let summary = TierSummary::from_predictions(&predictions);
        log::info!(
            "Scored {} entities from '{}': {} LOW, {} MEDIUM, {} HIGH",
            predictions.len(),
            table.name,
            summary.low,
            summary.medium,
            summary.high
        );
        Ok(predictions)
    }
}

//! Audit events: one entry per completed stage.
//!
//! RULE: Every stage that changes what the run produces records an
//! event. The label fill count is always part of the record.

use crate::types::RunId;
use serde::{Deserialize, Serialize};

/// Variants are appended as stages are added, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        run_id: RunId,
        seed:   u64,
    },
    SourceReconciled {
        source:    String,
        local_key: String,
        rows:      usize,
        columns:   usize,
    },
    Consolidated {
        entities:         usize,
        labeled_entities: usize,
        fill_count:       usize,
        orphan_labels:    usize,
    },
    ModelTrained {
        train_rows:  usize,
        test_rows:   usize,
        prevalence:  f64,
        accuracy:    Option<f64>,
        roc_auc:     Option<f64>,
        precision:   Option<f64>,
        recall:      Option<f64>,
        top_feature: Option<String>,
    },
    PredictionsScored {
        source: String,
        rows:   usize,
        low:    usize,
        medium: usize,
        high:   usize,
    },
    RunFailed {
        stage: String,
        error: String,
    },
}

impl PipelineEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            PipelineEvent::RunStarted { .. }        => "run_started",
            PipelineEvent::SourceReconciled { .. }  => "source_reconciled",
            PipelineEvent::Consolidated { .. }      => "consolidated",
            PipelineEvent::ModelTrained { .. }      => "model_trained",
            PipelineEvent::PredictionsScored { .. } => "predictions_scored",
            PipelineEvent::RunFailed { .. }         => "run_failed",
        }
    }
}

/// A persisted event as stored in the event_log table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub stage:      String,
    pub event_type: String,
    pub payload:    String,
}

impl EventLogEntry {
    pub fn decode(&self) -> serde_json::Result<PipelineEvent> {
        serde_json::from_str(&self.payload)
    }
}

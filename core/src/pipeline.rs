//! The pipeline: wires every stage together for one run.
//!
//! EXECUTION ORDER (fixed, never reordered):
//!   1. Load       sources from delimited files (skipped when tables are passed in)
//!   2. Reconcile  each source's key column to `entity_id` (parallel per table)
//!   3. Consolidate primaries (equal coverage) + labels (left, fill-to-0)
//!   4. Assemble   the feature matrix and target vector
//!   5. Train      the weighted random forest, evaluate on the holdout
//!   6. Score      the inference set and bucket into tiers
//!
//! RULES:
//!   - Stages share no mutable state; each consumes the previous stage's value.
//!   - A failed stage aborts the run; nothing is retried.
//!   - Artifacts reach the store only after the stage producing them succeeded.

use crate::{
    artifact::ModelArtifact,
    config::PipelineConfig,
    consolidate::{consolidate, index_by_entity, ConsolidatedDataset},
    error::{PipelineError, PipelineResult},
    event::PipelineEvent,
    features::{FeatureAssembler, FeatureSchema},
    ingest,
    reconcile::{prefix_columns, reconcile_all},
    scorer::{PredictionRecord, RiskScorer, TierSummary},
    store::PipelineStore,
    table::SourceTable,
    trainer::{Trainer, TrainingReport},
    types::RunId,
};
use std::collections::BTreeMap;

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id:       RunId,
    pub consolidated: ConsolidatedDataset,
    pub training:     TrainingReport,
    pub predictions:  Vec<PredictionRecord>,
}

impl PipelineOutcome {
    pub fn artifact(&self) -> &ModelArtifact {
        &self.training.artifact
    }
}

pub struct RiskPipeline<'a> {
    pub run_id: RunId,
    config:     &'a PipelineConfig,
    store:      &'a PipelineStore,
}

impl<'a> RiskPipeline<'a> {
    pub fn new(run_id: RunId, config: &'a PipelineConfig, store: &'a PipelineStore) -> Self {
        Self { run_id, config, store }
    }

    /// Load every configured source from disk and run.
    pub fn run(&self) -> PipelineResult<PipelineOutcome> {
        let sources = self.load_sources()?;
        self.run_with_sources(&sources)
    }

    /// Read each source named by the config. Key columns stay text.
    pub fn load_sources(&self) -> PipelineResult<BTreeMap<String, SourceTable>> {
        let mut tables = BTreeMap::new();
        for name in self.config.source_names() {
            let source = self.config.sources.get(name).ok_or_else(|| {
                PipelineError::Config(format!("no file configured for source '{name}'"))
            })?;
            let key = self.config.local_key(name)?;
            tables.insert(name.to_string(), ingest::load_source(name, source, &[key])?);
        }
        Ok(tables)
    }

    /// Run every stage on tables already in memory.
    pub fn run_with_sources(&self, sources: &BTreeMap<String, SourceTable>) -> PipelineResult<PipelineOutcome> {
        let config = self.config;
        config.validate()?;
        self.store.insert_run(&self.run_id, config.hyperparameters.random_seed, env!("CARGO_PKG_VERSION"))?;
        self.store.append_event(
            &self.run_id,
            "engine",
            &PipelineEvent::RunStarted {
                run_id: self.run_id.clone(),
                seed:   config.hyperparameters.random_seed,
            },
        )?;

        let result = self.execute(sources);
        match &result {
            Ok(_) => self.store.finish_run(&self.run_id, "succeeded")?,
            Err(e) => {
                log::error!("Run {} failed: {e}", self.run_id);
                self.store.append_event(
                    &self.run_id,
                    "engine",
                    &PipelineEvent::RunFailed { stage: "pipeline".into(), error: e.to_string() },
                )?;
                self.store.finish_run(&self.run_id, "failed")?;
            }
        }
        result
    }

    fn execute(&self, sources: &BTreeMap<String, SourceTable>) -> PipelineResult<PipelineOutcome> {
        let config = self.config;
        let mut reconciled = self.reconcile_sources(sources)?;

        // ── Consolidate ───────────────────────────────────────
        let primaries: Vec<SourceTable> = config
            .primary_sources
            .iter()
            .map(|name| take(&mut reconciled, name))
            .collect::<PipelineResult<_>>()?;
        let labels = take(&mut reconciled, &config.label_source)?;
        // Key integrity of the inference set is checked before any artifact is stored.
        let inference_source = match &config.inference_source {
            Some(name) => {
                let table = take(&mut reconciled, name)?;
                index_by_entity(&table)?;
                Some(table)
            }
            None => None,
        };
        let consolidated = consolidate(&primaries, &labels, &config.label_column)?;

        // ── Assemble + train ─────────────────────────────────
        let schema = FeatureSchema::new(config.feature_schema_version, config.feature_columns.clone());
        let assembler = FeatureAssembler::new(schema, &config.label_column)?;
        let assembled = assembler.assemble(&consolidated)?;

        self.store.save_consolidated(&self.run_id, &consolidated)?;
        let report = &consolidated.report;
        self.store.append_event(
            &self.run_id,
            "consolidate",
            &PipelineEvent::Consolidated {
                entities:         report.primary_entities,
                labeled_entities: report.labeled_entities,
                fill_count:       report.fill_count,
                orphan_labels:    report.orphan_labels,
            },
        )?;

        let training = Trainer::new(&config.hyperparameters, config.risk_thresholds).train(&assembled)?;
        self.store.save_model(&self.run_id, &training.artifact, &training.importance, &training.metrics)?;
        self.store.append_event(
            &self.run_id,
            "train",
            &PipelineEvent::ModelTrained {
                train_rows:  training.train_rows,
                test_rows:   training.test_rows,
                prevalence:  training.prevalence,
                accuracy:    training.metrics.accuracy,
                roc_auc:     training.metrics.roc_auc,
                precision:   training.metrics.precision,
                recall:      training.metrics.recall,
                top_feature: training.importance.first().map(|f| f.feature.clone()),
            },
        )?;

        // ── Score ────────────────────────────────────────────
        let inference = match inference_source {
            Some(table) => table,
            None => consolidated.subset(&consolidated.report.imputed_entities),
        };
        let scorer = RiskScorer::new(&training.artifact);
        let predictions = scorer.score_table(&inference)?;
        self.store.save_predictions(&self.run_id, &predictions)?;
        let summary = TierSummary::from_predictions(&predictions);
        self.store.append_event(
            &self.run_id,
            "score",
            &PipelineEvent::PredictionsScored {
                source: inference.name.clone(),
                rows:   predictions.len(),
                low:    summary.low,
                medium: summary.medium,
                high:   summary.high,
            },
        )?;

        Ok(PipelineOutcome {
            run_id: self.run_id.clone(),
            consolidated,
            training,
            predictions,
        })
    }

    fn reconcile_sources(&self, sources: &BTreeMap<String, SourceTable>) -> PipelineResult<BTreeMap<String, SourceTable>> {
        let names = self.config.source_names();
        let inputs: Vec<(&SourceTable, &str)> = names
            .iter()
            .map(|&name| {
                let table = sources
                    .get(name)
                    .ok_or_else(|| PipelineError::Config(format!("source '{name}' was not provided")))?;
                Ok((table, self.config.local_key(name)?))
            })
            .collect::<PipelineResult<_>>()?;

        let reconciled = reconcile_all(&inputs)?;
        let mut out = BTreeMap::new();
        for ((name, (_, key)), table) in names.iter().zip(&inputs).zip(reconciled) {
            // The label source is never namespaced: label_column names it directly.
            let prefix = self
                .config
                .sources
                .get(*name)
                .and_then(|s| s.column_prefix.as_deref())
                .filter(|_| *name != self.config.label_source);
            let table = match prefix {
                Some(prefix) => prefix_columns(&table, prefix),
                None => table,
            };
            self.store.append_event(
                &self.run_id,
                "reconcile",
                &PipelineEvent::SourceReconciled {
                    source:    name.to_string(),
                    local_key: key.to_string(),
                    rows:      table.row_count(),
                    columns:   table.schema.len(),
                },
            )?;
            out.insert(name.to_string(), table);
        }
        Ok(out)
    }
}

fn take(tables: &mut BTreeMap<String, SourceTable>, name: &str) -> PipelineResult<SourceTable> {
    tables
        .remove(name)
        .ok_or_else(|| PipelineError::Config(format!("source '{name}' was not provided")))
}

//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! Stages return values; the pipeline hands them to the store.
//! Every artifact is written inside one transaction, so a failed run
//! never leaves a half-written dataset, model or prediction set behind.

use crate::{
    artifact::{ModelArtifact, RankedFeature},
    consolidate::ConsolidatedDataset,
    error::{PipelineError, PipelineResult},
    event::{EventLogEntry, PipelineEvent},
    metrics::HoldoutMetrics,
    scorer::{PredictionRecord, RiskTier},
    table::Cell,
    types::ENTITY_ID,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;

pub struct PipelineStore {
    conn: Connection,
}

impl PipelineStore {
    /// Open (or create) the pipeline database at `path`.
    pub fn open(path: &str) -> PipelineResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; in-memory databases ignore it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PipelineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PipelineResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        self.conn.execute_batch(include_str!("../../migrations/002_artifacts.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: u64, version: &str) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, version, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, seed.to_string(), version, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn finish_run(&self, run_id: &str, status: &str) -> PipelineResult<()> {
        self.conn.execute(
            "UPDATE run SET status = ?2, finished_at = ?3 WHERE run_id = ?1",
            params![run_id, status, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn run_status(&self, run_id: &str) -> PipelineResult<Option<String>> {
        let status = self
            .conn
            .query_row("SELECT status FROM run WHERE run_id = ?1", params![run_id], |row| row.get(0))
            .optional()?;
        Ok(status)
    }

    /// Seed recorded for a run. Stored as decimal text to keep the full u64 range.
    pub fn run_seed(&self, run_id: &str) -> PipelineResult<Option<u64>> {
        let seed: Option<String> = self
            .conn
            .query_row("SELECT seed FROM run WHERE run_id = ?1", params![run_id], |row| row.get(0))
            .optional()?;
        seed.map(|s| {
            s.parse::<u64>()
                .map_err(|e| PipelineError::Other(anyhow::anyhow!("run '{run_id}' has unreadable seed '{s}': {e}")))
        })
        .transpose()
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, run_id: &str, stage: &str, event: &PipelineEvent) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, stage, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id,
                stage,
                event.type_name(),
                serde_json::to_string(event)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn events_for_run(&self, run_id: &str) -> PipelineResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, stage, event_type, payload
             FROM event_log WHERE run_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    run_id:     row.get(1)?,
                    stage:      row.get(2)?,
                    event_type: row.get(3)?,
                    payload:    row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Consolidated dataset ───────────────────────────────────

    pub fn save_consolidated(&self, run_id: &str, dataset: &ConsolidatedDataset) -> PipelineResult<()> {
        let table = &dataset.table;
        let label_idx = table.column_index(&dataset.label_column)?;
        let feature_cols: Vec<(usize, &str)> = table
            .schema
            .columns
            .iter()
            .enumerate()
            .filter(|(i, c)| *i != label_idx && c.name != ENTITY_ID)
            .map(|(i, c)| (i, c.name.as_str()))
            .collect();
        let imputed: HashSet<&str> = dataset.report.imputed_entities.iter().map(String::as_str).collect();

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO consolidated_row (run_id, row_no, entity_id, features, label, label_filled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (row_no, row) in table.rows.iter().enumerate() {
                let entity = row[0].render();
                let label = row[label_idx].as_f64().ok_or_else(|| PipelineError::LabelDomain {
                    entity_id: entity.clone(),
                    value:     row[label_idx].render(),
                })?;
                let features: serde_json::Map<String, serde_json::Value> = feature_cols
                    .iter()
                    .map(|&(i, name)| (name.to_string(), cell_json(&row[i])))
                    .collect();
                stmt.execute(params![
                    run_id,
                    row_no as i64,
                    entity,
                    serde_json::Value::Object(features).to_string(),
                    label,
                    imputed.contains(entity.as_str()),
                ])?;
            }
        }
        tx.execute(
            "INSERT INTO consolidation_report (run_id, report) VALUES (?1, ?2)",
            params![run_id, serde_json::to_string(&dataset.report)?],
        )?;
        tx.commit()?;
        log::debug!("Stored {} consolidated rows for {run_id}", table.row_count());
        Ok(())
    }

    pub fn consolidated_count(&self, run_id: &str) -> PipelineResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM consolidated_row WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// (entity_id, label, label_filled) in consolidation order.
    pub fn consolidated_labels(&self, run_id: &str) -> PipelineResult<Vec<(String, f64, bool)>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, label, label_filled FROM consolidated_row
             WHERE run_id = ?1 ORDER BY row_no ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Model ──────────────────────────────────────────────────

    pub fn save_model(
        &self,
        run_id: &str,
        artifact: &ModelArtifact,
        importance: &[RankedFeature],
        metrics: &HoldoutMetrics,
    ) -> PipelineResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO model_artifact (run_id, artifact, metrics) VALUES (?1, ?2, ?3)",
            params![run_id, artifact.to_json()?, serde_json::to_string(metrics)?],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO feature_importance (run_id, rank, feature, importance)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for f in importance {
                stmt.execute(params![run_id, f.rank as i64, f.feature, f.importance])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_model(&self, run_id: &str) -> PipelineResult<Option<ModelArtifact>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT artifact FROM model_artifact WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| ModelArtifact::from_json(&j)).transpose()
    }

    pub fn feature_importance(&self, run_id: &str) -> PipelineResult<Vec<RankedFeature>> {
        let mut stmt = self.conn.prepare(
            "SELECT rank, feature, importance FROM feature_importance
             WHERE run_id = ?1 ORDER BY rank ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(RankedFeature {
                    rank:       row.get::<_, i64>(0)? as usize,
                    feature:    row.get(1)?,
                    importance: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Predictions ────────────────────────────────────────────

    pub fn save_predictions(&self, run_id: &str, predictions: &[PredictionRecord]) -> PipelineResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO prediction (run_id, entity_id, probability, tier)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for p in predictions {
                stmt.execute(params![run_id, p.entity_id, p.probability, p.tier.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn predictions(&self, run_id: &str) -> PipelineResult<Vec<PredictionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, probability, tier FROM prediction
             WHERE run_id = ?1 ORDER BY entity_id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                let tier: String = row.get(2)?;
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?, tier))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(entity_id, probability, tier)| {
                let tier = match tier.as_str() {
                    "LOW"    => RiskTier::Low,
                    "MEDIUM" => RiskTier::Medium,
                    "HIGH"   => RiskTier::High,
                    other => {
                        return Err(PipelineError::Other(anyhow::anyhow!("unknown tier '{other}' for {entity_id}")))
                    }
                };
                Ok(PredictionRecord { entity_id, probability, tier })
            })
            .collect()
    }
}

fn cell_json(cell: &Cell) -> serde_json::Value {
    match cell {
        Cell::Number(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Cell::Text(s) => serde_json::Value::String(s.clone()),
        Cell::Null => serde_json::Value::Null,
    }
}

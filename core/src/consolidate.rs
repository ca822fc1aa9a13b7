//! Consolidation join engine.
//!
//! RULES:
//!   - Primary sources define the entity universe and must cover exactly
//!     the same entities. An entity missing from any primary is a
//!     JoinKey error, never a silently dropped row.
//!   - The label source is LEFT-joined: no primary entity is ever dropped
//!     because it was never labeled.
//!   - A label left null by the join is filled with 0 by `fill_missing_label`.
//!     Every fill is counted and the imputed entities are reported.
//!   - One record per entity per source. Duplicates abort the run.

use crate::{
    error::{PipelineError, PipelineResult},
    table::{Cell, ColumnDescriptor, SourceTable, TableSchema},
    types::{EntityId, ENTITY_ID},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Rows per partition for the label join.
const PARTITION_ROWS: usize = 4096;

/// Value assigned to entities absent from the label source.
pub const FILLED_LABEL: f64 = 0.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub primary_entities: usize,
    pub labeled_entities: usize,
    pub fill_count:       usize,
    pub imputed_entities: Vec<EntityId>,
    pub orphan_labels:    usize,
}

/// One row per entity: entity_id, primary columns in source order, label.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedDataset {
    pub table:        SourceTable,
    pub label_column: String,
    pub report:       ConsolidationReport,
}

impl ConsolidatedDataset {
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.table
            .rows
            .iter()
            .filter_map(|r| r[0].key_string())
            .collect()
    }

    /// Label cell for one entity, if that entity is in the dataset.
    pub fn label_of(&self, entity_id: &str) -> Option<&Cell> {
        let idx = self.table.schema.index_of(&self.label_column)?;
        self.table
            .rows
            .iter()
            .find(|r| r[0].key_string().as_deref() == Some(entity_id))
            .map(|r| &r[idx])
    }

    /// Keep only the given entities, preserving row order.
    pub fn subset(&self, entity_ids: &[EntityId]) -> SourceTable {
        let wanted: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();
        let rows = self
            .table
            .rows
            .iter()
            .filter(|r| r[0].key_string().is_some_and(|k| wanted.contains(k.as_str())))
            .cloned()
            .collect();
        SourceTable {
            name:   format!("{}_subset", self.table.name),
            schema: self.table.schema.clone(),
            rows,
        }
    }
}

/// Index a reconciled table by entity id, rejecting duplicate and empty keys.
pub fn index_by_entity(table: &SourceTable) -> PipelineResult<HashMap<EntityId, usize>> {
    let key_idx = table.schema.index_of(ENTITY_ID).ok_or_else(|| PipelineError::JoinKey {
        source_name: table.name.clone(),
        key:         ENTITY_ID.to_string(),
        row:         None,
        entity_id:   None,
    })?;

    let mut index = HashMap::with_capacity(table.row_count());
    for (row_no, row) in table.rows.iter().enumerate() {
        let key = row[key_idx].key_string().ok_or_else(|| PipelineError::JoinKey {
            source_name: table.name.clone(),
            key:         ENTITY_ID.to_string(),
            row:         Some(row_no),
            entity_id:   None,
        })?;
        if index.insert(key.clone(), row_no).is_some() {
            return Err(PipelineError::DuplicateKey {
                source_name: table.name.clone(),
                entity_id:   key,
            });
        }
    }
    Ok(index)
}

/// Merge primaries (equal coverage) and labels (left) into one row per entity.
pub fn consolidate(
    primaries: &[SourceTable],
    labels: &SourceTable,
    label_column: &str,
) -> PipelineResult<ConsolidatedDataset> {
    let first = primaries
        .first()
        .ok_or_else(|| PipelineError::Config("at least one primary source is required".into()))?;

    let primary_indexes: Vec<HashMap<EntityId, usize>> =
        primaries.iter().map(index_by_entity).collect::<PipelineResult<_>>()?;
    let label_index = index_by_entity(labels)?;
    let label_idx = labels.column_index(label_column)?;

    let schema = merged_schema(primaries, labels, label_column)?;

    ensure_same_coverage(primaries, &primary_indexes)?;

    // ── Primary join ────────────────────────────────────────
    // Coverage is identical, so the first primary's order defines U.
    let first_key = first.column_index(ENTITY_ID)?;
    let mut merged: Vec<(EntityId, Vec<Cell>)> = Vec::with_capacity(first.row_count());
    for row in &first.rows {
        let Some(entity) = row[first_key].key_string() else { continue };
        let mut cells = vec![Cell::Text(entity.clone())];
        for (table, index) in primaries.iter().zip(&primary_indexes) {
            let key_idx = table.column_index(ENTITY_ID)?;
            let src = &table.rows[index[&entity]];
            cells.extend(
                src.iter()
                    .enumerate()
                    .filter(|(i, _)| *i != key_idx)
                    .map(|(_, c)| c.clone()),
            );
        }
        merged.push((entity, cells));
    }

    // ── Label left join, partition-local fill counts ───────
    let partitions: Vec<(Vec<Vec<Cell>>, Vec<EntityId>)> = merged
        .par_chunks(PARTITION_ROWS)
        .map(|chunk| {
            let mut rows = Vec::with_capacity(chunk.len());
            let mut imputed = Vec::new();
            for (entity, cells) in chunk {
                let found = label_index.get(entity).map(|&r| &labels.rows[r][label_idx]);
                let (label, filled) = fill_missing_label(found);
                if filled {
                    imputed.push(entity.clone());
                }
                let mut row = cells.clone();
                row.push(label);
                rows.push(row);
            }
            (rows, imputed)
        })
        .collect();

    let mut rows = Vec::with_capacity(merged.len());
    let mut imputed_entities = Vec::new();
    for (part_rows, part_imputed) in partitions {
        rows.extend(part_rows);
        imputed_entities.extend(part_imputed);
    }
    let fill_count = imputed_entities.len();

    let universe: HashSet<&str> = merged.iter().map(|(e, _)| e.as_str()).collect();
    let labeled_entities = label_index.keys().filter(|k| universe.contains(k.as_str())).count();
    let orphan_labels = label_index.len() - labeled_entities;
    if orphan_labels > 0 {
        log::warn!("{orphan_labels} labels in '{}' match no primary entity and were ignored", labels.name);
    }

    let table = SourceTable::new("consolidated", schema, rows)?;
    let report = ConsolidationReport {
        primary_entities: table.row_count(),
        labeled_entities,
        fill_count,
        imputed_entities,
        orphan_labels,
    };
    log::info!(
        "Consolidated {} entities ({} labeled, {} label fills)",
        report.primary_entities,
        report.labeled_entities,
        report.fill_count
    );

    Ok(ConsolidatedDataset {
        table,
        label_column: label_column.to_string(),
        report,
    })
}

/// The missing-label policy: an entity with no label (absent from the
/// label source, or present with an empty label) is treated as not
/// bankrupt. Returns the label cell and whether it was filled.
pub fn fill_missing_label(found: Option<&Cell>) -> (Cell, bool) {
    match found {
        Some(cell) if !cell.is_null() => (cell.clone(), false),
        _ => (Cell::Number(FILLED_LABEL), true),
    }
}

/// Every primary must carry every entity any other primary carries.
/// Scans in source and row order so the reported entity is deterministic.
fn ensure_same_coverage(
    primaries: &[SourceTable],
    indexes: &[HashMap<EntityId, usize>],
) -> PipelineResult<()> {
    for table in primaries {
        let key_idx = table.column_index(ENTITY_ID)?;
        for entity in table.rows.iter().filter_map(|r| r[key_idx].key_string()) {
            let missing = primaries.iter().zip(indexes).find(|(_, ix)| !ix.contains_key(&entity));
            if let Some((other, _)) = missing {
                return Err(PipelineError::JoinKey {
                    source_name: other.name.clone(),
                    key:         ENTITY_ID.to_string(),
                    row:         None,
                    entity_id:   Some(entity),
                });
            }
        }
    }
    Ok(())
}

fn merged_schema(
    primaries: &[SourceTable],
    labels: &SourceTable,
    label_column: &str,
) -> PipelineResult<TableSchema> {
    let mut columns = vec![ColumnDescriptor::text(ENTITY_ID)];
    let mut owner: HashMap<String, &str> = HashMap::new();

    for table in primaries {
        for col in table.schema.columns.iter().filter(|c| c.name != ENTITY_ID) {
            if col.name == label_column {
                return Err(PipelineError::schema(
                    &table.name,
                    format!("primary column '{}' collides with the label column", col.name),
                ));
            }
            if let Some(prev) = owner.insert(col.name.clone(), &table.name) {
                return Err(PipelineError::schema(
                    &table.name,
                    format!("column '{}' also present in '{prev}'; namespace one of them", col.name),
                ));
            }
            columns.push(col.clone());
        }
    }

    // A text label column is carried as-is; the feature assembler rejects it.
    let label_kind = labels.schema.columns[labels.column_index(label_column)?].kind;
    columns.push(ColumnDescriptor {
        name: label_column.to_string(),
        kind: label_kind,
    });
    Ok(TableSchema::new(columns))
}

//! Schema reconciliation: renames each source's local key column to the
//! canonical `entity_id`.
//!
//! RULE: Mappings come from configuration only. Nothing here guesses
//! which column is the key.

use crate::{
    error::{PipelineError, PipelineResult},
    table::SourceTable,
    types::ENTITY_ID,
};
use rayon::prelude::*;

/// Return a copy of `table` whose `local_key` column is named `entity_id`.
/// Every other column passes through untouched.
pub fn reconcile(table: &SourceTable, local_key: &str) -> PipelineResult<SourceTable> {
    let key_idx = table.schema.index_of(local_key).ok_or_else(|| {
        PipelineError::schema(&table.name, format!("declared key column '{local_key}' not found"))
    })?;

    if local_key == ENTITY_ID {
        return Ok(table.clone());
    }
    if table.schema.contains(ENTITY_ID) {
        return Err(PipelineError::schema(
            &table.name,
            format!("renaming '{local_key}' would collide with existing column '{ENTITY_ID}'"),
        ));
    }

    let mut out = table.clone();
    out.schema.columns[key_idx].name = ENTITY_ID.to_string();
    log::debug!("Reconciled '{}': '{local_key}' -> '{ENTITY_ID}'", table.name);
    Ok(out)
}

/// Reconcile independent tables in parallel. Output order matches input.
pub fn reconcile_all(tables: &[(&SourceTable, &str)]) -> PipelineResult<Vec<SourceTable>> {
    tables
        .par_iter()
        .map(|(table, key)| reconcile(table, key))
        .collect()
}

/// Namespace every non-key column as `<prefix>.<column>`.
pub fn prefix_columns(table: &SourceTable, prefix: &str) -> SourceTable {
    let mut out = table.clone();
    for col in out.schema.columns.iter_mut().filter(|c| c.name != ENTITY_ID) {
        col.name = format!("{prefix}.{}", col.name);
    }
    out
}

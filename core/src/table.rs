//! Typed tabular data shared by every stage.
//!
//! RULE: Stages never probe columns by position or guess types.
//! Every lookup goes through the TableSchema, and every failure
//! is an explicit PipelineError rather than a silent coercion.

use crate::{
    error::{PipelineError, PipelineResult},
    types::EntityId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnDescriptor {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ColumnKind::Numeric }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ColumnKind::Text }
    }
}

/// Ordered list of typed column descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// First column name that appears more than once, if any.
    pub fn first_duplicate(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .find(|c| !seen.insert(c.name.as_str()))
            .map(|c| c.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Number(f64),
    Text(String),
    Null,
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Entity key representation. Numeric keys render without a
    /// trailing ".0" so `7` and `"7"` identify the same entity.
    pub fn key_string(&self) -> Option<EntityId> {
        match self {
            Cell::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Cell::Number(v) => Some(format!("{v}")),
            _ => None,
        }
    }

    /// Plain-text rendering used by exports and error messages.
    pub fn render(&self) -> String {
        match self {
            Cell::Number(v) => format!("{v}"),
            Cell::Text(s) => s.clone(),
            Cell::Null => String::new(),
        }
    }
}

/// A named table: typed schema plus row-major cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTable {
    pub name: String,
    pub schema: TableSchema,
    pub rows: Vec<Vec<Cell>>,
}

impl SourceTable {
    /// Build a table, checking that every row matches the schema width.
    pub fn new(
        name: impl Into<String>,
        schema: TableSchema,
        rows: Vec<Vec<Cell>>,
    ) -> PipelineResult<Self> {
        let name = name.into();
        if let Some(dup) = schema.first_duplicate() {
            return Err(PipelineError::schema(&name, format!("column '{dup}' declared twice")));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != schema.len()) {
            return Err(PipelineError::schema(
                &name,
                format!("row {i} has {} cells, schema has {} columns", row.len(), schema.len()),
            ));
        }
        Ok(Self { name, schema, rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> PipelineResult<usize> {
        self.schema
            .index_of(name)
            .ok_or_else(|| PipelineError::schema(&self.name, format!("missing column '{name}'")))
    }

    /// Cells of one column, in row order.
    pub fn column(&self, name: &str) -> PipelineResult<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }
}

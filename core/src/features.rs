//! Feature assembly: the typed boundary between tables and the model.
//!
//! RULE: The declared feature schema (ordered names + version) is the
//! only way columns reach the classifier. At inference time any
//! disagreement with the training schema is FeatureSchemaMismatch.
//! Columns are never reordered, dropped or imputed to make data fit.

use crate::{
    consolidate::ConsolidatedDataset,
    error::{PipelineError, PipelineResult},
    table::{Cell, ColumnKind, SourceTable},
    types::{EntityId, ENTITY_ID},
};
use serde::{Deserialize, Serialize};

/// Ordered, versioned list of feature columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(version: u32, columns: Vec<String>) -> Self {
        Self { version, columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Fail unless `actual` is exactly this schema: same version, same
    /// names, same order.
    pub fn ensure_matches(&self, actual: &FeatureSchema) -> PipelineResult<()> {
        if self == actual {
            return Ok(());
        }
        Err(PipelineError::FeatureSchemaMismatch {
            expected:         self.columns.clone(),
            expected_version: self.version,
            actual:           actual.columns.clone(),
            actual_version:   actual.version,
        })
    }
}

/// Row-major numeric matrix tagged with the schema that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub schema: FeatureSchema,
    pub rows:   Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Build a matrix directly, checking every row's width.
    pub fn from_rows(schema: FeatureSchema, rows: Vec<Vec<f64>>) -> PipelineResult<Self> {
        if let Some(i) = rows.iter().position(|r| r.len() != schema.len()) {
            return Err(PipelineError::schema(
                "feature_matrix",
                format!("row {i} has {} values, schema has {}", rows[i].len(), schema.len()),
            ));
        }
        Ok(Self { schema, rows })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.schema.len()
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[j]).collect()
    }

    /// Rows at the given positions, in that order.
    pub fn select(&self, positions: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            schema: self.schema.clone(),
            rows:   positions.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// Aligned training view: `features.rows[i]`, `targets[i]` and
/// `entity_ids[i]` always describe the same entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledData {
    pub features:     FeatureMatrix,
    pub targets:      Vec<u8>,
    pub entity_ids:   Vec<EntityId>,
    pub label_column: String,
}

impl AssembledData {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.targets.iter().filter(|&&t| t == 1).count()
    }
}

pub struct FeatureAssembler {
    schema:       FeatureSchema,
    label_column: String,
}

impl FeatureAssembler {
    pub fn new(schema: FeatureSchema, label_column: impl Into<String>) -> PipelineResult<Self> {
        let label_column = label_column.into();
        if schema.columns.iter().any(|c| *c == label_column || c == ENTITY_ID) {
            return Err(PipelineError::schema(
                "feature_schema",
                format!("feature columns may not include '{label_column}' or '{ENTITY_ID}'"),
            ));
        }
        Ok(Self { schema, label_column })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Training-time assembly from the consolidated dataset.
    pub fn assemble(&self, dataset: &ConsolidatedDataset) -> PipelineResult<AssembledData> {
        let table = &dataset.table;
        let (features, entity_ids) = self.extract(table, false)?;

        let label_idx = table.column_index(&self.label_column)?;
        let targets = table
            .rows
            .iter()
            .zip(&entity_ids)
            .map(|(row, entity)| label_value(&row[label_idx], entity))
            .collect::<PipelineResult<Vec<u8>>>()?;

        log::debug!(
            "Assembled {} rows x {} features ({} positive)",
            features.n_rows(),
            features.n_features(),
            targets.iter().filter(|&&t| t == 1).count()
        );
        Ok(AssembledData {
            features,
            targets,
            entity_ids,
            label_column: self.label_column.clone(),
        })
    }

    /// Inference-time assembly. A declared feature the table lacks is a
    /// schema mismatch, not a generic schema error.
    pub fn assemble_inference(&self, table: &SourceTable) -> PipelineResult<(FeatureMatrix, Vec<EntityId>)> {
        self.extract(table, true)
    }

    fn extract(&self, table: &SourceTable, inference: bool) -> PipelineResult<(FeatureMatrix, Vec<EntityId>)> {
        let key_idx = table.schema.index_of(ENTITY_ID).ok_or_else(|| PipelineError::JoinKey {
            source_name: table.name.clone(),
            key:         ENTITY_ID.to_string(),
            row:         None,
            entity_id:   None,
        })?;

        let mut indices = Vec::with_capacity(self.schema.len());
        for name in &self.schema.columns {
            let Some(idx) = table.schema.index_of(name) else {
                if inference {
                    let present: Vec<String> = self
                        .schema
                        .columns
                        .iter()
                        .filter(|c| table.schema.contains(c))
                        .cloned()
                        .collect();
                    return Err(PipelineError::FeatureSchemaMismatch {
                        expected:         self.schema.columns.clone(),
                        expected_version: self.schema.version,
                        actual:           present,
                        actual_version:   self.schema.version,
                    });
                }
                return Err(PipelineError::schema(&table.name, format!("missing feature column '{name}'")));
            };
            if table.schema.columns[idx].kind != ColumnKind::Numeric {
                return Err(PipelineError::schema(&table.name, format!("feature column '{name}' is not numeric")));
            }
            indices.push(idx);
        }

        let mut rows = Vec::with_capacity(table.row_count());
        let mut entity_ids = Vec::with_capacity(table.row_count());
        for (row_no, row) in table.rows.iter().enumerate() {
            let entity = row[key_idx].key_string().ok_or_else(|| PipelineError::JoinKey {
                source_name: table.name.clone(),
                key:         ENTITY_ID.to_string(),
                row:         Some(row_no),
                entity_id:   None,
            })?;
            let values = indices
                .iter()
                .zip(&self.schema.columns)
                .map(|(&i, name)| {
                    row[i].as_f64().ok_or_else(|| {
                        PipelineError::schema(
                            &table.name,
                            format!("entity '{entity}' has no value for feature '{name}'"),
                        )
                    })
                })
                .collect::<PipelineResult<Vec<f64>>>()?;
            rows.push(values);
            entity_ids.push(entity);
        }

        Ok((FeatureMatrix { schema: self.schema.clone(), rows }, entity_ids))
    }
}

fn label_value(cell: &Cell, entity: &str) -> PipelineResult<u8> {
    match cell {
        Cell::Number(v) if *v == 0.0 => Ok(0),
        Cell::Number(v) if *v == 1.0 => Ok(1),
        other => Err(PipelineError::LabelDomain {
            entity_id: entity.to_string(),
            value:     other.render(),
        }),
    }
}

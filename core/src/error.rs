use thiserror::Error;

/// Every failure the pipeline can surface.
///
/// The first five variants are data-contract violations: they are never
/// retried and always name the offending source, column or entity.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Schema error in '{source_name}': {detail}")]
    Schema { source_name: String, detail: String },

    #[error("Join key '{key}' missing from '{source_name}'{}", key_detail(.row, .entity_id))]
    JoinKey {
        source_name: String,
        key: String,
        row: Option<usize>,
        entity_id: Option<String>,
    },

    #[error("Duplicate entity '{entity_id}' in source '{source_name}'")]
    DuplicateKey { source_name: String, entity_id: String },

    #[error("Label for entity '{entity_id}' is '{value}', expected 0 or 1")]
    LabelDomain { entity_id: String, value: String },

    #[error("Feature schema mismatch: expected {expected:?} (v{expected_version}), got {actual:?} (v{actual_version})")]
    FeatureSchemaMismatch {
        expected: Vec<String>,
        expected_version: u32,
        actual: Vec<String>,
        actual_version: u32,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn schema(source_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Schema {
            source_name: source_name.into(),
            detail: detail.into(),
        }
    }
}

fn key_detail(row: &Option<usize>, entity_id: &Option<String>) -> String {
    match (row, entity_id) {
        (Some(r), _) => format!(" (empty key at row {r})"),
        (None, Some(e)) => format!(" (no record for entity '{e}')"),
        (None, None) => String::new(),
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

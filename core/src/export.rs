//! File exports of the three run artifacts.

use crate::{
    artifact::{ModelArtifact, RankedFeature},
    consolidate::ConsolidatedDataset,
    error::PipelineResult,
    scorer::PredictionRecord,
};
use std::path::{Path, PathBuf};

pub const CONSOLIDATED_FILE: &str = "consolidated.csv";
pub const MODEL_FILE: &str = "model.json";
pub const IMPORTANCE_FILE: &str = "feature_importance.csv";
pub const PREDICTIONS_FILE: &str = "predictions.csv";

/// Write entity_id, features…, label with a header row.
pub fn write_consolidated(path: &Path, dataset: &ConsolidatedDataset) -> PipelineResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)?;
    writer.write_record(dataset.table.schema.columns.iter().map(|c| c.name.as_str()))?;
    for row in &dataset.table.rows {
        writer.write_record(row.iter().map(|c| c.render()))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_importance(path: &Path, ranking: &[RankedFeature]) -> PipelineResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)?;
    for feature in ranking {
        writer.serialize(feature)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_predictions(path: &Path, predictions: &[PredictionRecord]) -> PipelineResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)?;
    for p in predictions {
        writer.serialize(p)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write every artifact into `dir`, creating it if needed.
/// Returns the paths written, in a stable order.
pub fn write_all(
    dir: &Path,
    dataset: &ConsolidatedDataset,
    artifact: &ModelArtifact,
    predictions: &[PredictionRecord],
) -> PipelineResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let paths = [CONSOLIDATED_FILE, MODEL_FILE, IMPORTANCE_FILE, PREDICTIONS_FILE].map(|f| dir.join(f));

    write_consolidated(&paths[0], dataset)?;
    artifact.save(&paths[1])?;
    write_importance(&paths[2], &artifact.importance_ranking())?;
    write_predictions(&paths[3], predictions)?;

    log::info!("Wrote {} artifacts to {}", paths.len(), dir.display());
    Ok(paths.to_vec())
}

//! risk-runner: headless batch runner for the bankruptcy risk pipeline.
//!
//! Usage:
//!   risk-runner --config pipeline.json --db run.db --out ./out [--json]
//!   risk-runner score --model ./out/model.json --input new.csv --key company --delimiter ';'

use anyhow::{bail, Result};
use bankrisk_core::{
    artifact::ModelArtifact,
    config::{PipelineConfig, SourceConfig},
    export,
    ingest,
    pipeline::{PipelineOutcome, RiskPipeline},
    reconcile::reconcile,
    scorer::{RiskScorer, TierSummary},
    store::PipelineStore,
    types::new_run_id,
};
use std::env;
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.get(1).map(String::as_str) == Some("score") {
        return run_score(&args);
    }

    let config_path = arg_value(&args, "--config").unwrap_or("./pipeline.json");
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let out_dir = arg_value(&args, "--out").unwrap_or("./out");

    println!("risk-runner: bankruptcy risk pipeline");
    println!("  config:  {config_path}");
    println!("  db:      {db}");
    println!("  out:     {out_dir}");
    println!();

    let config = PipelineConfig::load(config_path)?;
    let store = if db == ":memory:" { PipelineStore::in_memory()? } else { PipelineStore::open(db)? };
    store.migrate()?;

    let run_id = new_run_id();
    let outcome = RiskPipeline::new(run_id, &config, &store).run()?;

    export::write_all(
        Path::new(out_dir),
        &outcome.consolidated,
        outcome.artifact(),
        &outcome.predictions,
    )?;
    log::info!("Run {} finished, artifacts in {out_dir}", outcome.run_id);

    if args.iter().any(|a| a == "--json") {
        println!("{}", serde_json::to_string(&summary_json(&outcome))?);
    } else {
        print_summary(&outcome);
    }
    Ok(())
}

/// Score a new file against a saved model artifact.
fn run_score(args: &[String]) -> Result<()> {
    let Some(model_path) = arg_value(args, "--model") else { bail!("score requires --model") };
    let Some(input) = arg_value(args, "--input") else { bail!("score requires --input") };
    let Some(key) = arg_value(args, "--key") else { bail!("score requires --key") };
    let delimiter = arg_value(args, "--delimiter").and_then(|d| d.chars().next()).unwrap_or(',');
    let out = arg_value(args, "--out").unwrap_or("./predictions.csv");

    let artifact = ModelArtifact::load(Path::new(model_path))?;
    let source = SourceConfig { path: input.to_string(), delimiter, column_prefix: None };
    let table = reconcile(&ingest::load_source("inference", &source, &[key])?, key)?;

    let predictions = RiskScorer::new(&artifact).score_table(&table)?;
    export::write_predictions(Path::new(out), &predictions)?;

    let s = TierSummary::from_predictions(&predictions);
    println!("Scored {} entities -> {out}", predictions.len());
    println!("  LOW: {}  MEDIUM: {}  HIGH: {}", s.low, s.medium, s.high);
    Ok(())
}

fn print_summary(outcome: &PipelineOutcome) {
    let report = &outcome.consolidated.report;
    let training = &outcome.training;
    let m = &training.metrics;
    let pct = |v: Option<f64>| v.map(|x| format!("{:.2}%", x * 100.0)).unwrap_or_else(|| "n/a".into());

    println!("=== RUN SUMMARY ===");
    println!("  run_id:          {}", outcome.run_id);
    println!("  entities:        {}", report.primary_entities);
    println!("  labeled:         {}", report.labeled_entities);
    println!("  label fills:     {}", report.fill_count);
    println!("  orphan labels:   {}", report.orphan_labels);
    println!("  prevalence:      {:.2}%", training.prevalence * 100.0);
    println!();
    println!("=== HOLDOUT ({} rows, {} bankrupt) ===", m.rows, m.positives);
    println!("  accuracy:        {}", pct(m.accuracy));
    println!("  roc_auc:         {}", m.roc_auc.map(|v| format!("{v:.4}")).unwrap_or_else(|| "n/a".into()));
    println!("  precision (1):   {}", pct(m.precision));
    println!("  recall (1):      {}", pct(m.recall));
    println!();
    println!("=== TOP FEATURES ===");
    for f in training.importance.iter().take(10) {
        println!("  {:>2}. {:<32} {:.4}", f.rank, f.feature, f.importance);
    }
    println!();
    let s = TierSummary::from_predictions(&outcome.predictions);
    println!("=== PREDICTIONS ({}) ===", outcome.predictions.len());
    println!("  LOW: {}  MEDIUM: {}  HIGH: {}", s.low, s.medium, s.high);
}

/// Machine-readable run summary, one JSON object on stdout.
fn summary_json(outcome: &PipelineOutcome) -> serde_json::Value {
    serde_json::json!({
        "run_id":        outcome.run_id,
        "consolidation": outcome.consolidated.report,
        "prevalence":    outcome.training.prevalence,
        "metrics":       outcome.training.metrics,
        "importance":    outcome.training.importance,
        "tiers":         TierSummary::from_predictions(&outcome.predictions),
    })
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

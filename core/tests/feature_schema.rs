//! Feature assembly and the training/inference schema contract.

use bankrisk_core::{
    consolidate::{consolidate, ConsolidatedDataset},
    error::PipelineError,
    features::{FeatureAssembler, FeatureMatrix, FeatureSchema},
    ingest::read_delimited,
    reconcile::reconcile,
    table::SourceTable,
};

fn source(name: &str, csv: &str, key: &str) -> SourceTable {
    let raw = read_delimited(name, csv, ',', &[key]).expect("parse csv");
    reconcile(&raw, key).expect("reconcile")
}

fn dataset(label_csv: &str) -> ConsolidatedDataset {
    let statements = source(
        "statements",
        "company,total_assets,net_income\nA,100,5\nB,200,-3\nC,50,1\n",
        "company",
    );
    let ratios = source("ratios", "company_id,debt_ratio\nA,0.4\nB,0.9\nC,0.2\n", "company_id");
    let labels = source("labels", label_csv, "company_id");
    consolidate(&[statements, ratios], &labels, "bankrupt").expect("consolidate")
}

fn schema() -> FeatureSchema {
    FeatureSchema::new(1, vec!["total_assets".into(), "net_income".into(), "debt_ratio".into()])
}

#[test]
fn assembled_rows_follow_the_declared_feature_order() {
    let data = dataset("company_id,bankrupt\nA,1\nB,0\n");
    let assembler = FeatureAssembler::new(schema(), "bankrupt").expect("assembler");
    let out = assembler.assemble(&data).expect("assemble");

    assert_eq!(out.entity_ids, vec!["A", "B", "C"]);
    assert_eq!(out.targets, vec![1, 0, 0]);
    assert_eq!(out.features.rows[0], vec![100.0, 5.0, 0.4]);
    assert_eq!(out.features.rows[1], vec![200.0, -3.0, 0.9]);
    assert_eq!(out.positives(), 1);
}

#[test]
fn label_outside_zero_one_is_rejected() {
    let data = dataset("company_id,bankrupt\nA,2\n");
    let assembler = FeatureAssembler::new(schema(), "bankrupt").expect("assembler");
    let err = assembler.assemble(&data).expect_err("label 2");

    assert!(
        matches!(&err, PipelineError::LabelDomain { entity_id, value } if entity_id == "A" && value == "2"),
        "unexpected error: {err}"
    );
}

#[test]
fn text_label_is_rejected() {
    let data = dataset("company_id,bankrupt\nA,yes\n");
    let assembler = FeatureAssembler::new(schema(), "bankrupt").expect("assembler");

    assert!(matches!(assembler.assemble(&data), Err(PipelineError::LabelDomain { .. })));
}

#[test]
fn label_cannot_be_declared_as_a_feature() {
    let bad = FeatureSchema::new(1, vec!["total_assets".into(), "bankrupt".into()]);
    assert!(matches!(FeatureAssembler::new(bad, "bankrupt"), Err(PipelineError::Schema { .. })));
}

#[test]
fn missing_feature_at_training_time_is_a_schema_error() {
    let data = dataset("company_id,bankrupt\nA,1\n");
    let wider = FeatureSchema::new(1, vec!["total_assets".into(), "altman_z".into()]);
    let assembler = FeatureAssembler::new(wider, "bankrupt").expect("assembler");

    assert!(matches!(assembler.assemble(&data), Err(PipelineError::Schema { .. })));
}

#[test]
fn missing_feature_at_inference_time_is_a_schema_mismatch() {
    let table = source("new", "company,total_assets,net_income\nX,10,1\n", "company");
    let assembler = FeatureAssembler::new(schema(), "bankrupt").expect("assembler");
    let err = assembler.assemble_inference(&table).expect_err("debt_ratio missing");

    match err {
        PipelineError::FeatureSchemaMismatch { expected, actual, .. } => {
            assert_eq!(expected.len(), 3);
            assert_eq!(actual, vec!["total_assets", "net_income"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn inference_table_column_order_does_not_matter() {
    let table = source("new", "company,debt_ratio,net_income,total_assets\nX,0.3,1,10\n", "company");
    let assembler = FeatureAssembler::new(schema(), "bankrupt").expect("assembler");
    let (matrix, ids) = assembler.assemble_inference(&table).expect("assemble");

    assert_eq!(ids, vec!["X"]);
    assert_eq!(matrix.rows[0], vec![10.0, 1.0, 0.3]);
    assert_eq!(matrix.schema, schema());
}

#[test]
fn null_feature_value_is_rejected() {
    let table = source("new", "company,total_assets,net_income,debt_ratio\nX,10,,0.3\n", "company");
    let assembler = FeatureAssembler::new(schema(), "bankrupt").expect("assembler");

    assert!(matches!(assembler.assemble_inference(&table), Err(PipelineError::Schema { .. })));
}

#[test]
fn non_numeric_feature_column_is_rejected() {
    let table = source("new", "company,total_assets,net_income,debt_ratio\nX,10,n.a.,0.3\n", "company");
    let assembler = FeatureAssembler::new(schema(), "bankrupt").expect("assembler");

    assert!(matches!(assembler.assemble_inference(&table), Err(PipelineError::Schema { .. })));
}

#[test]
fn reordered_or_reversioned_schema_does_not_match() {
    let trained = schema();
    let reordered = FeatureSchema::new(1, vec!["net_income".into(), "total_assets".into(), "debt_ratio".into()]);
    let bumped = FeatureSchema::new(2, trained.columns.clone());

    assert!(trained.ensure_matches(&trained.clone()).is_ok());
    assert!(matches!(trained.ensure_matches(&reordered), Err(PipelineError::FeatureSchemaMismatch { .. })));
    assert!(matches!(
        trained.ensure_matches(&bumped),
        Err(PipelineError::FeatureSchemaMismatch { expected_version: 1, actual_version: 2, .. })
    ));
}

#[test]
fn matrix_rows_must_match_schema_width() {
    assert!(FeatureMatrix::from_rows(schema(), vec![vec![1.0, 2.0, 3.0]]).is_ok());
    assert!(FeatureMatrix::from_rows(schema(), vec![vec![1.0, 2.0]]).is_err());
}

//! Key reconciliation: every source ends up keyed by `entity_id`.

use bankrisk_core::{
    error::PipelineError,
    ingest::read_delimited,
    reconcile::{prefix_columns, reconcile, reconcile_all},
    table::SourceTable,
    types::ENTITY_ID,
};

fn table(name: &str, csv: &str, key: &str) -> SourceTable {
    read_delimited(name, csv, ',', &[key]).expect("parse csv")
}

#[test]
fn local_key_is_renamed_and_other_columns_untouched() {
    let src = table("statements", "company,total_assets,net_income\nA,100,5\nB,200,-3\n", "company");
    let out = reconcile(&src, "company").expect("reconcile");

    assert_eq!(out.schema.names(), vec![ENTITY_ID, "total_assets", "net_income"]);
    assert_eq!(out.rows, src.rows);
    assert_eq!(out.schema.columns[1], src.schema.columns[1]);
}

#[test]
fn reconciling_twice_is_a_no_op() {
    let src = table("ratios", "company_id,debt_ratio\nA,0.4\n", "company_id");
    let once = reconcile(&src, "company_id").expect("first pass");
    let twice = reconcile(&once, ENTITY_ID).expect("second pass");

    assert_eq!(once, twice);
}

#[test]
fn missing_key_column_is_a_schema_error() {
    let src = table("labels", "company_id,bankrupt\nA,1\n", "company_id");
    let err = reconcile(&src, "cik").expect_err("cik is not a column");

    assert!(
        matches!(&err, PipelineError::Schema { source_name, .. } if source_name == "labels"),
        "unexpected error: {err}"
    );
}

#[test]
fn rename_that_collides_with_existing_entity_id_is_rejected() {
    let src = table("ratios", "company_id,entity_id,debt_ratio\nA,x,0.4\n", "company_id");
    let err = reconcile(&src, "company_id").expect_err("collision");

    assert!(matches!(err, PipelineError::Schema { .. }), "unexpected error: {err}");
}

#[test]
fn parallel_reconcile_keeps_input_order() {
    let a = table("statements", "company,total_assets\nA,1\n", "company");
    let b = table("ratios", "company_id,debt_ratio\nA,0.1\n", "company_id");
    let c = table("labels", "company_id,bankrupt\nA,0\n", "company_id");

    let out = reconcile_all(&[(&a, "company"), (&b, "company_id"), (&c, "company_id")]).expect("reconcile all");

    let names: Vec<&str> = out.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["statements", "ratios", "labels"]);
    assert!(out.iter().all(|t| t.schema.columns[0].name == ENTITY_ID));
}

#[test]
fn parallel_reconcile_surfaces_the_first_failure() {
    let a = table("statements", "company,total_assets\nA,1\n", "company");
    let b = table("ratios", "company_id,debt_ratio\nA,0.1\n", "company_id");

    let err = reconcile_all(&[(&a, "company"), (&b, "missing")]).expect_err("bad key");
    assert!(matches!(err, PipelineError::Schema { .. }));
}

#[test]
fn prefix_namespaces_everything_but_the_key() {
    let src = table("ratios", "company_id,roa\nA,0.1\n", "company_id");
    let out = prefix_columns(&reconcile(&src, "company_id").expect("reconcile"), "ratio");

    assert_eq!(out.schema.names(), vec![ENTITY_ID, "ratio.roa"]);
}

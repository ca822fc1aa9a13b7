//! Consolidation join engine: coverage, the missing-label fill policy,
//! and the key-integrity failures.

use bankrisk_core::{
    consolidate::{consolidate, fill_missing_label, ConsolidatedDataset, FILLED_LABEL},
    error::PipelineError,
    ingest::read_delimited,
    reconcile::reconcile,
    table::{Cell, SourceTable},
    types::ENTITY_ID,
};

fn source(name: &str, csv: &str, key: &str) -> SourceTable {
    let raw = read_delimited(name, csv, ',', &[key]).expect("parse csv");
    reconcile(&raw, key).expect("reconcile")
}

fn statements() -> SourceTable {
    source(
        "statements",
        "company,total_assets,net_income\nA,100,5\nB,200,-3\nC,50,1\nD,75,-10\n",
        "company",
    )
}

fn ratios() -> SourceTable {
    source(
        "ratios",
        "company_id,debt_ratio\nA,0.4\nB,0.9\nC,0.2\nD,0.7\n",
        "company_id",
    )
}

fn labels(csv: &str) -> SourceTable {
    source("labels", csv, "company_id")
}

fn run(label_csv: &str) -> ConsolidatedDataset {
    consolidate(&[statements(), ratios()], &labels(label_csv), "bankrupt").expect("consolidate")
}

#[test]
fn unlabeled_entities_are_kept_and_filled_with_zero() {
    let data = run("company_id,bankrupt\nA,1\nB,0\n");

    assert_eq!(data.table.row_count(), 4, "every primary entity must survive the label join");
    assert_eq!(data.report.fill_count, 2);
    assert_eq!(data.report.imputed_entities, vec!["C".to_string(), "D".to_string()]);
    assert_eq!(data.label_of("A"), Some(&Cell::Number(1.0)));
    assert_eq!(data.label_of("B"), Some(&Cell::Number(0.0)));
    assert_eq!(data.label_of("C"), Some(&Cell::Number(FILLED_LABEL)));
    assert_eq!(data.label_of("D"), Some(&Cell::Number(FILLED_LABEL)));
}

#[test]
fn output_has_one_row_per_entity_in_primary_order() {
    let data = run("company_id,bankrupt\nD,1\n");

    assert_eq!(data.entity_ids(), vec!["A", "B", "C", "D"]);
    assert_eq!(
        data.table.schema.names(),
        vec![ENTITY_ID, "total_assets", "net_income", "debt_ratio", "bankrupt"]
    );
    assert_eq!(data.report.primary_entities, 4);
    assert_eq!(data.report.labeled_entities, 1);
}

#[test]
fn fill_count_matches_rows_whose_label_was_missing() {
    let data = run("company_id,bankrupt\nA,1\nB,\n");

    // B has a row in the label source but no value: still a fill.
    assert_eq!(data.report.fill_count, 3);
    assert_eq!(data.report.imputed_entities, vec!["B", "C", "D"]);
}

#[test]
fn fully_labeled_data_reports_zero_fills() {
    let data = run("company_id,bankrupt\nA,1\nB,0\nC,0\nD,0\n");
    assert_eq!(data.report.fill_count, 0);
    assert!(data.report.imputed_entities.is_empty());
}

#[test]
fn orphan_labels_are_ignored_and_counted() {
    let data = run("company_id,bankrupt\nA,1\nZ,1\n");

    assert_eq!(data.table.row_count(), 4);
    assert_eq!(data.report.orphan_labels, 1);
    assert_eq!(data.label_of("Z"), None);
}

#[test]
fn entity_missing_from_a_primary_fails_instead_of_shrinking_the_universe() {
    let partial = source("ratios", "company_id,debt_ratio\nA,0.4\nB,0.9\nE,0.1\n", "company_id");
    let err = consolidate(&[statements(), partial], &labels("company_id,bankrupt\nA,1\n"), "bankrupt")
        .expect_err("C, D and E are not covered by both primaries");

    assert!(
        matches!(&err, PipelineError::JoinKey { source_name, entity_id: Some(e), row: None, .. }
            if source_name == "ratios" && e == "C"),
        "unexpected error: {err}"
    );
}

#[test]
fn entity_only_in_a_later_primary_is_reported_against_the_first() {
    let short = source("statements", "company,total_assets\nA,1\nB,2\n", "company");
    let wide = source("ratios", "company_id,debt_ratio\nA,0.4\nB,0.9\nE,0.1\n", "company_id");
    let err = consolidate(&[short, wide], &labels("company_id,bankrupt\nA,1\n"), "bankrupt")
        .expect_err("E has no statement");

    assert!(
        matches!(&err, PipelineError::JoinKey { source_name, entity_id: Some(e), .. }
            if source_name == "statements" && e == "E"),
        "unexpected error: {err}"
    );
}

/// 5000 entities span two label-join partitions. Ids are a scrambled
/// permutation so primary order differs from key order.
#[test]
fn fill_count_and_order_hold_across_partitions() {
    const N: usize = 5000;
    let id = |i: usize| format!("co-{:05}", (i * 7919) % N);

    let mut statements_csv = String::from("company,total_assets\n");
    let mut ratios_csv = String::from("company_id,debt_ratio\n");
    let mut labels_csv = String::from("company_id,bankrupt\n");
    for i in 0..N {
        statements_csv.push_str(&format!("{},{}\n", id(i), i));
        if i % 7 == 0 {
            labels_csv.push_str(&format!("{},{}\n", id(i), i % 2));
        }
    }
    for i in (0..N).rev() {
        ratios_csv.push_str(&format!("{},0.5\n", id(i)));
    }
    labels_csv.push_str("orphan-1,1\n");

    let data = consolidate(
        &[
            source("statements", &statements_csv, "company"),
            source("ratios", &ratios_csv, "company_id"),
        ],
        &labels(&labels_csv),
        "bankrupt",
    )
    .expect("consolidate");

    let labeled = (0..N).filter(|i| i % 7 == 0).count();
    assert_eq!(data.table.row_count(), N);
    assert_eq!(data.report.labeled_entities, labeled);
    assert_eq!(data.report.fill_count, N - labeled);
    assert_eq!(data.report.orphan_labels, 1);

    let expected_order: Vec<String> = (0..N).map(id).collect();
    assert_eq!(data.entity_ids(), expected_order, "rows must keep primary order");

    let expected_imputed: Vec<String> = (0..N).filter(|i| i % 7 != 0).map(id).collect();
    assert_eq!(data.report.imputed_entities, expected_imputed);
    assert_eq!(data.label_of(&id(4095)), Some(&Cell::Number(1.0)));
    assert_eq!(data.label_of(&id(4102)), Some(&Cell::Number(0.0)));
    assert_eq!(data.label_of(&id(4099)), Some(&Cell::Number(FILLED_LABEL)));
}

#[test]
fn duplicate_label_row_aborts_consolidation() {
    let err = consolidate(
        &[statements(), ratios()],
        &labels("company_id,bankrupt\nA,1\nA,0\n"),
        "bankrupt",
    )
    .expect_err("duplicate key");

    assert!(
        matches!(&err, PipelineError::DuplicateKey { source_name, entity_id }
            if source_name == "labels" && entity_id == "A"),
        "unexpected error: {err}"
    );
}

#[test]
fn duplicate_primary_row_aborts_consolidation() {
    let dup = source("ratios", "company_id,debt_ratio\nA,0.4\nA,0.5\n", "company_id");
    let err = consolidate(&[statements(), dup], &labels("company_id,bankrupt\nA,1\n"), "bankrupt")
        .expect_err("duplicate key");

    assert!(matches!(err, PipelineError::DuplicateKey { .. }), "unexpected error: {err}");
}

#[test]
fn unreconciled_source_is_a_join_key_error() {
    let raw = read_delimited("ratios", "company_id,debt_ratio\nA,0.4\n", ',', &["company_id"]).expect("parse");
    let err = consolidate(&[statements(), raw], &labels("company_id,bankrupt\nA,1\n"), "bankrupt")
        .expect_err("ratios was never reconciled");

    assert!(
        matches!(&err, PipelineError::JoinKey { source_name, row: None, .. } if source_name == "ratios"),
        "unexpected error: {err}"
    );
}

#[test]
fn empty_key_value_is_a_join_key_error() {
    let blank = source("ratios", "company_id,debt_ratio\nA,0.4\n,0.5\n", "company_id");
    let err = consolidate(&[statements(), blank], &labels("company_id,bankrupt\nA,1\n"), "bankrupt")
        .expect_err("blank key");

    assert!(matches!(err, PipelineError::JoinKey { row: Some(1), .. }), "unexpected error: {err}");
}

#[test]
fn same_column_in_two_primaries_is_a_schema_error() {
    let clash = source("ratios", "company_id,net_income\nA,1\nB,2\nC,3\nD,4\n", "company_id");
    let err = consolidate(&[statements(), clash], &labels("company_id,bankrupt\nA,1\n"), "bankrupt")
        .expect_err("net_income in both primaries");

    assert!(matches!(err, PipelineError::Schema { .. }), "unexpected error: {err}");
}

#[test]
fn missing_label_column_is_a_schema_error() {
    let err = consolidate(&[statements(), ratios()], &labels("company_id,status\nA,1\n"), "bankrupt")
        .expect_err("no bankrupt column");

    assert!(matches!(err, PipelineError::Schema { .. }), "unexpected error: {err}");
}

#[test]
fn fill_policy_only_fills_absent_values() {
    assert_eq!(fill_missing_label(None), (Cell::Number(0.0), true));
    assert_eq!(fill_missing_label(Some(&Cell::Null)), (Cell::Number(0.0), true));
    assert_eq!(fill_missing_label(Some(&Cell::Number(1.0))), (Cell::Number(1.0), false));
}

#[test]
fn subset_keeps_only_requested_entities() {
    let data = run("company_id,bankrupt\nA,1\nB,0\n");
    let subset = data.subset(&data.report.imputed_entities);

    assert_eq!(subset.row_count(), 2);
    assert_eq!(subset.schema, data.table.schema);
}

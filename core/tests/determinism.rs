//! Same data, same seed, same hyperparameters: the trained artifact,
//! its importances and its holdout metrics must be identical.
//! Any divergence here breaks reproducible audits of a scoring run.

use bankrisk_core::{
    config::{ClassWeightMode, Hyperparameters, MaxFeatures, RiskThresholds},
    features::{AssembledData, FeatureMatrix, FeatureSchema},
    trainer::{stratified_split, Trainer, TrainingReport},
};

/// 80 companies, 8 bankrupt. Bankrupt rows have low assets and high
/// leverage; the third feature is noise.
fn imbalanced_data() -> AssembledData {
    let schema = FeatureSchema::new(1, vec!["total_assets".into(), "debt_ratio".into(), "noise".into()]);
    let mut rows = Vec::new();
    let mut targets = Vec::new();
    let mut entity_ids = Vec::new();
    for i in 0..80u32 {
        let bankrupt = i % 10 == 3;
        let jitter = ((i * 37) % 11) as f64;
        let (assets, debt) = if bankrupt {
            (20.0 + jitter, 0.85 + jitter / 100.0)
        } else {
            (100.0 + jitter * 5.0, 0.3 + jitter / 50.0)
        };
        rows.push(vec![assets, debt, ((i * 53) % 17) as f64]);
        targets.push(bankrupt as u8);
        entity_ids.push(format!("c-{i:03}"));
    }
    AssembledData {
        features: FeatureMatrix::from_rows(schema, rows).expect("matrix"),
        targets,
        entity_ids,
        label_column: "bankrupt".into(),
    }
}

fn hyperparameters(seed: u64) -> Hyperparameters {
    Hyperparameters {
        n_estimators: 25,
        max_depth: 6,
        class_weight_mode: ClassWeightMode::Balanced,
        random_seed: seed,
        ..Hyperparameters::default()
    }
}

fn train_with(hp: &Hyperparameters) -> TrainingReport {
    Trainer::new(hp, RiskThresholds::default())
        .train(&imbalanced_data())
        .expect("train")
}

fn train(seed: u64) -> TrainingReport {
    train_with(&hyperparameters(seed))
}

/// Every split sees every feature, so the separating features always win.
fn train_all_features() -> TrainingReport {
    train_with(&Hyperparameters { max_features: MaxFeatures::All, ..hyperparameters(42) })
}

#[test]
fn same_seed_produces_identical_models() {
    let a = train(0xDEAD_BEEF);
    let b = train(0xDEAD_BEEF);

    assert_eq!(a.artifact, b.artifact, "artifacts diverged for the same seed");
    assert_eq!(a.importance, b.importance);
    assert_eq!(a.metrics, b.metrics);
    assert_eq!(
        a.artifact.to_json().expect("json a"),
        b.artifact.to_json().expect("json b"),
        "serialised artifacts must be byte-identical"
    );
}

#[test]
fn different_seeds_produce_different_forests() {
    let a = train(1);
    let b = train(2);
    assert_ne!(a.artifact.forest(), b.artifact.forest());
}

#[test]
fn split_is_stratified_and_seeded() {
    let data = imbalanced_data();
    let split = stratified_split(&data.targets, 0.25, 42);

    let test_pos = split.test.iter().filter(|&&i| data.targets[i] == 1).count();
    assert_eq!(split.test.len(), 20);
    assert_eq!(test_pos, 2, "each class contributes round(n_class * fraction) rows");
    assert_eq!(split.train.len() + split.test.len(), data.len());
    assert_eq!(split, stratified_split(&data.targets, 0.25, 42));
}

#[test]
fn lone_positive_stays_in_training() {
    let targets = [0, 0, 0, 0, 1];
    let split = stratified_split(&targets, 0.5, 7);
    assert!(split.train.contains(&4));
}

#[test]
fn importances_sum_to_one_and_favour_signal_over_noise() {
    let report = train_all_features();
    let total: f64 = report.artifact.feature_importances().iter().sum();
    assert!((total - 1.0).abs() < 1e-9, "importances sum to {total}");
    assert!(report.artifact.feature_importances().iter().all(|&v| v >= 0.0));

    let noise_rank = report
        .importance
        .iter()
        .find(|f| f.feature == "noise")
        .map(|f| f.rank)
        .expect("noise ranked");
    assert_eq!(noise_rank, 3, "noise should rank last: {:?}", report.importance);
    assert_eq!(report.artifact.feature_importances()[2], 0.0);
}

#[test]
fn holdout_metrics_cover_the_positive_class() {
    let report = train_all_features();

    assert_eq!(report.train_rows + report.test_rows, 80);
    assert_eq!(report.metrics.positives, 2);
    assert_eq!(report.metrics.decision_threshold, RiskThresholds::default().medium_max);
    assert!((report.prevalence - 0.1).abs() < 1e-12);
    assert_eq!(report.metrics.recall, Some(1.0), "separable positives must be recalled");
    assert_eq!(report.metrics.roc_auc, Some(1.0));
    assert_eq!(report.correlations.len(), 3);
    assert!(report.correlations[0].correlation.expect("assets vary") < 0.0);
}

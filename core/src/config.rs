use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ── Sources ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Namespace applied to every non-key column, e.g. "ratio" → "ratio.roa".
    #[serde(default)]
    pub column_prefix: Option<String>,
}

fn default_delimiter() -> char {
    ','
}

// ── Training ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeightMode {
    /// n / (2 * n_class), computed once on the training split.
    Balanced,
    /// Same formula, recomputed on each tree's bootstrap sample.
    BalancedSubsample,
    /// Every row weighs 1.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    All,
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => ((n_features as f64).sqrt().floor() as usize).max(1),
            MaxFeatures::All  => n_features.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub n_estimators:      usize,
    pub max_depth:         usize,
    pub class_weight_mode: ClassWeightMode,
    pub random_seed:       u64,
    #[serde(default = "default_max_features")]
    pub max_features:      MaxFeatures,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf:  usize,
    #[serde(default = "default_test_fraction")]
    pub test_fraction:     f64,
}

fn default_max_features() -> MaxFeatures {
    MaxFeatures::Sqrt
}

fn default_min_samples_split() -> usize {
    2
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_test_fraction() -> f64 {
    0.2
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            n_estimators:      100,
            max_depth:         10,
            class_weight_mode: ClassWeightMode::Balanced,
            random_seed:       42,
            max_features:      default_max_features(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf:  default_min_samples_leaf(),
            test_fraction:     default_test_fraction(),
        }
    }
}

// ── Scoring ─────────────────────────────────────────────────────────

/// Closed-open tier boundaries: p < low_max → LOW,
/// low_max ≤ p < medium_max → MEDIUM, p ≥ medium_max → HIGH.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub low_max:    f64,
    pub medium_max: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self { low_max: 0.20, medium_max: 0.50 }
    }
}

impl RiskThresholds {
    pub fn validate(&self) -> PipelineResult<()> {
        let ordered = 0.0 <= self.low_max && self.low_max <= self.medium_max && self.medium_max <= 1.0;
        if !ordered {
            return Err(PipelineError::Config(format!(
                "risk_thresholds must satisfy 0 <= low_max <= medium_max <= 1, got {} / {}",
                self.low_max, self.medium_max
            )));
        }
        Ok(())
    }
}

// ── Pipeline ────────────────────────────────────────────────────────

/// The complete, immutable run configuration. Passed by reference into
/// every stage; nothing mutates it after `load`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub sources:                BTreeMap<String, SourceConfig>,
    pub primary_sources:        Vec<String>,
    pub label_source:           String,
    #[serde(default)]
    pub inference_source:       Option<String>,
    pub key_mapping:            BTreeMap<String, String>,
    pub feature_columns:        Vec<String>,
    #[serde(default = "default_schema_version")]
    pub feature_schema_version: u32,
    pub label_column:           String,
    #[serde(default)]
    pub hyperparameters:        Hyperparameters,
    #[serde(default)]
    pub risk_thresholds:        RiskThresholds,
}

fn default_schema_version() -> u32 {
    1
}

impl PipelineConfig {
    /// Load and validate a JSON config file.
    /// In tests, use PipelineConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Names of every source the run touches, in a stable order.
    pub fn source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.primary_sources.iter().map(String::as_str).collect();
        names.push(self.label_source.as_str());
        if let Some(inf) = &self.inference_source {
            names.push(inf.as_str());
        }
        names
    }

    /// Local key column for a source.
    pub fn local_key(&self, source: &str) -> PipelineResult<&str> {
        self.key_mapping
            .get(source)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::Config(format!("key_mapping has no entry for source '{source}'")))
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.primary_sources.is_empty() {
            return Err(PipelineError::Config("primary_sources is empty".into()));
        }
        let mut names = HashSet::new();
        for name in self.source_names() {
            if !names.insert(name) {
                return Err(PipelineError::Config(format!("source '{name}' is assigned more than one role")));
            }
            self.local_key(name)?;
        }
        if self.feature_columns.is_empty() {
            return Err(PipelineError::Config("feature_columns is empty".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.feature_columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(PipelineError::Config(format!("feature column '{dup}' listed twice")));
        }
        if self.feature_columns.contains(&self.label_column) {
            return Err(PipelineError::Config(format!(
                "label column '{}' cannot also be a feature",
                self.label_column
            )));
        }

        let hp = &self.hyperparameters;
        if hp.n_estimators == 0 || hp.max_depth == 0 {
            return Err(PipelineError::Config("n_estimators and max_depth must be positive".into()));
        }
        if hp.min_samples_split < 2 || hp.min_samples_leaf == 0 {
            return Err(PipelineError::Config(
                "min_samples_split must be >= 2 and min_samples_leaf >= 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&hp.test_fraction) {
            return Err(PipelineError::Config(format!(
                "test_fraction must lie in [0, 1), got {}",
                hp.test_fraction
            )));
        }
        self.risk_thresholds.validate()
    }

    /// Config with hardcoded defaults for use in tests: two primary
    /// sources keyed differently, a label source, three features.
    pub fn default_test() -> Self {
        let key_mapping = [
            ("statements", "company"),
            ("ratios", "company_id"),
            ("labels", "company_id"),
        ]
        .into_iter()
        .map(|(s, k)| (s.to_string(), k.to_string()))
        .collect();

        Self {
            sources:                BTreeMap::new(),
            primary_sources:        vec!["statements".into(), "ratios".into()],
            label_source:           "labels".into(),
            inference_source:       None,
            key_mapping,
            feature_columns:        vec![
                "total_assets".into(),
                "net_income".into(),
                "debt_ratio".into(),
            ],
            feature_schema_version: 1,
            label_column:           "bankrupt".into(),
            hyperparameters:        Hyperparameters::default(),
            risk_thresholds:        RiskThresholds::default(),
        }
    }
}

//! Held-out evaluation and diagnostics.
//!
//! With bankruptcies at a few percent of rows, accuracy alone is
//! misleading: precision and recall are always computed for the
//! positive (bankrupt) class. A metric that is undefined on the
//! held-out set (no positives, no predictions) is None, never a
//! made-up number.
//!
//! A row counts as predicted bankrupt when p >= the decision threshold.
//! Training passes the HIGH tier boundary (`medium_max`), so the
//! confusion matrix and the HIGH tier always agree on the same row.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive:  usize,
    pub false_positive: usize,
    pub true_negative:  usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(probabilities: &[f64], targets: &[u8], threshold: f64) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (&p, &y) in probabilities.iter().zip(targets) {
            match (p >= threshold, y == 1) {
                (true, true)   => cm.true_positive += 1,
                (true, false)  => cm.false_positive += 1,
                (false, false) => cm.true_negative += 1,
                (false, true)  => cm.false_negative += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldoutMetrics {
    pub rows:               usize,
    pub positives:          usize,
    pub decision_threshold: f64,
    pub accuracy:           Option<f64>,
    pub roc_auc:            Option<f64>,
    pub precision:          Option<f64>,
    pub recall:             Option<f64>,
    pub f1:                 Option<f64>,
    pub confusion:          ConfusionMatrix,
}

pub fn evaluate(probabilities: &[f64], targets: &[u8], threshold: f64) -> HoldoutMetrics {
    let cm = ConfusionMatrix::from_predictions(probabilities, targets, threshold);
    let ratio = |num: usize, den: usize| (den > 0).then(|| num as f64 / den as f64);

    let accuracy = ratio(cm.true_positive + cm.true_negative, cm.total());
    let precision = ratio(cm.true_positive, cm.true_positive + cm.false_positive);
    let recall = ratio(cm.true_positive, cm.true_positive + cm.false_negative);
    let f1 = match (precision, recall) {
        (Some(p), Some(r)) if p + r > 0.0 => Some(2.0 * p * r / (p + r)),
        (Some(_), Some(_)) => Some(0.0),
        _ => None,
    };
    let roc_auc = roc_auc(probabilities, targets);

    if precision.is_none() {
        log::warn!("Precision undefined: no held-out row was predicted bankrupt");
    }
    if roc_auc.is_none() {
        log::warn!("ROC-AUC undefined: held-out set does not contain both classes");
    }

    HoldoutMetrics {
        rows: targets.len(),
        positives: cm.true_positive + cm.false_negative,
        decision_threshold: threshold,
        accuracy,
        roc_auc,
        precision,
        recall,
        f1,
        confusion: cm,
    }
}

/// Area under the ROC curve via the rank-sum statistic, with tied
/// scores sharing their average rank.
pub fn roc_auc(probabilities: &[f64], targets: &[u8]) -> Option<f64> {
    let n_pos = targets.iter().filter(|&&t| t == 1).count();
    let n_neg = targets.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.sort_by(|&a, &b| probabilities[a].total_cmp(&probabilities[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && probabilities[order[j + 1]] == probabilities[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; the tied block i..=j shares the mean rank.
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        rank_sum_pos += order[i..=j].iter().filter(|&&k| targets[k] == 1).count() as f64 * avg_rank;
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let u = rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0;
    Some(u / (n_pos * n_neg as f64))
}

/// Pearson correlation; None when either side has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mean = |v: &[f64]| v[..n].iter().sum::<f64>() / n as f64;
    let (mx, my) = (mean(x), mean(y));

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for k in 0..n {
        let (dx, dy) = (x[k] - mx, y[k] - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx.sqrt() * syy.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_ranking_has_auc_one() {
        let p = [0.1, 0.2, 0.8, 0.9];
        let y = [0, 0, 1, 1];
        assert_eq!(roc_auc(&p, &y), Some(1.0));
    }

    #[test]
    fn ties_count_half() {
        let p = [0.5, 0.5];
        let y = [0, 1];
        assert_eq!(roc_auc(&p, &y), Some(0.5));
    }

    #[test]
    fn single_class_has_no_auc() {
        assert_eq!(roc_auc(&[0.3, 0.7], &[0, 0]), None);
    }

    #[test]
    fn positive_class_precision_and_recall() {
        let p = [0.9, 0.6, 0.4, 0.1, 0.2];
        let y = [1, 0, 1, 0, 0];
        let m = evaluate(&p, &y, 0.5);

        assert_eq!(m.confusion.true_positive, 1);
        assert_eq!(m.confusion.false_positive, 1);
        assert_eq!(m.confusion.false_negative, 1);
        assert_eq!(m.precision, Some(0.5));
        assert_eq!(m.recall, Some(0.5));
        assert_eq!(m.accuracy, Some(0.6));
        assert_eq!(m.decision_threshold, 0.5);
    }

    #[test]
    fn probability_at_the_threshold_counts_as_bankrupt() {
        use crate::{config::RiskThresholds, scorer::RiskTier};

        let t = RiskThresholds::default();
        let cm = ConfusionMatrix::from_predictions(&[t.medium_max, t.medium_max], &[1, 0], t.medium_max);

        assert_eq!(RiskTier::from_probability(t.medium_max, &t), RiskTier::High);
        assert_eq!(cm.true_positive, 1);
        assert_eq!(cm.false_positive, 1);
        assert_eq!(cm.true_negative + cm.false_negative, 0);
    }

    #[test]
    fn custom_threshold_moves_the_cutoff() {
        let cm = ConfusionMatrix::from_predictions(&[0.35, 0.25], &[1, 1], 0.3);
        assert_eq!(cm.true_positive, 1);
        assert_eq!(cm.false_negative, 1);
    }

    #[test]
    fn correlation_sign_and_degenerate_case() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [4.0, 3.0, 2.0, 1.0];
        assert!((pearson(&x, &y).unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(pearson(&x, &[1.0; 4]), None);
    }
}

#![forbid(unsafe_code)]

//! Confusion-matrix metrics and confidence intervals across runs.
//!
//! ```text
//! accuracy  = (tp + tn) / (tn + fp + fn + tp)
//! precision = tp / (tp + fp)          0.0 when tp + fp = 0
//! recall    = tp / (tp + fn)
//! fpr       = fp / (tn + fp)
//! fnr       = fn / (fn + tp)
//! ci[r][c]  = z * std(runs[..][r][c]) / sqrt(runs)
//! ```
//!
//! `std` is the population standard deviation. Zero denominators other than
//! precision's are reported as [`DetectError::UndefinedRate`].

use serde::Serialize;

use crate::dataset::Label;
use crate::{DetectError, DetectResult};

/// Rows of numeric results, one row per scenario.
pub type MetricTable = Vec<Vec<f64>>;

/// Binary confusion matrix; `Artifice` is the positive class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConfusionMatrix {
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub true_positives: u64,
}

impl ConfusionMatrix {
    #[must_use]
    pub const fn new(tn: u64, fp: u64, fn_: u64, tp: u64) -> Self {
        Self {
            true_negatives: tn,
            false_positives: fp,
            false_negatives: fn_,
            true_positives: tp,
        }
    }

    /// Tally predictions against ground truth.
    pub fn from_labels(predictions: &[Label], truths: &[Label]) -> DetectResult<Self> {
        if predictions.len() != truths.len() {
            return Err(DetectError::LengthMismatch {
                left: predictions.len(),
                right: truths.len(),
            });
        }
        let mut cm = Self::default();
        for (&pred, &truth) in predictions.iter().zip(truths) {
            match (truth, pred) {
                (Label::Clean, Label::Clean) => cm.true_negatives += 1,
                (Label::Clean, Label::Artifice) => cm.false_positives += 1,
                (Label::Artifice, Label::Clean) => cm.false_negatives += 1,
                (Label::Artifice, Label::Artifice) => cm.true_positives += 1,
            }
        }
        Ok(cm)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }
}

/// Scores for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionMetrics {
    /// Caller-chosen identifier, typically the Artifice instance size.
    pub index: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub false_positive_rate: f64,
    pub false_negative_rate: f64,
}

impl DetectionMetrics {
    pub fn from_confusion(index: f64, cm: &ConfusionMatrix) -> DetectResult<Self> {
        let tn = cm.true_negatives as f64;
        let fp = cm.false_positives as f64;
        let fn_ = cm.false_negatives as f64;
        let tp = cm.true_positives as f64;

        let ratio = |num: f64, den: f64, name: &'static str| {
            if den == 0.0 {
                Err(DetectError::UndefinedRate(name))
            } else {
                Ok(num / den)
            }
        };

        Ok(Self {
            index,
            accuracy: ratio(tp + tn, tn + fp + fn_ + tp, "accuracy")?,
            precision: if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) },
            recall: ratio(tp, tp + fn_, "recall")?,
            false_positive_rate: ratio(fp, tn + fp, "false positive rate")?,
            false_negative_rate: ratio(fn_, fn_ + tp, "false negative rate")?,
        })
    }

    /// `[index, accuracy, precision, recall, fpr, fnr]`.
    #[must_use]
    pub fn to_row(&self) -> [f64; 6] {
        [
            self.index,
            self.accuracy,
            self.precision,
            self.recall,
            self.false_positive_rate,
            self.false_negative_rate,
        ]
    }
}

/// Score `predictions` against `truths`.
pub fn evaluate(index: f64, predictions: &[Label], truths: &[Label]) -> DetectResult<DetectionMetrics> {
    let cm = ConfusionMatrix::from_labels(predictions, truths)?;
    DetectionMetrics::from_confusion(index, &cm)
}

fn check_shape(table: &MetricTable, like: &MetricTable) -> DetectResult<()> {
    if table.len() != like.len() || table.iter().zip(like).any(|(a, b)| a.len() != b.len()) {
        return Err(DetectError::ShapeMismatch);
    }
    Ok(())
}

/// Element-wise mean over per-run tables.
pub fn mean_table(runs: &[MetricTable]) -> DetectResult<MetricTable> {
    let first = runs.first().ok_or(DetectError::NoRuns)?;
    let mut means: MetricTable = first.iter().map(|row| vec![0.0; row.len()]).collect();
    for run in runs {
        check_shape(run, first)?;
        for (acc, row) in means.iter_mut().zip(run) {
            for (a, v) in acc.iter_mut().zip(row) {
                *a += v;
            }
        }
    }
    let n = runs.len() as f64;
    for v in means.iter_mut().flatten() {
        *v /= n;
    }
    Ok(means)
}

/// Standard-error confidence half-widths for every cell of `means`.
pub fn confidence_intervals(runs: &[MetricTable], means: &MetricTable, z: f64) -> DetectResult<MetricTable> {
    if runs.is_empty() {
        return Err(DetectError::NoRuns);
    }
    for run in runs {
        check_shape(run, means)?;
    }
    let n = runs.len() as f64;
    let sqrt_n = n.sqrt();

    let mut ci: MetricTable = means.iter().map(|row| vec![0.0; row.len()]).collect();
    for (r, row) in ci.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            let mean = runs.iter().map(|run| run[r][c]).sum::<f64>() / n;
            let var = runs
                .iter()
                .map(|run| {
                    let d = run[r][c] - mean;
                    d * d
                })
                .sum::<f64>()
                / n;
            *cell = z * var.sqrt() / sqrt_n;
        }
    }
    Ok(ci)
}

#![forbid(unsafe_code)]

//! Artifice Detection
//!
//! Builds labeled datasets of chain histograms from real disk traces, trains
//! a detector on the singleton fraction, and scores it across repeated
//! experiments.
//!
//! # Key Components
//!
//! - [`sample_clean_chains`] - resample a trace to a target number of changes
//! - [`inject_singletons`] - add the isolated writes a hidden volume produces
//! - [`generate_labeled_dataset`] - clean and Artifice samples with labels
//! - [`Detector`] / [`LogisticRegression`] - the classifier seam
//! - [`evaluate`] / [`confidence_intervals`] - confusion-matrix metrics
//! - [`run_detection_experiment`] - the full repeated pipeline
//!
//! # How it fits
//!
//! Traces come in as [`artifice_core::ChainMatrix`] tables. Scenario sizes
//! come from [`artifice_core::aont`]: an instance's effective size is the
//! number of isolated writes injected into each Artifice sample.

use std::fmt;

use artifice_core::ChainError;

pub mod classifier;
pub mod dataset;
pub mod experiment;
pub mod metrics;
pub mod sampler;

pub use classifier::{Detector, LogisticConfig, LogisticFit, LogisticRegression};
pub use dataset::{
    DatasetSpec, Label, LabeledDataset, construct_features, generate_labeled_dataset,
    singleton_feature,
};
pub use experiment::{
    ArtificeScenario, ExperimentConfig, ExperimentReport, run_detection_experiment,
    run_detection_experiment_with,
};
pub use metrics::{
    ConfusionMatrix, DetectionMetrics, MetricTable, confidence_intervals, evaluate, mean_table,
};
pub use sampler::{SamplerConfig, inject_singletons, sample_clean_chains};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised by the detection pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectError {
    /// Chain statistics failed (empty trace, bad sizes).
    Chain(ChainError),
    /// Scenario derivation from the capacity model failed.
    Model(artifice_core::AontError),
    /// Samples requested but no traces supplied.
    NoTraces,
    /// A per-sample parameter list is empty.
    EmptyParameterList(&'static str),
    /// The sampler was asked for zero runs.
    ZeroRuns,
    /// Parallel sequences differ in length.
    LengthMismatch { left: usize, right: usize },
    /// Nothing to train on.
    EmptyTrainingSet,
    /// Training labels hold a single class.
    SingleClass,
    /// `predict` called before `fit`.
    NotFitted,
    /// A metric denominator other than precision's is zero.
    UndefinedRate(&'static str),
    /// Tables disagree in shape.
    ShapeMismatch,
    /// Confidence intervals over zero runs.
    NoRuns,
}

impl fmt::Display for DetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chain(e) => write!(f, "chain statistics: {e}"),
            Self::Model(e) => write!(f, "capacity model: {e}"),
            Self::NoTraces => write!(f, "no traces to sample from"),
            Self::EmptyParameterList(name) => write!(f, "parameter list `{name}` is empty"),
            Self::ZeroRuns => write!(f, "sampler needs at least one run"),
            Self::LengthMismatch { left, right } => {
                write!(f, "length mismatch: {left} vs {right}")
            }
            Self::EmptyTrainingSet => write!(f, "training set is empty"),
            Self::SingleClass => write!(f, "training labels contain a single class"),
            Self::NotFitted => write!(f, "detector has not been fitted"),
            Self::UndefinedRate(name) => write!(f, "{name} undefined: zero denominator"),
            Self::ShapeMismatch => write!(f, "table shapes do not match"),
            Self::NoRuns => write!(f, "no runs to aggregate"),
        }
    }
}

impl std::error::Error for DetectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Chain(e) => Some(e),
            Self::Model(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ChainError> for DetectError {
    fn from(e: ChainError) -> Self {
        Self::Chain(e)
    }
}

impl From<artifice_core::AontError> for DetectError {
    fn from(e: artifice_core::AontError) -> Self {
        Self::Model(e)
    }
}

/// Result type for the detection pipeline.
pub type DetectResult<T> = Result<T, DetectError>;

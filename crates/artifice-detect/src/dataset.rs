#![forbid(unsafe_code)]

//! Labeled datasets of chain histograms and the singleton feature.

use std::fmt;

use artifice_core::{ChainHistogram, ChainLength, ChainMatrix};
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::sampler::{SamplerConfig, inject_singletons, sample_clean_chains};
use crate::{DetectError, DetectResult};

/// Ground truth for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Label {
    /// No hidden volume.
    Clean,
    /// Disk carries an Artifice instance.
    Artifice,
}

impl Label {
    /// `0` for clean, `1` for Artifice.
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::Artifice => 1,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_f64(self) -> f64 {
        f64::from(self.bit())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Artifice => write!(f, "artifice"),
        }
    }
}

/// Shape of a labeled dataset.
///
/// Artifice sample `i` uses `public_targets[i % len]` and
/// `singleton_counts[i % len]`, so short lists are cycled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatasetSpec {
    pub clean_samples: usize,
    /// Target changed blocks for clean samples.
    pub clean_target: u64,
    pub artifice_samples: usize,
    /// Target public (clean) changed blocks for Artifice samples.
    pub public_targets: Vec<u64>,
    /// Singletons injected into Artifice samples.
    pub singleton_counts: Vec<u64>,
}

/// Histograms with parallel labels, clean samples first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledDataset {
    pub samples: Vec<ChainHistogram>,
    pub labels: Vec<Label>,
}

impl LabeledDataset {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Singleton fraction of every sample.
    #[must_use]
    pub fn features(&self) -> Vec<f64> {
        construct_features(&self.samples)
    }
}

/// Build a dataset from real traces, cycling through them per sample.
pub fn generate_labeled_dataset<R>(
    traces: &[ChainMatrix],
    spec: &DatasetSpec,
    sampler: &SamplerConfig,
    rng: &mut R,
) -> DetectResult<LabeledDataset>
where
    R: Rng + ?Sized,
{
    let total = spec.clean_samples + spec.artifice_samples;
    if total > 0 && traces.is_empty() {
        return Err(DetectError::NoTraces);
    }
    if spec.artifice_samples > 0 {
        if spec.public_targets.is_empty() {
            return Err(DetectError::EmptyParameterList("public_targets"));
        }
        if spec.singleton_counts.is_empty() {
            return Err(DetectError::EmptyParameterList("singleton_counts"));
        }
    }

    let mut samples = Vec::with_capacity(total);
    let mut labels = Vec::with_capacity(total);

    for i in 0..spec.clean_samples {
        let trace = &traces[i % traces.len()];
        samples.push(sample_clean_chains(trace, spec.clean_target, sampler, rng)?);
        labels.push(Label::Clean);
    }

    for i in 0..spec.artifice_samples {
        let trace = &traces[i % traces.len()];
        let target = spec.public_targets[i % spec.public_targets.len()];
        let singletons = spec.singleton_counts[i % spec.singleton_counts.len()];
        let mut histogram = sample_clean_chains(trace, target, sampler, rng)?;
        inject_singletons(&mut histogram, singletons);
        samples.push(histogram);
        labels.push(Label::Artifice);
    }

    debug!(
        clean = spec.clean_samples,
        artifice = spec.artifice_samples,
        traces = traces.len(),
        "generated labeled dataset"
    );

    Ok(LabeledDataset { samples, labels })
}

/// Fraction of chains that are singletons; `0.0` for an empty histogram.
#[must_use]
pub fn singleton_feature(histogram: &ChainHistogram) -> f64 {
    let total = histogram.total_chains();
    if total == 0 {
        return 0.0;
    }
    histogram.count(ChainLength::ONE) as f64 / total as f64
}

/// Singleton fraction per sample.
#[must_use]
pub fn construct_features(samples: &[ChainHistogram]) -> Vec<f64> {
    samples.iter().map(singleton_feature).collect()
}

#![forbid(unsafe_code)]

//! Repeated train/test detection experiments.
//!
//! Each repetition, for every scenario: sample a training and a test dataset
//! from the traces, fit a fresh detector on the singleton feature, score its
//! test predictions. The per-repetition tables (one row per scenario, columns
//! as in [`DetectionMetrics::to_row`]) are reduced to means and
//! standard-error confidence intervals.

use artifice_core::{AontConfig, ChainMatrix, Codeword, total_instance_size};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::classifier::{Detector, LogisticConfig, LogisticRegression};
use crate::dataset::{DatasetSpec, generate_labeled_dataset};
use crate::metrics::{MetricTable, confidence_intervals, evaluate, mean_table};
use crate::sampler::SamplerConfig;
use crate::{DetectError, DetectResult};

/// One Artifice configuration under test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtificeScenario {
    /// Row identifier in the report, typically the instance size.
    pub index: f64,
    /// Public changed blocks targeted on Artifice disks.
    pub public_targets: Vec<u64>,
    /// Singletons injected into Artifice disks.
    pub singleton_counts: Vec<u64>,
}

impl ArtificeScenario {
    /// Scenario for writing a whole instance of `blocks` logical blocks.
    ///
    /// Every share lands in a randomly chosen free block, so the instance
    /// contributes one isolated write per block of its effective size
    /// (encoded data plus metadata).
    pub fn for_instance(
        config: &AontConfig,
        blocks: u64,
        codeword: Codeword,
        public_target: u64,
    ) -> DetectResult<Self> {
        let singletons = total_instance_size(config, blocks, codeword)?;
        Ok(Self {
            index: blocks as f64,
            public_targets: vec![public_target],
            singleton_counts: vec![singletons],
        })
    }
}

/// Configuration for [`run_detection_experiment`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    /// Independent repetitions. Default: 10.
    pub repetitions: usize,
    /// Confidence z value. Default: 1.96.
    pub z: f64,
    /// Clean / Artifice samples per training set. Default: 100 / 100.
    pub train_clean: usize,
    pub train_artifice: usize,
    /// Clean / Artifice samples per test set. Default: 50 / 50.
    pub test_clean: usize,
    pub test_artifice: usize,
    /// Changed blocks targeted on clean disks.
    pub clean_target: u64,
    pub sampler: SamplerConfig,
    pub logistic: LogisticConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            repetitions: 10,
            z: 1.96,
            train_clean: 100,
            train_artifice: 100,
            test_clean: 50,
            test_artifice: 50,
            clean_target: 10_000,
            sampler: SamplerConfig::default(),
            logistic: LogisticConfig::default(),
        }
    }
}

impl ExperimentConfig {
    #[must_use]
    pub fn with_repetitions(mut self, repetitions: usize) -> Self {
        self.repetitions = repetitions;
        self
    }

    #[must_use]
    pub fn with_clean_target(mut self, clean_target: u64) -> Self {
        self.clean_target = clean_target;
        self
    }

    #[must_use]
    pub fn with_sizes(mut self, train: usize, test: usize) -> Self {
        self.train_clean = train;
        self.train_artifice = train;
        self.test_clean = test;
        self.test_artifice = test;
        self
    }

    fn spec(&self, clean: usize, artifice: usize, scenario: &ArtificeScenario) -> DatasetSpec {
        DatasetSpec {
            clean_samples: clean,
            clean_target: self.clean_target,
            artifice_samples: artifice,
            public_targets: scenario.public_targets.clone(),
            singleton_counts: scenario.singleton_counts.clone(),
        }
    }
}

/// Per-run tables with their means and confidence half-widths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentReport {
    pub runs: Vec<MetricTable>,
    pub means: MetricTable,
    pub ci: MetricTable,
}

/// Run the experiment with a logistic-regression detector.
pub fn run_detection_experiment<R>(
    traces: &[ChainMatrix],
    scenarios: &[ArtificeScenario],
    config: &ExperimentConfig,
    rng: &mut R,
) -> DetectResult<ExperimentReport>
where
    R: Rng + ?Sized,
{
    let logistic = config.logistic.clone();
    run_detection_experiment_with(traces, scenarios, config, rng, || {
        LogisticRegression::new(logistic.clone())
    })
}

/// Run the experiment with detectors built by `make_detector`.
pub fn run_detection_experiment_with<R, D, F>(
    traces: &[ChainMatrix],
    scenarios: &[ArtificeScenario],
    config: &ExperimentConfig,
    rng: &mut R,
    make_detector: F,
) -> DetectResult<ExperimentReport>
where
    R: Rng + ?Sized,
    D: Detector,
    F: Fn() -> D,
{
    if scenarios.is_empty() {
        return Err(DetectError::EmptyParameterList("scenarios"));
    }
    if config.repetitions == 0 {
        return Err(DetectError::NoRuns);
    }

    let mut runs = Vec::with_capacity(config.repetitions);
    for rep in 0..config.repetitions {
        let span = info_span!("detection_run", rep);
        let _guard = span.enter();

        let mut table = MetricTable::with_capacity(scenarios.len());
        for scenario in scenarios {
            let train_spec = config.spec(config.train_clean, config.train_artifice, scenario);
            let test_spec = config.spec(config.test_clean, config.test_artifice, scenario);
            let train = generate_labeled_dataset(traces, &train_spec, &config.sampler, rng)?;
            let test = generate_labeled_dataset(traces, &test_spec, &config.sampler, rng)?;

            let mut detector = make_detector();
            detector.fit(&train.features(), &train.labels)?;
            let predictions = detector.predict(&test.features())?;
            let metrics = evaluate(scenario.index, &predictions, &test.labels)?;
            debug!(
                index = scenario.index,
                accuracy = metrics.accuracy,
                precision = metrics.precision,
                recall = metrics.recall,
                "scenario scored"
            );
            table.push(metrics.to_row().to_vec());
        }
        runs.push(table);
    }

    let means = mean_table(&runs)?;
    let ci = confidence_intervals(&runs, &means, config.z)?;
    info!(
        repetitions = config.repetitions,
        scenarios = scenarios.len(),
        "detection experiment complete"
    );
    Ok(ExperimentReport { runs, means, ci })
}

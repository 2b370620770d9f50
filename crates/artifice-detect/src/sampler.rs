#![forbid(unsafe_code)]

//! Resampling real disk traces to a target number of changes.
//!
//! A trace is the chain table of one real disk. Each run draws chain lengths
//! by inverse-CDF sampling and accumulates them until the running number of
//! changed blocks reaches the target. Of `runs` attempts, the one with the
//! smallest final total is kept (first seen wins ties), which keeps the
//! overshoot past the target small.

use artifice_core::{ChainHistogram, ChainLength, ChainMatrix};
use rand::Rng;
use tracing::trace;

use crate::{DetectError, DetectResult};

/// Configuration for [`sample_clean_chains`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Independent sampling attempts per histogram. Default: 10.
    pub runs: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { runs: 10 }
    }
}

impl SamplerConfig {
    #[must_use]
    pub fn with_runs(mut self, runs: usize) -> Self {
        self.runs = runs;
        self
    }
}

/// Draw a clean chain histogram from `trace` holding at least
/// `target_changes` changed blocks.
///
/// `target_changes = 0` returns an empty histogram without drawing.
pub fn sample_clean_chains<R>(
    trace: &ChainMatrix,
    target_changes: u64,
    config: &SamplerConfig,
    rng: &mut R,
) -> DetectResult<ChainHistogram>
where
    R: Rng + ?Sized,
{
    if config.runs == 0 {
        return Err(DetectError::ZeroRuns);
    }
    let cdf = trace.cumulative_probabilities();
    let rows = trace.rows();

    let mut best: Option<(u64, ChainHistogram)> = None;
    for run in 0..config.runs {
        let mut histogram = ChainHistogram::new();
        let mut changes = 0u64;
        while changes < target_changes {
            let u: f64 = rng.gen_range(0.0..1.0);
            let idx = cdf.partition_point(|&c| c < u).min(rows.len() - 1);
            let length = rows[idx].length;
            if let Some(len) = ChainLength::new(length) {
                histogram.add(len, 1);
            }
            changes += length as u64;
        }
        trace!(run, changes, target_changes, "clean chain sample");
        if best.as_ref().is_none_or(|(min, _)| changes < *min) {
            best = Some((changes, histogram));
        }
    }

    Ok(best.map(|(_, h)| h).unwrap_or_default())
}

/// Add `count` singleton chains, the isolated writes a hidden volume adds.
pub fn inject_singletons(histogram: &mut ChainHistogram, count: u64) {
    histogram.add(ChainLength::ONE, count);
}

#![forbid(unsafe_code)]

//! Chain statistics over block-change sequences.
//!
//! A *chain* is a maximal run of consecutive changed blocks. A change log
//! (one flag per block, `true` = changed) reduces to a histogram mapping
//! chain length to occurrence count, and from there to a dense probability
//! table over lengths `1..=max`.
//!
//! # Exact Baseline
//!
//! For `k` distinct uniform writes over `n` blocks, every arrangement of the
//! writes is equally likely (`C(n, k)` of them). An arrangement whose chains,
//! read left to right, have lengths `c_1..c_j` is fixed by choosing `j`
//! separated slots among the `n - k + 1` gaps between unwritten blocks:
//!
//! ```text
//! P(chain lengths = (c_1..c_j)) = C(n - k + 1, j) / C(n, k)
//! ```
//!
//! Summing over orderings, a partition with part multiplicities `m_i`
//! carries weight `j! / prod(m_i!) * C(n - k + 1, j) / C(n, k)`. Enumerating
//! partitions instead of compositions keeps `k = 50` tractable
//! (204,226 partitions against 2^49 compositions).
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | empty histogram to matrix | `EmptyHistogram` |
//! | writes > disk size | `InvalidSampleSize` |
//! | zero writes | `ZeroWrites` |
//! | zero samples | `ZeroSamples` |
//! | malformed trace row | `InvalidTraceRow` |

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;

use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::combinatorics::{LnFactorials, Partitions, ln_combinations};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by the chain-statistics engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainError {
    /// A histogram with no chains has no probability table.
    EmptyHistogram,
    /// More distinct writes requested than the disk has blocks.
    InvalidSampleSize { writes: usize, disk_size: usize },
    /// The exact model needs at least one write.
    ZeroWrites,
    /// An estimator was asked to average over zero samples.
    ZeroSamples,
    /// A trace table row failed validation.
    InvalidTraceRow { row: usize, reason: &'static str },
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyHistogram => write!(f, "chain histogram is empty"),
            Self::InvalidSampleSize { writes, disk_size } => write!(
                f,
                "cannot place {writes} distinct writes on a disk of {disk_size} blocks"
            ),
            Self::ZeroWrites => write!(f, "at least one write is required"),
            Self::ZeroSamples => write!(f, "at least one sample is required"),
            Self::InvalidTraceRow { row, reason } => {
                write!(f, "invalid trace row {row}: {reason}")
            }
        }
    }
}

impl std::error::Error for ChainError {}

/// Result type for chain statistics.
pub type ChainResult<T> = Result<T, ChainError>;

// =============================================================================
// Chain histogram
// =============================================================================

/// Length of a chain; always at least one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ChainLength(NonZeroUsize);

impl ChainLength {
    /// A single isolated changed block.
    pub const ONE: Self = Self(NonZeroUsize::MIN);

    /// `None` for zero.
    #[inline]
    #[must_use]
    pub fn new(len: usize) -> Option<Self> {
        NonZeroUsize::new(len).map(Self)
    }

    #[inline]
    #[must_use]
    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for ChainLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Occurrence counts per chain length. Only positive counts are stored, so
/// an empty histogram is exactly one with no chains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainHistogram {
    counts: BTreeMap<ChainLength, u64>,
}

impl ChainHistogram {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tabulate the chains in a change sequence in a single pass.
    ///
    /// A run still open at the end of the sequence is recorded.
    #[must_use]
    pub fn from_changes<I>(changes: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let mut histogram = Self::new();
        let mut run = 0usize;
        for changed in changes {
            if changed {
                run += 1;
            } else if let Some(len) = ChainLength::new(run) {
                histogram.add(len, 1);
                run = 0;
            }
        }
        if let Some(len) = ChainLength::new(run) {
            histogram.add(len, 1);
        }
        histogram
    }

    /// Add `count` occurrences of chains of `length`. Zero is a no-op.
    pub fn add(&mut self, length: ChainLength, count: u64) {
        if count == 0 {
            return;
        }
        *self.counts.entry(length).or_insert(0) += count;
    }

    /// Occurrences of chains of `length`.
    #[must_use]
    pub fn count(&self, length: ChainLength) -> u64 {
        self.counts.get(&length).copied().unwrap_or(0)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of distinct chain lengths present.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Total chain occurrences.
    #[must_use]
    pub fn total_chains(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Total changed blocks, `sum(length * count)`.
    #[must_use]
    pub fn total_changes(&self) -> u64 {
        self.counts
            .iter()
            .map(|(len, count)| len.get() as u64 * count)
            .sum()
    }

    /// Longest chain present.
    #[must_use]
    pub fn max_length(&self) -> Option<ChainLength> {
        self.counts.keys().next_back().copied()
    }

    /// `(length, count)` pairs in ascending length order.
    pub fn iter(&self) -> impl Iterator<Item = (ChainLength, u64)> + '_ {
        self.counts.iter().map(|(len, count)| (*len, *count))
    }
}

/// Tabulate the chains of a change sequence.
#[must_use]
pub fn build_chain_histogram<I>(changes: I) -> ChainHistogram
where
    I: IntoIterator<Item = bool>,
{
    ChainHistogram::from_changes(changes)
}

// =============================================================================
// Chain matrix
// =============================================================================

/// One row of a chain table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChainRow {
    pub length: usize,
    pub count: u64,
    pub probability: f64,
}

/// Ordered table of `(length, count, probability)` rows.
///
/// Built from a histogram it is dense over `1..=max_length`; loaded from a
/// trace it holds the observed lengths only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainMatrix {
    rows: Vec<ChainRow>,
}

impl ChainMatrix {
    /// Dense table over `1..=max_length`; absent lengths get zero rows.
    pub fn from_histogram(histogram: &ChainHistogram) -> ChainResult<Self> {
        let max = histogram.max_length().ok_or(ChainError::EmptyHistogram)?;
        let total = histogram.total_chains() as f64;
        let mut rows: Vec<ChainRow> = (1..=max.get())
            .map(|length| ChainRow {
                length,
                count: 0,
                probability: 0.0,
            })
            .collect();
        for (len, count) in histogram.iter() {
            let row = &mut rows[len.get() - 1];
            row.count = count;
            row.probability = count as f64 / total;
        }
        Ok(Self { rows })
    }

    /// Validate an externally supplied table.
    ///
    /// Rows must be non-empty, lengths positive and strictly ascending,
    /// probabilities finite and within `[0, 1]`.
    pub fn from_rows(rows: Vec<ChainRow>) -> ChainResult<Self> {
        if rows.is_empty() {
            return Err(ChainError::EmptyHistogram);
        }
        let mut prev = 0usize;
        for (i, row) in rows.iter().enumerate() {
            if row.length == 0 {
                return Err(ChainError::InvalidTraceRow {
                    row: i,
                    reason: "chain length must be positive",
                });
            }
            if row.length <= prev {
                return Err(ChainError::InvalidTraceRow {
                    row: i,
                    reason: "chain lengths must be strictly ascending",
                });
            }
            if !(0.0..=1.0).contains(&row.probability) {
                return Err(ChainError::InvalidTraceRow {
                    row: i,
                    reason: "probability outside [0, 1]",
                });
            }
            prev = row.length;
        }
        Ok(Self { rows })
    }

    #[inline]
    #[must_use]
    pub fn rows(&self) -> &[ChainRow] {
        &self.rows
    }

    /// Sum of the count column.
    #[must_use]
    pub fn total_chains(&self) -> u64 {
        self.rows.iter().map(|r| r.count).sum()
    }

    /// Probability column entry for `length`, zero when absent.
    #[must_use]
    pub fn probability_at(&self, length: usize) -> f64 {
        self.rows
            .iter()
            .find(|r| r.length == length)
            .map_or(0.0, |r| r.probability)
    }

    /// Running sum of the probability column with the last entry pinned to
    /// exactly `1.0`, so inverse-CDF draws always land on a row.
    #[must_use]
    pub fn cumulative_probabilities(&self) -> Vec<f64> {
        let mut acc = 0.0;
        let mut cdf: Vec<f64> = self
            .rows
            .iter()
            .map(|r| {
                acc += r.probability;
                acc
            })
            .collect();
        if let Some(last) = cdf.last_mut() {
            *last = 1.0;
        }
        cdf
    }
}

/// Convert a histogram into its dense probability table.
pub fn histogram_to_matrix(histogram: &ChainHistogram) -> ChainResult<ChainMatrix> {
    ChainMatrix::from_histogram(histogram)
}

// =============================================================================
// Exact chain distribution
// =============================================================================

/// Closed-form chain statistics for `k` uniform distinct writes over `n` blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExactChainDistribution {
    pub n: usize,
    pub k: usize,
    /// Expected fraction of chains with length `i + 1`.
    pub prob_per_chain: Vec<f64>,
    /// Expected number of chains.
    pub expected_chains: f64,
    /// Expected number of chains with length `i + 1`.
    pub expected_chains_by_size: Vec<f64>,
}

impl ExactChainDistribution {
    /// Expected singletons per write; the quantity
    /// [`empirical_singleton_probability`] estimates.
    #[must_use]
    pub fn singletons_per_write(&self) -> f64 {
        self.expected_chains_by_size[0] / self.k as f64
    }
}

/// Exact chain-length statistics by enumeration over the partitions of `k`.
///
/// Cost grows with the partition count of `k`; see
/// [`crate::combinatorics::PRACTICAL_PARTITION_CEILING`]. Memory and the
/// binomial terms are `O(k)`, independent of the disk size `n`.
pub fn exact_chain_probabilities(n: usize, k: usize) -> ChainResult<ExactChainDistribution> {
    if k == 0 {
        return Err(ChainError::ZeroWrites);
    }
    if k > n {
        return Err(ChainError::InvalidSampleSize {
            writes: k,
            disk_size: n,
        });
    }

    let table = LnFactorials::new(k);
    let gaps = n - k + 1;
    let ln_total = ln_combinations(n as u64, k as u64);
    // ln C(gaps, j) for j in 0..=k
    let mut ln_gap_choose = vec![f64::NEG_INFINITY; k + 1];
    ln_gap_choose[0] = 0.0;
    for j in 1..=k.min(gaps) {
        ln_gap_choose[j] = ln_gap_choose[j - 1] + ((gaps - j + 1) as f64).ln() - (j as f64).ln();
    }

    let mut prob_per_chain = vec![0.0; k];
    let mut expected_chains = 0.0;
    let mut expected_chains_by_size = vec![0.0; k];
    let mut partitions = 0usize;

    for partition in Partitions::new(k) {
        partitions += 1;
        let chains = partition.len();
        let ln_weight = partition.ln_orderings(&table) + ln_gap_choose[chains] - ln_total;
        let weight = ln_weight.exp();
        if weight == 0.0 {
            continue;
        }
        expected_chains += weight * chains as f64;
        for (i, &count) in partition.chain_length_histogram().iter().enumerate() {
            if count == 0 {
                continue;
            }
            let count = count as f64;
            prob_per_chain[i] += weight * count / chains as f64;
            expected_chains_by_size[i] += weight * count;
        }
    }

    debug!(n, k, partitions, expected_chains, "exact chain probabilities");

    Ok(ExactChainDistribution {
        n,
        k,
        prob_per_chain,
        expected_chains,
        expected_chains_by_size,
    })
}

// =============================================================================
// Random writes
// =============================================================================

/// Place `writes` distinct uniform writes on a disk of `disk_size` blocks.
///
/// Positions are drawn with rejection on collision.
pub fn sample_random_writes<R>(disk_size: usize, writes: usize, rng: &mut R) -> ChainResult<Vec<bool>>
where
    R: Rng + ?Sized,
{
    if writes > disk_size {
        return Err(ChainError::InvalidSampleSize { writes, disk_size });
    }
    let mut disk = vec![false; disk_size];
    for _ in 0..writes {
        let mut i = rng.gen_range(0..disk_size);
        while disk[i] {
            i = rng.gen_range(0..disk_size);
        }
        disk[i] = true;
    }
    Ok(disk)
}

/// Monte-Carlo estimate of singletons per write for `writes` uniform writes.
///
/// Averages `(chains / writes) * P(length = 1)` over `samples` disks.
pub fn empirical_singleton_probability<R>(
    disk_size: usize,
    writes: usize,
    samples: usize,
    rng: &mut R,
) -> ChainResult<f64>
where
    R: Rng + ?Sized,
{
    if samples == 0 {
        return Err(ChainError::ZeroSamples);
    }
    if writes == 0 {
        return Err(ChainError::ZeroWrites);
    }
    let mut acc = 0.0;
    for _ in 0..samples {
        let disk = sample_random_writes(disk_size, writes, rng)?;
        let matrix = ChainMatrix::from_histogram(&ChainHistogram::from_changes(disk))?;
        let chains_per_write = matrix.total_chains() as f64 / writes as f64;
        acc += chains_per_write * matrix.rows()[0].probability;
    }
    Ok(acc / samples as f64)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn len(n: usize) -> ChainLength {
        ChainLength::new(n).unwrap()
    }

    fn flags(bits: &[u8]) -> Vec<bool> {
        bits.iter().map(|&b| b == 1).collect()
    }

    // =========================================================================
    // Histogram
    // =========================================================================

    #[test]
    fn histogram_counts_runs() {
        let h = build_chain_histogram(flags(&[1, 1, 0, 1, 0, 0, 1, 1, 1, 0, 1]));
        assert_eq!(h.count(len(1)), 2);
        assert_eq!(h.count(len(2)), 1);
        assert_eq!(h.count(len(3)), 1);
        assert_eq!(h.total_chains(), 4);
        assert_eq!(h.total_changes(), 7);
        assert_eq!(h.max_length(), Some(len(3)));
    }

    #[test]
    fn histogram_records_run_open_at_end() {
        let h = build_chain_histogram(flags(&[0, 1, 1, 1]));
        assert_eq!(h.iter().collect::<Vec<_>>(), vec![(len(3), 1)]);
    }

    #[test]
    fn histogram_of_clean_disk_is_empty() {
        assert!(build_chain_histogram(flags(&[0, 0, 0])).is_empty());
        assert!(build_chain_histogram(Vec::new()).is_empty());
    }

    #[test]
    fn add_zero_keeps_histogram_empty() {
        let mut h = ChainHistogram::new();
        h.add(ChainLength::ONE, 0);
        assert!(h.is_empty());
        h.add(ChainLength::ONE, 3);
        h.add(ChainLength::ONE, 2);
        assert_eq!(h.count(ChainLength::ONE), 5);
    }

    #[test]
    fn chain_length_rejects_zero() {
        assert!(ChainLength::new(0).is_none());
        assert_eq!(ChainLength::ONE.get(), 1);
    }

    // =========================================================================
    // Matrix
    // =========================================================================

    #[test]
    fn matrix_is_dense_with_zero_rows() {
        let mut h = ChainHistogram::new();
        h.add(len(1), 3);
        h.add(len(4), 1);
        let m = histogram_to_matrix(&h).unwrap();
        let rows = m.rows();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].count, 3);
        assert!((rows[0].probability - 0.75).abs() < 1e-12);
        assert_eq!(rows[1].count, 0);
        assert_eq!(rows[1].probability, 0.0);
        assert_eq!(rows[2].length, 3);
        assert!((rows[3].probability - 0.25).abs() < 1e-12);
        assert_eq!(m.total_chains(), 4);
    }

    #[test]
    fn empty_histogram_has_no_matrix() {
        assert_eq!(
            histogram_to_matrix(&ChainHistogram::new()),
            Err(ChainError::EmptyHistogram)
        );
    }

    #[test]
    fn cumulative_probabilities_end_at_one() {
        let rows = vec![
            ChainRow { length: 1, count: 1, probability: 0.1 },
            ChainRow { length: 2, count: 1, probability: 0.2 },
            ChainRow { length: 5, count: 1, probability: 0.69999 },
        ];
        let m = ChainMatrix::from_rows(rows).unwrap();
        let cdf = m.cumulative_probabilities();
        assert!((cdf[0] - 0.1).abs() < 1e-12);
        assert!((cdf[1] - 0.3).abs() < 1e-12);
        assert_eq!(cdf[2], 1.0);
        assert!((m.probability_at(2) - 0.2).abs() < 1e-12);
        assert_eq!(m.probability_at(3), 0.0);
    }

    #[test]
    fn from_rows_validates() {
        let row = |length, probability| ChainRow { length, count: 1, probability };
        assert_eq!(ChainMatrix::from_rows(vec![]), Err(ChainError::EmptyHistogram));
        assert!(matches!(
            ChainMatrix::from_rows(vec![row(0, 1.0)]),
            Err(ChainError::InvalidTraceRow { row: 0, .. })
        ));
        assert!(matches!(
            ChainMatrix::from_rows(vec![row(2, 0.5), row(1, 0.5)]),
            Err(ChainError::InvalidTraceRow { row: 1, .. })
        ));
        assert!(matches!(
            ChainMatrix::from_rows(vec![row(1, 1.5)]),
            Err(ChainError::InvalidTraceRow { .. })
        ));
    }

    // =========================================================================
    // Exact distribution
    // =========================================================================

    #[test]
    fn exact_small_case_by_hand() {
        // n = 4, k = 2: 6 arrangements.
        // Adjacent pairs (3): one chain of length 2.
        // Separated pairs (3): two singletons.
        let d = exact_chain_probabilities(4, 2).unwrap();
        assert!((d.prob_per_chain[0] - 0.5).abs() < 1e-12);
        assert!((d.prob_per_chain[1] - 0.5).abs() < 1e-12);
        assert!((d.expected_chains - 1.5).abs() < 1e-12);
        assert!((d.expected_chains_by_size[0] - 1.0).abs() < 1e-12);
        assert!((d.expected_chains_by_size[1] - 0.5).abs() < 1e-12);
        assert!((d.singletons_per_write() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn exact_probabilities_sum_to_one() {
        for (n, k) in [(10, 3), (30, 8), (100, 12)] {
            let d = exact_chain_probabilities(n, k).unwrap();
            let total: f64 = d.prob_per_chain.iter().sum();
            assert!((total - 1.0).abs() < 1e-9, "n={n} k={k} total={total}");
            let writes: f64 = d
                .expected_chains_by_size
                .iter()
                .enumerate()
                .map(|(i, e)| (i + 1) as f64 * e)
                .sum();
            assert!((writes - k as f64).abs() < 1e-8, "n={n} k={k}");
        }
    }

    #[test]
    fn exact_full_disk_is_one_chain() {
        let d = exact_chain_probabilities(5, 5).unwrap();
        assert!((d.prob_per_chain[4] - 1.0).abs() < 1e-12);
        assert!((d.expected_chains - 1.0).abs() < 1e-12);
    }

    #[test]
    fn exact_scales_to_real_disk_sizes() {
        for (n, k) in [(200_000_000, 3), (1_000_000_000, 5)] {
            let d = exact_chain_probabilities(n, k).unwrap();
            let s = d.singletons_per_write();
            assert!(s <= 1.0, "n={n} k={k} singletons/write={s}");
            assert!(s > 0.9999, "n={n} k={k} singletons/write={s}");
            let total: f64 = d.prob_per_chain.iter().sum();
            assert!((total - 1.0).abs() < 1e-12, "n={n} k={k} total={total}");
        }
        // Three writes on 200M blocks: 1 - 4/n up to O(1/n^2).
        let s = exact_chain_probabilities(200_000_000, 3)
            .unwrap()
            .singletons_per_write();
        assert!((s - (1.0 - 4.0 / 200_000_000.0)).abs() < 1e-12, "{s}");
    }

    #[test]
    fn exact_rejects_degenerate_inputs() {
        assert_eq!(exact_chain_probabilities(10, 0), Err(ChainError::ZeroWrites));
        assert_eq!(
            exact_chain_probabilities(3, 4),
            Err(ChainError::InvalidSampleSize { writes: 4, disk_size: 3 })
        );
    }

    // =========================================================================
    // Random writes
    // =========================================================================

    #[test]
    fn random_writes_places_distinct_blocks() {
        let mut rng = StdRng::seed_from_u64(7);
        let disk = sample_random_writes(100, 40, &mut rng).unwrap();
        assert_eq!(disk.len(), 100);
        assert_eq!(disk.iter().filter(|&&b| b).count(), 40);
    }

    #[test]
    fn random_writes_can_fill_disk() {
        let mut rng = StdRng::seed_from_u64(1);
        let disk = sample_random_writes(16, 16, &mut rng).unwrap();
        assert!(disk.iter().all(|&b| b));
    }

    #[test]
    fn random_writes_rejects_oversized_request() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            sample_random_writes(5, 6, &mut rng),
            Err(ChainError::InvalidSampleSize { writes: 6, disk_size: 5 })
        );
    }

    #[test]
    fn random_writes_reproducible_with_seed() {
        let a = sample_random_writes(200, 30, &mut StdRng::seed_from_u64(99)).unwrap();
        let b = sample_random_writes(200, 30, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empirical_requires_samples() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            empirical_singleton_probability(100, 10, 0, &mut rng),
            Err(ChainError::ZeroSamples)
        );
        assert_eq!(
            empirical_singleton_probability(100, 0, 10, &mut rng),
            Err(ChainError::ZeroWrites)
        );
    }

    #[test]
    fn empirical_tracks_exact_on_small_disk() {
        let mut rng = StdRng::seed_from_u64(2024);
        let exact = exact_chain_probabilities(60, 10).unwrap().singletons_per_write();
        let empirical = empirical_singleton_probability(60, 10, 4000, &mut rng).unwrap();
        assert!(
            (exact - empirical).abs() < 0.02,
            "exact={exact} empirical={empirical}"
        );
    }
}

#![forbid(unsafe_code)]

//! Combinatorics kernel: binomial coefficients and integer partitions.
//!
//! # Mathematical Model
//!
//! ```text
//! C(n, r) = n! / (r! (n - r)!)       0 <= r <= n
//! C(n, r) = 0                        r > n
//! ```
//!
//! A partition of `k` is a multiset of positive integers summing to `k`.
//! Partitions are represented canonically as non-increasing part lists, so
//! `(2, 1)` and `(1, 2)` are the same partition.
//!
//! # Scaling
//!
//! The number of partitions grows as `exp(pi * sqrt(2k/3)) / (4k sqrt 3)`:
//! `p(25) = 1958`, `p(50) = 204_226`, `p(64) = 1_741_630`,
//! `p(100) = 190_569_292`. Enumeration above [`PRACTICAL_PARTITION_CEILING`]
//! still runs to completion but is logged as a performance hazard.

use std::collections::BTreeSet;
use std::fmt;

use tracing::warn;

/// Largest `k` for which full partition enumeration is routinely practical.
///
/// Each partition costs `O(k)` work, so `k = 64` means roughly
/// `1.7e6 * 64 ~ 1e8` elementary steps: interactive on a laptop, and
/// tracked by the `chains/exact` benchmark group. The next order of
/// magnitude in partitions arrives near `k = 75` (`p(75) = 8_118_264`) and
/// `k = 100` is about a hundred times `k = 64`. The write counts the chain
/// analysis uses in practice (around 25, `p(25) = 1958`) sit far below this.
pub const PRACTICAL_PARTITION_CEILING: usize = 64;

/// Number of ways to choose `r` of `n` elements.
///
/// Returns `0.0` when `r > n`. Computed multiplicatively over the smaller of
/// `r` and `n - r`, so the result is exact while it fits in the 53-bit
/// mantissa and overflows to infinity only past `f64::MAX`.
#[must_use]
pub fn combinations(n: u64, r: u64) -> f64 {
    if r > n {
        return 0.0;
    }
    let r = r.min(n - r);
    let mut acc = 1.0_f64;
    for i in 1..=r {
        acc = acc * (n - r + i) as f64 / i as f64;
    }
    acc.round()
}

/// Natural logarithm of [`combinations`]; `-inf` when `r > n`.
#[must_use]
pub fn ln_combinations(n: u64, r: u64) -> f64 {
    if r > n {
        return f64::NEG_INFINITY;
    }
    let r = r.min(n - r);
    (1..=r)
        .map(|i| ((n - r + i) as f64).ln() - (i as f64).ln())
        .sum()
}

/// Precomputed `ln(i!)` for `i` in `0..=max`.
///
/// Used where many binomial ratios over the same `n` are needed, e.g. when
/// weighting every partition of `k` against `C(n, k)`.
#[derive(Debug, Clone)]
pub struct LnFactorials {
    table: Vec<f64>,
}

impl LnFactorials {
    /// Build the table up to and including `max`.
    #[must_use]
    pub fn new(max: usize) -> Self {
        let mut table = Vec::with_capacity(max + 1);
        table.push(0.0);
        let mut acc = 0.0_f64;
        for i in 1..=max {
            acc += (i as f64).ln();
            table.push(acc);
        }
        Self { table }
    }

    /// Largest argument the table covers.
    #[inline]
    #[must_use]
    pub fn max(&self) -> usize {
        self.table.len() - 1
    }

    /// `ln(n!)`. Panics if `n` exceeds [`Self::max`].
    #[inline]
    #[must_use]
    pub fn ln_factorial(&self, n: usize) -> f64 {
        self.table[n]
    }

    /// `ln C(n, r)`; `-inf` when `r > n`.
    #[must_use]
    pub fn ln_combinations(&self, n: usize, r: usize) -> f64 {
        if r > n {
            return f64::NEG_INFINITY;
        }
        self.table[n] - self.table[r] - self.table[n - r]
    }
}

// =============================================================================
// Partitions
// =============================================================================

/// A partition of a positive integer in canonical (non-increasing) order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Partition {
    parts: Vec<usize>,
}

impl Partition {
    /// Build a partition from parts in any order. Zero parts are dropped.
    #[must_use]
    pub fn from_parts(mut parts: Vec<usize>) -> Self {
        parts.retain(|&p| p > 0);
        parts.sort_unstable_by(|a, b| b.cmp(a));
        Self { parts }
    }

    /// Parts, largest first.
    #[inline]
    #[must_use]
    pub fn parts(&self) -> &[usize] {
        &self.parts
    }

    /// Number of parts (chains).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// True for the partition of zero.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Sum of the parts.
    #[must_use]
    pub fn total(&self) -> usize {
        self.parts.iter().sum()
    }

    /// Count of parts of each length; index `i` holds the count for length `i + 1`.
    ///
    /// The vector has `total()` entries.
    #[must_use]
    pub fn chain_length_histogram(&self) -> Vec<u64> {
        let mut counts = vec![0u64; self.total()];
        for &p in &self.parts {
            counts[p - 1] += 1;
        }
        counts
    }

    /// `ln` of the number of distinct orderings of the parts:
    /// `len! / prod(multiplicity!)`.
    ///
    /// `table` must cover at least `len()`.
    #[must_use]
    pub fn ln_orderings(&self, table: &LnFactorials) -> f64 {
        let mut ln = table.ln_factorial(self.parts.len());
        let mut run = 0usize;
        for (i, &p) in self.parts.iter().enumerate() {
            run += 1;
            let last_of_run = self.parts.get(i + 1) != Some(&p);
            if last_of_run {
                ln -= table.ln_factorial(run);
                run = 0;
            }
        }
        ln
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ")")
    }
}

/// Stack-based generator over the partitions of `k`.
///
/// Each partition is yielded exactly once, already canonical, so callers
/// that only need to visit partitions can skip the set.
#[derive(Debug, Clone)]
pub struct Partitions {
    /// Pending frames: (remaining, largest allowed part, prefix).
    stack: Vec<(usize, usize, Vec<usize>)>,
}

impl Partitions {
    /// Enumerate the partitions of `k`. `k = 0` yields nothing.
    #[must_use]
    pub fn new(k: usize) -> Self {
        if k > PRACTICAL_PARTITION_CEILING {
            warn!(
                k,
                ceiling = PRACTICAL_PARTITION_CEILING,
                "partition enumeration above practical ceiling"
            );
        }
        let stack = if k == 0 {
            Vec::new()
        } else {
            vec![(k, k, Vec::new())]
        };
        Self { stack }
    }
}

impl Iterator for Partitions {
    type Item = Partition;

    fn next(&mut self) -> Option<Partition> {
        while let Some((remaining, max_part, prefix)) = self.stack.pop() {
            if remaining == 0 {
                return Some(Partition { parts: prefix });
            }
            // Push smaller parts first so larger leading parts pop first.
            for part in 1..=max_part.min(remaining) {
                let mut next = Vec::with_capacity(prefix.len() + 1);
                next.extend_from_slice(&prefix);
                next.push(part);
                self.stack.push((remaining - part, part, next));
            }
        }
        None
    }
}

/// The set of all partitions of `k`, deduplicated on canonical form.
#[must_use]
pub fn partitions_of(k: usize) -> BTreeSet<Partition> {
    Partitions::new(k).collect()
}

/// All partitions of `k` as a list in canonical order.
#[must_use]
pub fn all_partitions(k: usize) -> Vec<Partition> {
    partitions_of(k).into_iter().collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

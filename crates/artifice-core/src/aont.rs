#![forbid(unsafe_code)]

//! Capacity and survival model for AONT-RS encoded Artifice instances.
//!
//! An Artifice instance stores each logical block as a codeword of `data`
//! data shares and `parity` parity shares, scattered through the free space
//! of a host filesystem. Metadata maps logical blocks to share locations.
//!
//! # Metadata Layout
//!
//! ```text
//! record_size        = parity * (pointer + checksum) + block_hash
//! entries_per_block  = floor(block_size / record_size)
//! map_blocks         = ceil(blocks / (data * entries_per_block))
//! map_map_blocks     = ceil(map_blocks / (data * entries_per_block))
//! pointer_blocks     = ceil(map_map_blocks / (floor(block_size / pointer) - 1))
//! metadata_size      = (pointer_blocks + 1) * replicas + map_map_blocks + map_blocks
//! effective_data     = ceil(blocks * (parity + data) / data)
//! ```
//!
//! All ceilings are computed in integer arithmetic.
//!
//! # Survival Model
//!
//! Each day every share is overwritten independently with probability
//! `p = overwritten / free`. A codeword survives an epoch while at most
//! `parity` of its `data + parity` shares are lost:
//!
//! ```text
//! S(d, m, p) = P(X <= m),   X ~ Binomial(m + d, p)
//! ```
//!
//! Survival over the horizon compounds independently across blocks and days:
//!
//! ```text
//! P(metadata alive) = S ^ (metadata_size * num_days)
//! P(instance alive) = S ^ ((metadata_size + effective_data) * num_days)
//! ```
//!
//! The two exponents are deliberately distinct: the first asks whether the
//! map survives, the second whether every block of the instance does.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | data = 0 | `InvalidCodeword` |
//! | blocks = 0 | `InvalidInstanceSize` |
//! | record larger than a block | `InvalidRecordSize` |
//! | a block count exceeds `u64` | `Overflow` |
//! | free not positive | `DivisionByZeroOverwriteRate` |
//! | p outside [0, 1] | `InvalidOverwriteProbability` |

use std::fmt;

use serde::Serialize;
use tracing::debug;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by the capacity and survival model.
#[derive(Debug, Clone, PartialEq)]
pub enum AontError {
    /// A codeword needs at least one data share.
    InvalidCodeword { data: u64 },
    /// An instance must expose at least one block.
    InvalidInstanceSize,
    /// Metadata needs at least one replica.
    InvalidReplicas,
    /// A metadata record does not fit in a block.
    InvalidRecordSize { record_size: u64, block_size: u64 },
    /// The configuration leaves no room for pointers in a pointer block.
    InvalidConfig(&'static str),
    /// A derived size does not fit in `u64`.
    Overflow(&'static str),
    /// Overwrite rate requested without a positive free-block count.
    DivisionByZeroOverwriteRate,
    /// Overwrite probability is outside `[0, 1]`.
    InvalidOverwriteProbability(f64),
}

impl fmt::Display for AontError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCodeword { data } => {
                write!(f, "codeword must have at least one data share (got {data})")
            }
            Self::InvalidInstanceSize => write!(f, "instance size must be positive"),
            Self::InvalidReplicas => write!(f, "metadata replicas must be positive"),
            Self::InvalidRecordSize {
                record_size,
                block_size,
            } => write!(
                f,
                "record size {record_size} bytes does not fit a {block_size}-byte block"
            ),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Overflow(what) => write!(f, "{what} overflows u64"),
            Self::DivisionByZeroOverwriteRate => {
                write!(f, "overwrite rate undefined: free blocks must be positive")
            }
            Self::InvalidOverwriteProbability(p) => {
                write!(f, "overwrite probability {p} outside [0, 1]")
            }
        }
    }
}

impl std::error::Error for AontError {}

/// Result type for the AONT model.
pub type AontResult<T> = Result<T, AontError>;

// =============================================================================
// Configuration
// =============================================================================

/// Physical constants of the on-disk layout and the survival horizon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AontConfig {
    /// Block size in bytes. Default: 4096.
    pub block_size: u64,
    /// Size of a share pointer in bytes. Default: 4.
    pub pointer_size: u64,
    /// Per-share checksum in bytes. Default: 0.
    pub checksum_size: u64,
    /// Per-block hash stored in each map record. Default: 16.
    pub block_hash_size: u64,
    /// Survival horizon in days. Default: 365.
    pub num_days: u32,
    /// Metadata replicas assumed by the survival functions. Default: 8.
    pub metadata_replicas: u64,
}

impl Default for AontConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            pointer_size: 4,
            checksum_size: 0,
            block_hash_size: 16,
            num_days: 365,
            metadata_replicas: 8,
        }
    }
}

impl AontConfig {
    /// Override the block size.
    #[must_use]
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    /// Override the per-share checksum size.
    #[must_use]
    pub fn with_checksum_size(mut self, checksum_size: u64) -> Self {
        self.checksum_size = checksum_size;
        self
    }

    /// Override the survival horizon.
    #[must_use]
    pub fn with_num_days(mut self, num_days: u32) -> Self {
        self.num_days = num_days;
        self
    }

    /// Override the replica count used by the survival functions.
    #[must_use]
    pub fn with_metadata_replicas(mut self, replicas: u64) -> Self {
        self.metadata_replicas = replicas;
        self
    }

    /// Bytes per map record for a codeword with `parity` parity shares.
    /// `None` if the record size overflows.
    #[inline]
    #[must_use]
    pub fn record_size(&self, parity: u64) -> Option<u64> {
        self.pointer_size
            .checked_add(self.checksum_size)?
            .checked_mul(parity)?
            .checked_add(self.block_hash_size)
    }

    /// Pointers held by one pointer block (one slot is reserved).
    #[inline]
    #[must_use]
    pub fn pointers_per_pointer_block(&self) -> u64 {
        (self.block_size / self.pointer_size.max(1)).saturating_sub(1)
    }
}

// =============================================================================
// Codeword
// =============================================================================

/// An erasure-code split: `data` data shares plus `parity` parity shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Codeword {
    data: u64,
    parity: u64,
}

impl Codeword {
    /// Validate and build a codeword configuration.
    pub fn new(data: u64, parity: u64) -> AontResult<Self> {
        if data == 0 {
            return Err(AontError::InvalidCodeword { data });
        }
        if data.checked_add(parity).is_none() {
            return Err(AontError::Overflow("codeword width"));
        }
        Ok(Self { data, parity })
    }

    #[inline]
    #[must_use]
    pub fn data(self) -> u64 {
        self.data
    }

    #[inline]
    #[must_use]
    pub fn parity(self) -> u64 {
        self.parity
    }

    /// Shares per codeword.
    #[inline]
    #[must_use]
    pub fn width(self) -> u64 {
        self.data + self.parity
    }

    /// Write amplification `(parity + data) / data`.
    #[must_use]
    pub fn amplification_factor(self) -> f64 {
        self.width() as f64 / self.data as f64
    }
}

impl fmt::Display for Codeword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} data + {} parity", self.data, self.parity)
    }
}

// =============================================================================
// Metadata layout
// =============================================================================

/// Block counts derived from a codeword configuration and an instance size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataStats {
    /// Logical blocks the instance exposes.
    pub blocks: u64,
    pub num_map_blocks: u64,
    pub num_map_map_blocks: u64,
    pub num_pointer_blocks: u64,
    pub replicas: u64,
    /// Total metadata blocks including replicated pointer blocks.
    pub metadata_size: u64,
    /// Blocks consumed by encoded data shares.
    pub effective_data_size: u64,
    /// Shares that fit in one free block.
    pub shares_per_block: u64,
}

impl MetadataStats {
    /// The classic 7-tuple view:
    /// `(map, map_map, pointer, replicas, metadata, effective_data, shares_per_block)`.
    #[must_use]
    pub fn as_tuple(&self) -> (u64, u64, u64, u64, u64, u64, u64) {
        (
            self.num_map_blocks,
            self.num_map_map_blocks,
            self.num_pointer_blocks,
            self.replicas,
            self.metadata_size,
            self.effective_data_size,
            self.shares_per_block,
        )
    }

    /// Metadata blocks as a percentage of logical blocks.
    #[must_use]
    pub fn overhead_percent(&self) -> f64 {
        self.metadata_size as f64 / self.blocks as f64 * 100.0
    }

    /// Metadata plus encoded data, in blocks.
    ///
    /// Fits in `u64` for every value [`metadata_layout`] returns.
    #[must_use]
    pub fn effective_instance_size(&self) -> u64 {
        self.metadata_size.saturating_add(self.effective_data_size)
    }
}

/// Compute the metadata layout of an instance of `blocks` logical blocks.
pub fn metadata_layout(
    config: &AontConfig,
    blocks: u64,
    codeword: Codeword,
    replicas: u64,
) -> AontResult<MetadataStats> {
    if blocks == 0 {
        return Err(AontError::InvalidInstanceSize);
    }
    if replicas == 0 {
        return Err(AontError::InvalidReplicas);
    }
    let pointers_per_pointer_block = config.pointers_per_pointer_block();
    if pointers_per_pointer_block == 0 {
        return Err(AontError::InvalidConfig(
            "block size leaves no room for pointers",
        ));
    }

    let record_size = config
        .record_size(codeword.parity)
        .ok_or(AontError::Overflow("record size"))?;
    if record_size == 0 || record_size > config.block_size {
        return Err(AontError::InvalidRecordSize {
            record_size,
            block_size: config.block_size,
        });
    }
    let entries_per_block = config.block_size / record_size;
    let per_map_block = codeword
        .data
        .checked_mul(entries_per_block)
        .ok_or(AontError::Overflow("entries per map block"))?;

    let num_map_blocks = blocks.div_ceil(per_map_block);
    let num_map_map_blocks = num_map_blocks.div_ceil(per_map_block);
    let num_pointer_blocks = num_map_map_blocks.div_ceil(pointers_per_pointer_block);
    let metadata_size = num_pointer_blocks
        .checked_add(1)
        .and_then(|n| n.checked_mul(replicas))
        .and_then(|n| n.checked_add(num_map_map_blocks))
        .and_then(|n| n.checked_add(num_map_blocks))
        .ok_or(AontError::Overflow("metadata size"))?;
    let effective_data_size = (u128::from(blocks) * u128::from(codeword.width()))
        .div_ceil(u128::from(codeword.data));
    let effective_data_size = u64::try_from(effective_data_size)
        .map_err(|_| AontError::Overflow("effective data size"))?;
    if metadata_size.checked_add(effective_data_size).is_none() {
        return Err(AontError::Overflow("instance size"));
    }
    let shares_per_block = config.block_size / codeword.data;

    let stats = MetadataStats {
        blocks,
        num_map_blocks,
        num_map_map_blocks,
        num_pointer_blocks,
        replicas,
        metadata_size,
        effective_data_size,
        shares_per_block,
    };

    debug!(
        codeword = %codeword,
        amplification = codeword.amplification_factor(),
        record_size,
        entries_per_block,
        map_blocks = num_map_blocks,
        map_map_blocks = num_map_map_blocks,
        pointer_blocks = num_pointer_blocks,
        metadata_size,
        overhead_percent = stats.overhead_percent(),
        effective_instance_size = stats.effective_instance_size(),
        "aont metadata layout"
    );

    Ok(stats)
}

/// Metadata plus encoded data for an instance, using the configured replicas.
pub fn total_instance_size(config: &AontConfig, blocks: u64, codeword: Codeword) -> AontResult<u64> {
    metadata_layout(config, blocks, codeword, config.metadata_replicas)
        .map(|stats| stats.effective_instance_size())
}

// =============================================================================
// Survival
// =============================================================================

/// `P(X <= k)` for `X ~ Binomial(n, p)`.
///
/// Terms are accumulated in log space so large `n` does not underflow the
/// leading `(1 - p)^n` factor before the sum is formed. When fewer terms lie
/// above `k` than below, the upper tail is summed instead and subtracted.
pub fn binomial_cdf(k: u64, n: u64, p: f64) -> AontResult<f64> {
    if !(0.0..=1.0).contains(&p) {
        return Err(AontError::InvalidOverwriteProbability(p));
    }
    if k >= n || p == 0.0 {
        return Ok(1.0);
    }
    if p == 1.0 {
        return Ok(0.0);
    }

    let ln_p = p.ln();
    let ln_q = (-p).ln_1p();
    let cdf = if n - k < k {
        // Terms X = n, n - 1, .., k + 1.
        let upper = sum_binomial_terms(n as f64 * ln_p, n - k, |j| {
            ((n - j) as f64).ln() - ((j + 1) as f64).ln() + ln_q - ln_p
        });
        1.0 - upper
    } else {
        // Terms X = 0, 1, .., k.
        sum_binomial_terms(n as f64 * ln_q, k + 1, |i| {
            ((n - i) as f64).ln() - ((i + 1) as f64).ln() + ln_p - ln_q
        })
    };
    Ok(cdf.clamp(0.0, 1.0))
}

/// Sum `terms` binomial probabilities starting at `exp(ln_first)`, each
/// next term scaled by `exp(ln_ratio(j))`.
///
/// The ratios decrease along either walk, so once one drops below one the
/// remainder is bounded by a geometric series and the walk stops when that
/// bound is below rounding.
fn sum_binomial_terms(ln_first: f64, terms: u64, ln_ratio: impl Fn(u64) -> f64) -> f64 {
    let mut ln_term = ln_first;
    let mut sum = ln_term.exp();
    for j in 0..terms.saturating_sub(1) {
        let step = ln_ratio(j);
        ln_term += step;
        let term = ln_term.exp();
        sum += term;
        if step < 0.0 {
            let r = step.exp();
            if term * r / (1.0 - r) <= sum * f64::EPSILON {
                break;
            }
        }
    }
    sum
}

/// Probability a codeword of `d` data and `m` parity shares survives one
/// epoch when each share is lost independently with probability `p`.
pub fn survival_probability_epoch(d: u64, m: u64, p: f64) -> AontResult<f64> {
    let width = m
        .checked_add(d)
        .ok_or(AontError::Overflow("codeword width"))?;
    binomial_cdf(m, width, p)
}

fn overwrite_probability(overwritten: f64, free: f64) -> AontResult<f64> {
    if free.is_nan() || free <= 0.0 {
        return Err(AontError::DivisionByZeroOverwriteRate);
    }
    let p = overwritten / free;
    if !(0.0..=1.0).contains(&p) {
        return Err(AontError::InvalidOverwriteProbability(p));
    }
    Ok(p)
}

/// Probability that an instance's metadata survives the configured horizon.
///
/// `overwritten / free` is the daily per-block overwrite probability.
pub fn metadata_alive_probability(
    config: &AontConfig,
    d: u64,
    m: u64,
    blocks: u64,
    overwritten: f64,
    free: f64,
) -> AontResult<f64> {
    let p = overwrite_probability(overwritten, free)?;
    let stats = metadata_layout(config, blocks, Codeword::new(d, m)?, config.metadata_replicas)?;
    let epoch = survival_probability_epoch(d, m, p)?;
    let exposure = stats.metadata_size as f64 * f64::from(config.num_days);
    let alive = epoch.powf(exposure);
    debug!(d, m, blocks, p, epoch, exposure, alive, "metadata alive probability");
    Ok(alive)
}

/// Probability that every block of an instance survives the configured horizon.
pub fn instance_alive_probability(
    config: &AontConfig,
    d: u64,
    m: u64,
    blocks: u64,
    overwritten: f64,
    free: f64,
) -> AontResult<f64> {
    let p = overwrite_probability(overwritten, free)?;
    let total = total_instance_size(config, blocks, Codeword::new(d, m)?)?;
    let epoch = survival_probability_epoch(d, m, p)?;
    let exposure = total as f64 * f64::from(config.num_days);
    let alive = epoch.powf(exposure);
    debug!(d, m, blocks, p, epoch, exposure, alive, "instance alive probability");
    Ok(alive)
}

// =============================================================================
// Unit Tests
// =============================================================================

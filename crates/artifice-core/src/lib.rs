#![forbid(unsafe_code)]

//! Artifice Core
//!
//! Analytical models for Artifice, a deniable hidden volume that lives in the
//! free space of a host filesystem.
//!
//! # Key Components
//!
//! - [`combinatorics`] - binomial coefficients and integer partitions
//! - [`aont`] - metadata overhead and bit-rot survival of AONT-RS instances
//! - [`chains`] - chain histograms, probability tables, and the exact
//!   uniform-write baseline
//!
//! Everything here is a pure computation over in-memory values. Randomized
//! operations take a caller-supplied [`rand::Rng`], so a seeded
//! `StdRng` reproduces every draw.

pub mod aont;
pub mod chains;
pub mod combinatorics;

pub use aont::{
    AontConfig, AontError, AontResult, Codeword, MetadataStats, binomial_cdf,
    instance_alive_probability, metadata_alive_probability, metadata_layout,
    survival_probability_epoch, total_instance_size,
};
pub use chains::{
    ChainError, ChainHistogram, ChainLength, ChainMatrix, ChainResult, ChainRow,
    ExactChainDistribution, build_chain_histogram, empirical_singleton_probability,
    exact_chain_probabilities, histogram_to_matrix, sample_random_writes,
};
pub use combinatorics::{
    LnFactorials, PRACTICAL_PARTITION_CEILING, Partition, Partitions, all_partitions,
    combinations, ln_combinations, partitions_of,
};

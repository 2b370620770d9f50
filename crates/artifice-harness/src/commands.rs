#![forbid(unsafe_code)]

//! Subcommands of the `artifice` binary.
//!
//! Every command takes `--flag value` pairs and produces a serializable
//! report; the binary prints it as pretty JSON on stdout.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use artifice_core::{
    AontConfig, ChainMatrix, Codeword, ExactChainDistribution, MetadataStats,
    build_chain_histogram, empirical_singleton_probability, exact_chain_probabilities,
    instance_alive_probability, metadata_alive_probability, metadata_layout,
    survival_probability_epoch,
};
use artifice_detect::{
    ArtificeScenario, ExperimentConfig, ExperimentReport, SamplerConfig, run_detection_experiment,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::info;

use crate::traces::{load_change_log, load_trace_dir, write_trace_csv};
use crate::{HarnessError, HarnessResult};

// ─────────────────────────────────────────────────────────────────────────────
// Flags
// ─────────────────────────────────────────────────────────────────────────────

/// `--name value` pairs. Each lookup consumes its flag so leftovers can be
/// reported by [`Flags::finish`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    values: BTreeMap<String, String>,
}

impl Flags {
    /// Collect pairs; a repeated flag keeps its last value.
    pub fn parse<I>(args: I) -> HarnessResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut values = BTreeMap::new();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let Some(name) = arg.strip_prefix("--") else {
                return Err(HarnessError::Usage(format!("unexpected argument {arg:?}")));
            };
            let value = args
                .next()
                .ok_or_else(|| HarnessError::Usage(format!("--{name} requires a value")))?;
            values.insert(name.to_owned(), value);
        }
        Ok(Self { values })
    }

    pub fn optional<T: FromStr>(&mut self, name: &str) -> HarnessResult<Option<T>> {
        self.values
            .remove(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| HarnessError::Usage(format!("invalid --{name} value {raw:?}")))
            })
            .transpose()
    }

    pub fn required<T: FromStr>(&mut self, name: &str) -> HarnessResult<T> {
        self.optional(name)?
            .ok_or_else(|| HarnessError::Usage(format!("missing --{name}")))
    }

    /// Comma-separated list.
    pub fn list<T: FromStr>(&mut self, name: &str) -> HarnessResult<Vec<T>> {
        let raw: String = self.required(name)?;
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<T>()
                    .map_err(|_| HarnessError::Usage(format!("invalid --{name} entry {s:?}")))
            })
            .collect()
    }

    /// Fail if any flag was never looked up.
    pub fn finish(self) -> HarnessResult<()> {
        match self.values.keys().next() {
            Some(name) => Err(HarnessError::Usage(format!("unknown flag --{name}"))),
            None => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command dispatch
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Overhead,
    Survival,
    Chains,
    Exact,
    Detect,
}

impl FromStr for Command {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overhead" => Ok(Self::Overhead),
            "survival" => Ok(Self::Survival),
            "chains" => Ok(Self::Chains),
            "exact" => Ok(Self::Exact),
            "detect" => Ok(Self::Detect),
            other => Err(HarnessError::Usage(format!("unknown command {other:?}"))),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Overhead => "overhead",
            Self::Survival => "survival",
            Self::Chains => "chains",
            Self::Exact => "exact",
            Self::Detect => "detect",
        };
        f.write_str(name)
    }
}

/// Run `command` and render its report as pretty JSON.
///
/// Flags the command never read are rejected after it runs.
pub fn run_command(command: Command, mut flags: Flags) -> HarnessResult<String> {
    let json = match command {
        Command::Overhead => render(&overhead(&mut flags)?, flags),
        Command::Survival => render(&survival(&mut flags)?, flags),
        Command::Chains => render(&chains(&mut flags)?, flags),
        Command::Exact => render(&exact(&mut flags)?, flags),
        Command::Detect => render(&detect(&mut flags)?, flags),
    }?;
    info!(%command, "command complete");
    Ok(json)
}

fn render<T: Serialize>(report: &T, flags: Flags) -> HarnessResult<String> {
    flags.finish()?;
    Ok(serde_json::to_string_pretty(report)?)
}

fn model_config(flags: &mut Flags) -> HarnessResult<AontConfig> {
    let mut config = AontConfig::default();
    if let Some(block_size) = flags.optional("block-size")? {
        config = config.with_block_size(block_size);
    }
    if let Some(checksum) = flags.optional("checksum-size")? {
        config = config.with_checksum_size(checksum);
    }
    if let Some(days) = flags.optional("days")? {
        config = config.with_num_days(days);
    }
    if let Some(replicas) = flags.optional("replicas")? {
        config = config.with_metadata_replicas(replicas);
    }
    Ok(config)
}

fn seeded_rng(flags: &mut Flags) -> HarnessResult<StdRng> {
    Ok(match flags.optional::<u64>("seed")? {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// overhead
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverheadReport {
    pub codeword: Codeword,
    pub stats: MetadataStats,
    pub overhead_percent: f64,
    pub effective_instance_size: u64,
}

/// `overhead --blocks N --data D --parity M [--replicas R] [--block-size B]
/// [--checksum-size C]`
pub fn overhead(flags: &mut Flags) -> HarnessResult<OverheadReport> {
    let config = model_config(flags)?;
    let blocks = flags.required("blocks")?;
    let codeword = Codeword::new(flags.required("data")?, flags.required("parity")?)?;
    let stats = metadata_layout(&config, blocks, codeword, config.metadata_replicas)?;
    Ok(OverheadReport {
        codeword,
        overhead_percent: stats.overhead_percent(),
        effective_instance_size: stats.effective_instance_size(),
        stats,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// survival
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurvivalReport {
    pub overwrite_probability: f64,
    pub epoch_survival: f64,
    pub metadata_alive: f64,
    pub instance_alive: f64,
    pub num_days: u32,
}

/// `survival --blocks N --data D --parity M --overwritten X --free F
/// [--days N] [--replicas R] [--block-size B] [--checksum-size C]`
pub fn survival(flags: &mut Flags) -> HarnessResult<SurvivalReport> {
    let config = model_config(flags)?;
    let blocks = flags.required("blocks")?;
    let d = flags.required("data")?;
    let m = flags.required("parity")?;
    let overwritten: f64 = flags.required("overwritten")?;
    let free: f64 = flags.required("free")?;

    let metadata_alive = metadata_alive_probability(&config, d, m, blocks, overwritten, free)?;
    let instance_alive = instance_alive_probability(&config, d, m, blocks, overwritten, free)?;
    let overwrite_probability = overwritten / free;
    Ok(SurvivalReport {
        overwrite_probability,
        epoch_survival: survival_probability_epoch(d, m, overwrite_probability)?,
        metadata_alive,
        instance_alive,
        num_days: config.num_days,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// chains
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainsReport {
    pub blocks: usize,
    pub total_changes: u64,
    pub total_chains: u64,
    pub matrix: ChainMatrix,
}

/// `chains --input <change-log> [--output <trace.csv>]`
pub fn chains(flags: &mut Flags) -> HarnessResult<ChainsReport> {
    let input: PathBuf = flags.required("input")?;
    let output: Option<PathBuf> = flags.optional("output")?;
    let changes = load_change_log(&input)?;
    let histogram = build_chain_histogram(changes.iter().copied());
    let matrix = ChainMatrix::from_histogram(&histogram)?;
    if let Some(path) = output {
        write_trace_csv(&matrix, std::fs::File::create(&path)?)?;
        info!(path = %path.display(), "wrote trace");
    }
    Ok(ChainsReport {
        blocks: changes.len(),
        total_changes: histogram.total_changes(),
        total_chains: histogram.total_chains(),
        matrix,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// exact
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExactReport {
    pub distribution: ExactChainDistribution,
    pub singletons_per_write: f64,
    /// Monte Carlo estimate, present when `--samples` is positive.
    pub empirical_singletons_per_write: Option<f64>,
}

/// `exact --disk N --writes K [--samples S] [--seed S]`
pub fn exact(flags: &mut Flags) -> HarnessResult<ExactReport> {
    let disk: usize = flags.required("disk")?;
    let writes: usize = flags.required("writes")?;
    let samples: usize = flags.optional("samples")?.unwrap_or(0);
    let mut rng = seeded_rng(flags)?;

    let distribution = exact_chain_probabilities(disk, writes)?;
    let empirical = if samples > 0 {
        Some(empirical_singleton_probability(disk, writes, samples, &mut rng)?)
    } else {
        None
    };
    Ok(ExactReport {
        singletons_per_write: distribution.singletons_per_write(),
        distribution,
        empirical_singletons_per_write: empirical,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// detect
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectReport {
    pub traces: usize,
    pub scenarios: Vec<ArtificeScenario>,
    pub report: ExperimentReport,
}

/// `detect --traces <dir> --sizes N1,N2,.. --data D --parity M --public P
/// [--clean-target T] [--repetitions R] [--train N] [--test N] [--runs R]
/// [--z Z] [--c C] [--seed S]`
pub fn detect(flags: &mut Flags) -> HarnessResult<DetectReport> {
    let model = model_config(flags)?;
    let dir: PathBuf = flags.required("traces")?;
    let sizes: Vec<u64> = flags.list("sizes")?;
    let codeword = Codeword::new(flags.required("data")?, flags.required("parity")?)?;
    let public_target: u64 = flags.required("public")?;

    let mut config = ExperimentConfig::default();
    if let Some(target) = flags.optional("clean-target")? {
        config = config.with_clean_target(target);
    }
    if let Some(repetitions) = flags.optional("repetitions")? {
        config = config.with_repetitions(repetitions);
    }
    let train = flags.optional("train")?;
    let test = flags.optional("test")?;
    if train.is_some() || test.is_some() {
        let train = train.unwrap_or(config.train_clean);
        let test = test.unwrap_or(config.test_clean);
        config = config.with_sizes(train, test);
    }
    if let Some(runs) = flags.optional("runs")? {
        config.sampler = SamplerConfig::default().with_runs(runs);
    }
    if let Some(z) = flags.optional("z")? {
        config.z = z;
    }
    if let Some(c) = flags.optional("c")? {
        config.logistic = config.logistic.with_c(c);
    }
    let mut rng = seeded_rng(flags)?;

    let traces = load_trace_dir(&dir)?;
    let scenarios = sizes
        .iter()
        .map(|&blocks| ArtificeScenario::for_instance(&model, blocks, codeword, public_target))
        .collect::<Result<Vec<_>, _>>()?;
    info!(traces = traces.len(), scenarios = scenarios.len(), "running detection");
    let report = run_detection_experiment(&traces, &scenarios, &config, &mut rng)?;
    Ok(DetectReport {
        traces: traces.len(),
        scenarios,
        report,
    })
}

#![forbid(unsafe_code)]

//! Artifice Harness
//!
//! File-system plumbing and the `artifice` command-line driver.
//!
//! - [`traces`] - discover and load chain-length traces and change logs
//! - [`logging`] - tracing subscriber setup for the binary
//! - [`commands`] - one function per subcommand, each returning JSON

use std::fmt;
use std::io;
use std::path::PathBuf;

use artifice_core::{AontError, ChainError};
use artifice_detect::DetectError;

pub mod commands;
pub mod logging;
pub mod traces;

pub use traces::{
    list_csv_files, load_change_log, load_trace_csv, load_trace_dir, parse_change_log,
    parse_trace_csv, write_trace_csv,
};

/// Errors raised by the harness.
#[derive(Debug)]
pub enum HarnessError {
    Io(io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
    /// A trace file failed validation.
    Trace { path: PathBuf, source: ChainError },
    /// A trace field is not a number.
    InvalidField { row: usize, field: String },
    /// A change-log line is not `0` or `1`.
    InvalidChangeLog { line: usize, value: String },
    Chain(ChainError),
    Model(AontError),
    Detect(DetectError),
    /// Bad command-line input.
    Usage(String),
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Csv(e) => write!(f, "CSV error: {e}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
            Self::Trace { path, source } => write!(f, "{}: {source}", path.display()),
            Self::InvalidField { row, field } => {
                write!(f, "row {row}: expected a number, found {field:?}")
            }
            Self::InvalidChangeLog { line, value } => {
                write!(f, "line {line}: expected 0 or 1, found {value:?}")
            }
            Self::Chain(e) => write!(f, "{e}"),
            Self::Model(e) => write!(f, "{e}"),
            Self::Detect(e) => write!(f, "{e}"),
            Self::Usage(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Csv(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Trace { source, .. } => Some(source),
            Self::Chain(e) => Some(e),
            Self::Model(e) => Some(e),
            Self::Detect(e) => Some(e),
            Self::InvalidField { .. } | Self::InvalidChangeLog { .. } | Self::Usage(_) => None,
        }
    }
}

impl From<io::Error> for HarnessError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for HarnessError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<ChainError> for HarnessError {
    fn from(e: ChainError) -> Self {
        Self::Chain(e)
    }
}

impl From<AontError> for HarnessError {
    fn from(e: AontError) -> Self {
        Self::Model(e)
    }
}

impl From<DetectError> for HarnessError {
    fn from(e: DetectError) -> Self {
        Self::Detect(e)
    }
}

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

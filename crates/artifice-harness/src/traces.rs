#![forbid(unsafe_code)]

//! Trace files on disk.
//!
//! A trace is a CSV table of `length,count,probability` rows, one per chain
//! length observed on a real disk. A header row is optional, and numbers may
//! be written in float notation (`1.000000000000000000e+00`). A change log
//! is one `0`/`1` value per line, one line per block.

use std::fs;
use std::io;
use std::path::Path;

use artifice_core::{ChainMatrix, ChainRow};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use tracing::{debug, warn};

use crate::{HarnessError, HarnessResult};

/// Sorted names (not paths) of the `.csv` files directly inside `dir`.
pub fn list_csv_files(dir: &Path) -> HarnessResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            warn!(dir = %dir.display(), "skipping non UTF-8 file name");
            continue;
        };
        if name.ends_with(".csv") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Parse a trace table from any reader.
pub fn parse_trace_csv<R: io::Read>(reader: R) -> HarnessResult<ChainMatrix> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        if i == 0 && is_header(&record) {
            continue;
        }
        let length = whole_field(&record, 0, i)?;
        let count = whole_field(&record, 1, i)?;
        let probability = float_field(&record, 2, i)?;
        rows.push(ChainRow {
            length: usize::try_from(length).map_err(|_| HarnessError::InvalidField {
                row: i,
                field: length.to_string(),
            })?,
            count,
            probability,
        });
    }
    Ok(ChainMatrix::from_rows(rows)?)
}

/// Load and validate one trace file.
pub fn load_trace_csv(path: &Path) -> HarnessResult<ChainMatrix> {
    let file = fs::File::open(path)?;
    let matrix = parse_trace_csv(io::BufReader::new(file)).map_err(|e| match e {
        HarnessError::Chain(source) => HarnessError::Trace {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;
    debug!(path = %path.display(), rows = matrix.rows().len(), "loaded trace");
    Ok(matrix)
}

/// Every trace in `dir`, in file-name order.
pub fn load_trace_dir(dir: &Path) -> HarnessResult<Vec<ChainMatrix>> {
    list_csv_files(dir)?
        .iter()
        .map(|name| load_trace_csv(&dir.join(name)))
        .collect()
}

/// Write a trace table with a header row.
pub fn write_trace_csv<W: io::Write>(matrix: &ChainMatrix, writer: W) -> HarnessResult<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record(["length", "count", "probability"])?;
    for row in matrix.rows() {
        writer.write_record([
            row.length.to_string(),
            row.count.to_string(),
            row.probability.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse a change log. Blank lines are skipped; a value counts as changed
/// when it equals one.
pub fn parse_change_log(text: &str) -> HarnessResult<Vec<bool>> {
    let mut changes = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let value = line.trim();
        if value.is_empty() {
            continue;
        }
        let parsed: f64 = value.parse().map_err(|_| HarnessError::InvalidChangeLog {
            line: i + 1,
            value: value.to_owned(),
        })?;
        changes.push(parsed == 1.0);
    }
    Ok(changes)
}

/// Load a change log from disk.
pub fn load_change_log(path: &Path) -> HarnessResult<Vec<bool>> {
    let changes = parse_change_log(&fs::read_to_string(path)?)?;
    debug!(path = %path.display(), blocks = changes.len(), "loaded change log");
    Ok(changes)
}

fn is_header(record: &StringRecord) -> bool {
    record
        .get(0)
        .is_some_and(|field| field.parse::<f64>().is_err())
}

fn float_field(record: &StringRecord, idx: usize, row: usize) -> HarnessResult<f64> {
    let field = record.get(idx).unwrap_or_default();
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| HarnessError::InvalidField {
            row,
            field: field.to_owned(),
        })
}

fn whole_field(record: &StringRecord, idx: usize, row: usize) -> HarnessResult<u64> {
    let value = float_field(record, idx, row)?;
    if value < 0.0 || value.fract() != 0.0 || value > u64::MAX as f64 {
        return Err(HarnessError::InvalidField {
            row,
            field: record.get(idx).unwrap_or_default().to_owned(),
        });
    }
    Ok(value as u64)
}

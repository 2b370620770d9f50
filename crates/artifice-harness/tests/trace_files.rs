//! File-backed tests for trace discovery and the subcommands.

use std::fs;

use artifice_harness::commands::{Command, Flags, chains, detect, run_command};
use artifice_harness::{HarnessError, list_csv_files, load_change_log, load_trace_csv, load_trace_dir};
use tempfile::TempDir;

const TRACE_A: &str = "1,30,0.3\n2,30,0.3\n5,40,0.4\n";
const TRACE_B: &str = "length,count,probability\n2,10,0.5\n3,10,0.5\n";

fn flags(args: &[&str]) -> Flags {
    Flags::parse(args.iter().map(|s| s.to_string())).unwrap()
}

fn trace_dir() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("b.csv"), TRACE_B).unwrap();
    fs::write(tmp.path().join("a.csv"), TRACE_A).unwrap();
    fs::write(tmp.path().join("notes.txt"), "not a trace").unwrap();
    fs::create_dir(tmp.path().join("nested")).unwrap();
    tmp
}

#[test]
fn csv_files_are_sorted_names() {
    let tmp = trace_dir();
    assert_eq!(list_csv_files(tmp.path()).unwrap(), vec!["a.csv", "b.csv"]);
}

#[test]
fn trace_dir_loads_in_name_order() {
    let tmp = trace_dir();
    let traces = load_trace_dir(tmp.path()).unwrap();
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[0].rows()[0].length, 1);
    assert_eq!(traces[1].rows()[0].length, 2);
}

#[test]
fn missing_directory_is_io_error() {
    let tmp = TempDir::new().unwrap();
    let err = list_csv_files(&tmp.path().join("absent")).unwrap_err();
    assert!(matches!(err, HarnessError::Io(_)));
}

#[test]
fn invalid_trace_names_its_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.csv");
    fs::write(&path, "3,1,0.5\n1,1,0.5\n").unwrap();
    let err = load_trace_csv(&path).unwrap_err();
    assert!(err.to_string().contains("bad.csv"), "{err}");
    assert!(matches!(err, HarnessError::Trace { .. }));
}

#[test]
fn chains_command_writes_a_loadable_trace() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("changes.txt");
    let out = tmp.path().join("trace.csv");
    fs::write(&log, "1\n1\n0\n1\n0\n0\n1\n1\n1\n").unwrap();
    assert_eq!(load_change_log(&log).unwrap().len(), 9);

    let mut f = flags(&[
        "--input",
        log.to_str().unwrap(),
        "--output",
        out.to_str().unwrap(),
    ]);
    let report = chains(&mut f).unwrap();
    assert_eq!(report.blocks, 9);
    assert_eq!(report.total_changes, 6);
    assert_eq!(report.total_chains, 3);

    let written = load_trace_csv(&out).unwrap();
    assert_eq!(written, report.matrix);
    let counts: Vec<u64> = written.rows().iter().map(|r| r.count).collect();
    assert_eq!(counts, vec![1, 1, 1]);
}

#[test]
fn detect_command_reports_every_size() {
    let tmp = trace_dir();
    let mut f = flags(&[
        "--traces",
        tmp.path().to_str().unwrap(),
        "--sizes",
        "1,64",
        "--data",
        "1",
        "--parity",
        "1",
        "--public",
        "300",
        "--clean-target",
        "300",
        "--repetitions",
        "2",
        "--train",
        "10",
        "--test",
        "5",
        "--seed",
        "5",
    ]);
    let result = detect(&mut f).unwrap();
    f.finish().unwrap();
    assert_eq!(result.traces, 2);
    assert_eq!(result.scenarios.len(), 2);
    assert_eq!(result.report.runs.len(), 2);
    assert_eq!(result.report.means.len(), 2);
    assert_eq!(result.report.means[0][0], 1.0);
    assert_eq!(result.report.means[1][0], 64.0);
}

#[test]
fn unknown_flags_are_rejected() {
    let err = run_command(
        Command::Exact,
        flags(&["--disk", "20", "--writes", "3", "--sed", "1"]),
    )
    .unwrap_err();
    assert!(matches!(err, HarnessError::Usage(msg) if msg.contains("sed")));
}

#[test]
fn run_command_emits_json() {
    let json = run_command(
        Command::Overhead,
        flags(&["--blocks", "262144", "--data", "1", "--parity", "4"]),
    )
    .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["stats"]["metadata_size"], 2080);
    assert_eq!(value["effective_instance_size"], 2080 + 1_310_720);
}

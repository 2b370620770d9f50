#![forbid(unsafe_code)]

use std::env;
use std::process::ExitCode;

use artifice_harness::HarnessError;
use artifice_harness::commands::{Command, Flags, run_command};
use artifice_harness::logging::{LogFormat, init_logging};

fn print_usage() {
    eprintln!(
        "Usage: artifice [--log-json] <command> [--flag value]...\n\
         \n\
         Commands:\n\
           overhead  --blocks N --data D --parity M [--replicas R] [--block-size B]\n\
           survival  --blocks N --data D --parity M --overwritten X --free F [--days N]\n\
           chains    --input <change-log> [--output <trace.csv>]\n\
           exact     --disk N --writes K [--samples S] [--seed S]\n\
           detect    --traces <dir> --sizes N1,N2 --data D --parity M --public P\n\
                     [--clean-target T] [--repetitions R] [--train N] [--test N] [--seed S]\n\
         \n\
         Log filter is read from ARTIFICE_LOG (default: warn).\n\
         \n\
         Example:\n\
           artifice overhead --blocks 262144 --data 1 --parity 4"
    );
}

fn run() -> Result<(), HarnessError> {
    let mut format = LogFormat::Text;
    let mut rest = Vec::new();
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--log-json" => format = LogFormat::Json,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            _ => rest.push(arg),
        }
    }
    init_logging(format);

    let mut rest = rest.into_iter();
    let command: Command = rest
        .next()
        .ok_or_else(|| HarnessError::Usage("missing command".to_string()))?
        .parse()?;
    let flags = Flags::parse(rest)?;
    let json = run_command(command, flags)?;
    println!("{json}");
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err, HarnessError::Usage(_)) {
                print_usage();
            }
            eprintln!("artifice error: {err}");
            ExitCode::FAILURE
        }
    }
}

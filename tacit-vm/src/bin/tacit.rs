//! Command-line entry point.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tacit_vm::{Outcome, Repl};
use tracing_subscriber::EnvFilter;

/// Tacit array-language interpreter.
#[derive(Debug, Parser)]
#[command(name = "tacit", version, about)]
struct Args {
    /// Worker threads for large kernels.
    #[arg(short = 'n', long = "workers", default_value_t = 1)]
    workers: usize,

    /// Script files executed in order, as if typed, before reading stdin.
    scripts: Vec<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut repl = Repl::new(args.workers);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for script in &args.scripts {
        match repl.load(script, &mut out) {
            Ok(Outcome::Continue) => {}
            Ok(Outcome::Quit) => return ExitCode::SUCCESS,
            Ok(Outcome::Fatal) => return ExitCode::FAILURE,
            Err(error) => {
                let _ = writeln!(io::stderr(), "io error: {error}");
                return ExitCode::FAILURE;
            }
        }
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                let _ = writeln!(io::stderr(), "io error: {error}");
                return ExitCode::FAILURE;
            }
        };
        match repl.line(&line, &mut out) {
            Ok(Outcome::Continue) => {}
            Ok(Outcome::Quit) => return ExitCode::SUCCESS,
            Ok(Outcome::Fatal) => return ExitCode::FAILURE,
            Err(error) => {
                let _ = writeln!(io::stderr(), "io error: {error}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

//! Thin CLI binary. Argument parsing, help text, and host-info
//! pretty-printing are out of scope (see spec §1) — this exists only so
//! the library is runnable and `tests/cli.rs` has something to invoke.

use std::process::ExitCode;

use calcprime::{run, CoreError, Mode, NullSink, RunOptions, RunOutcome, VecSink};
use clap::Parser;

fn main() -> ExitCode {
    env_logger::init();

    let options = RunOptions::parse();
    let spec = match options.into_run_spec() {
        Ok(spec) => spec,
        Err(err) => return report_error(&err),
    };

    let outcome = if matches!(spec.mode, Mode::Enumerate) {
        let mut sink = VecSink::default();
        run(&spec, &mut sink).map(|outcome| (outcome, Some(sink)))
    } else {
        let mut sink = NullSink::default();
        run(&spec, &mut sink).map(|outcome| (outcome, None))
    };

    match outcome {
        Ok((RunOutcome::Count(count), sink)) => {
            if let Some(sink) = sink {
                for prime in sink.all_primes() {
                    println!("{prime}");
                }
            } else {
                println!("{count}");
            }
            ExitCode::SUCCESS
        }
        Ok((RunOutcome::NthValue(Some(value)), _)) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Ok((RunOutcome::NthValue(None), _)) => {
            eprintln!("no such prime in range");
            ExitCode::FAILURE
        }
        Err(err) => report_error(&err),
    }
}

fn report_error(err: &CoreError) -> ExitCode {
    eprintln!("calcprime: {err}");
    ExitCode::FAILURE
}

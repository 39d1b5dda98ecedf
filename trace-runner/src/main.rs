//! # trace-runner - Main Entry Point
//!
//! Parses arguments, runs pre-flight checks and one trace. A failure is
//! printed once to stdout. The exit status stays 0 unless `--strict-exit` is
//! given, so a tracer error does not mark the surrounding job as failed.

use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::Path;

use tracerunner::cli::Args;
use tracerunner::domain::{TraceError, ValidationError};
use tracerunner::preflight::run_preflight_checks;
use tracerunner::process_lookup::PROC_ROOT;
use tracerunner::runner::TraceRunner;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    let args = Args::parse();

    std::process::exit(match run(&args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            println!("{}", error_line(&e));
            if args.strict_exit {
                exit_code_for(&e)
            } else {
                EXIT_SUCCESS
            }
        }
    });
}

/// The error and its causes on one line
fn error_line(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let is_validation = err.downcast_ref::<ValidationError>().is_some()
        || matches!(err.downcast_ref::<TraceError>(), Some(TraceError::Validation(_)));
    if is_validation {
        return EXIT_USAGE;
    }

    let msg = error_line(err).to_lowercase();
    if msg.contains("permission denied") {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run(args: &Args) -> Result<()> {
    let request = args.to_request()?;
    let config = args.runner_config();

    if !args.skip_preflight {
        run_preflight_checks(&request, &config, Path::new(PROC_ROOT))?;
    }

    let summary = TraceRunner::new(config).run(&request).await?;

    if let Some(pid) = summary.resolved {
        info!("Traced container process {pid}");
    }
    if let Some(artifact) = summary.artifact {
        match artifact.path {
            Some(path) => info!("Flame graph saved to {} ({} bytes)", path.display(), artifact.bytes),
            None => info!("Flame graph written to stdout ({} bytes)", artifact.bytes),
        }
    }
    Ok(())
}

//! `index-clone` binary.
//!
//! Copies index definitions from a source MongoDB database to a destination database,
//! reports progress on stderr and prints a summary on stdout.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind as ClapErrorKind;
use index_clone::types::ReconciliationSummary;
use index_clone_config::shared::CloneConfig;
use index_clone_telemetry::tracing::init_tracing;

use crate::args::Args;
use crate::config::load_clone_config;
use crate::core::clone_indexes;
use crate::error::{CliError, CliResult, OTHER_FAILURE_EXIT_CODE, summary_exit_code};
use crate::reporter::{TerminalReporter, render_summary_table, render_totals};

mod args;
mod config;
mod core;
mod error;
mod reporter;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(OTHER_FAILURE_EXIT_CODE),
            };
        }
    };

    // Load the run config before anything else so that mistakes surface immediately.
    let config = match load_clone_config(&args) {
        Ok(config) => config,
        Err(err) => return report_failure(err),
    };

    let _log_flusher = match init_tracing(env!("CARGO_BIN_NAME"), args.log_directive()) {
        Ok(flusher) => flusher,
        Err(err) => return report_failure(CliError::config(err)),
    };

    match run(&args, config) {
        Ok(summary) => summary_exit_code(&summary).map_or(ExitCode::SUCCESS, ExitCode::from),
        Err(err) => report_failure(err),
    }
}

/// Starts the runtime, runs the clone and prints the summary to stdout.
fn run(args: &Args, config: CloneConfig) -> CliResult<ReconciliationSummary> {
    let reporter = if args.json {
        TerminalReporter::hidden(config.reconcile.dry_run)
    } else {
        TerminalReporter::new(config.reconcile.dry_run)
    };

    let summary = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(clone_indexes(config, reporter))?;

    let mut stdout = std::io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut stdout, &summary)?;
        writeln!(stdout)?;
    } else {
        write!(stdout, "{}", render_summary_table(&summary))?;
        write!(stdout, "{}", render_totals(&summary))?;
    }
    stdout.flush()?;

    Ok(summary)
}

fn report_failure(err: CliError) -> ExitCode {
    eprint!("{}", err.render_report());
    ExitCode::from(err.exit_code())
}

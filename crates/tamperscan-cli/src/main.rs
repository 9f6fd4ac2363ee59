//! Tamperscan CLI - Command-line utility that audits container images for
//! tampering with RPM-installed files.

mod artifacts;
mod cli;
mod commands;
mod error;
mod output;
mod progress;

use clap::Parser;
use commands::CommandStatus;
use progress::CliProgress;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Disallowed modifications were found.
const EXIT_TAMPERED: u8 = 2;

/// Wrong invocation.
const EXIT_USAGE: u8 = 10;

/// The audit could not be completed.
const EXIT_FAILURE: u8 = 1;

fn main() -> ExitCode {
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(cli.verbose);

    let formatter = output::create_formatter(cli.json, cli.verbose, cli.quiet);
    let show_progress = !cli.quiet && !cli.json && CliProgress::should_show();

    let result = match &cli.command {
        cli::Commands::Audit(args) => commands::audit::execute(args, &*formatter, show_progress),
        cli::Commands::Baseline(args) => commands::baseline::execute(args, &*formatter),
        cli::Commands::Changes(args) => commands::changes::execute(args, &*formatter),
        cli::Commands::Completion(args) => {
            commands::completion::execute(args.shell);
            Ok(CommandStatus::Clean)
        }
    };

    match result {
        Ok(CommandStatus::Clean) => ExitCode::SUCCESS,
        Ok(CommandStatus::Tampered) => ExitCode::from(EXIT_TAMPERED),
        Err(err) => {
            formatter.format_error(&err);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the level picked by `-v`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

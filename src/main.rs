//! Binary entry point for the `vgsweep` CLI.

mod cli;

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use vgsweep::{
    ConfigError, PrismConfig, RunContext, StdinConfirmation, SweepError, SweepMode,
    SweepOrchestrator, SweepOutcome,
};

use cli::Cli;

/// Exit status of a completed run that recorded per-target failures while
/// strict mode is on.
const TARGET_FAILURE_EXIT: i32 = 3;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid arguments: {0}")]
    Usage(String),
    #[error("{0}")]
    Sweep(#[from] SweepError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let exit_code = match dispatch(&cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("vgsweep=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vgsweep=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

async fn dispatch(cli: &Cli) -> Result<i32, CliError> {
    let config = PrismConfig::load_without_cli_args()?;
    let context = build_context(cli, &config)?;
    let client = config.client()?;

    let orchestrator = SweepOrchestrator::new(&client, &context);
    let outcome = orchestrator
        .run(&mut StdinConfirmation, &mut io::stdout())
        .await?;
    Ok(exit_code(&outcome, context.fail_on_target_errors))
}

fn build_context(cli: &Cli, config: &PrismConfig) -> Result<RunContext, CliError> {
    let mode = match (cli.cluster.as_deref().map(str::trim), cli.volumes.as_deref()) {
        (Some(""), _) => {
            return Err(CliError::Usage(String::from("--cluster must not be empty")));
        }
        (Some(cluster), _) if cli.detach_only => SweepMode::DetachOnly {
            cluster: cluster.to_owned(),
            worklist: Utf8PathBuf::from(cli.worklist.as_deref().unwrap_or(&config.worklist_path)),
        },
        (Some(cluster), _) => SweepMode::DetachAndDelete {
            cluster: cluster.to_owned(),
        },
        (None, Some(path)) => SweepMode::DeleteFromFile {
            path: Utf8PathBuf::from(path),
        },
        (None, None) => {
            return Err(CliError::Usage(String::from(
                "one of --cluster or --volumes is required",
            )));
        }
    };

    Ok(RunContext {
        mode,
        settings: config.settings()?,
        fail_on_target_errors: cli.strict || config.fail_on_target_errors,
    })
}

fn exit_code(outcome: &SweepOutcome, fail_on_target_errors: bool) -> i32 {
    match outcome {
        SweepOutcome::Completed(summary) if fail_on_target_errors && summary.has_failures() => {
            TARGET_FAILURE_EXIT
        }
        SweepOutcome::NothingToDo(_) | SweepOutcome::Cancelled | SweepOutcome::Completed(_) => 0,
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "vgsweep: {err}").ok();
}

#[cfg(test)]
mod main_tests;

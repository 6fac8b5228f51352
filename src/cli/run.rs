//! CLI entry point and dispatch logic
//!
//! This module owns the `run()` function which:
//! - Parses CLI arguments
//! - Builds CliArgs and discovers Config
//! - Creates the tokio runtime
//! - Dispatches to command handlers
//! - Handles all error output

use clap::Parser;

use super::args::{Cli, Commands};
use super::commands::{self, ResumeRequest};

use crate::{Config, ConfigError, ExitCode, HldError, OrchestratorError, render_for_user};
use hldflow_utils::logging::init_tracing;

/// Main CLI execution function.
///
/// This function handles ALL output including errors. It returns `Result<(), ExitCode>`:
/// - On success: returns `Ok(())` after printing any output
/// - On a degraded or aborted run, or an error: returns `Err(ExitCode)`
///
/// main.rs only calls `std::process::exit(code.as_i32())` on error - it does NOT print.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    let cli_args = cli.config_args();

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", render_for_user(&err));
            return Err(ExitCode::CLI_ARGS);
        }
    };

    // A second subscriber (e.g. under a test harness) is not an error.
    let _ = init_tracing(config.verbose());

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let operation = match &cli.command {
        Commands::Run { .. } => "run",
        Commands::Resume { .. } => "resume",
        Commands::Status { .. } => "status",
        Commands::Stages { .. } => "stages",
    };
    tracing::debug!(operation, config = ?config.config_path, "dispatching command");

    let result = rt.block_on(async {
        match &cli.command {
            Commands::Run {
                input,
                state_out,
                json,
                ..
            } => commands::execute_run_command(input, state_out.as_deref(), *json, &config).await,
            Commands::Resume {
                state,
                reset,
                retry,
                state_out,
                json,
                ..
            } => {
                let request = ResumeRequest {
                    reset,
                    retry,
                    state_out: state_out.as_deref(),
                    json: *json,
                };
                commands::execute_resume_command(state, request, &config).await
            }
            Commands::Status { state, json } => commands::execute_status_command(state, *json),
            Commands::Stages { json, .. } => commands::execute_stages_command(*json, &config),
        }
    });

    match result {
        Ok(code) if code.is_success() => Ok(()),
        Ok(code) => Err(code),
        Err(error) => Err(report_error(&error, operation)),
    }
}

/// Print an error the way its type prefers and pick the exit code.
fn report_error(error: &anyhow::Error, operation: &str) -> ExitCode {
    if let Some(err) = error.downcast_ref::<OrchestratorError>() {
        eprintln!("{}", err.display_for_user());
        return err.to_exit_code();
    }
    if let Some(err) = error.downcast_ref::<HldError>() {
        eprintln!("{}", err.display_for_user());
        return err.to_exit_code();
    }
    if let Some(err) = error.downcast_ref::<ConfigError>() {
        eprintln!("{}", render_for_user(err));
        return ExitCode::CLI_ARGS;
    }

    eprintln!("✗ Unexpected error during {operation}: {error:#}");
    eprintln!("\n  General troubleshooting:");
    eprintln!("    - Run with --verbose for more detailed output");
    eprintln!("    - Use --dry-run to check the pipeline without the analyzer");
    ExitCode::INTERNAL
}

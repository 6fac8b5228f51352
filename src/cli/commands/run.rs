//! Run command implementation
//!
//! Handles `hldflow run <PDF>`: builds the pipeline from configuration, runs
//! it over a fresh state, and reports the outcome.

use anyhow::Result;
use camino::Utf8Path;
use std::path::Path;

use super::common::{finish, persist_outcome};

use crate::orchestrator::run_options;
use crate::{Config, ExitCode, Orchestrator};

/// Execute the run command
pub async fn execute_run_command(
    input: &Path,
    state_out: Option<&Utf8Path>,
    json: bool,
    config: &Config,
) -> Result<ExitCode> {
    let orchestrator = Orchestrator::from_config(config)?;
    let strategy = config.strategy();

    if !json {
        println!(
            "Running {} stages ({strategy}{}) on {}",
            orchestrator.registry().len(),
            if orchestrator.config().dry_run {
                ", dry run"
            } else {
                ""
            },
            input.display()
        );
    }

    let result = orchestrator
        .run(input, run_options(config), strategy)
        .await;
    let state = persist_outcome(result, state_out)?;

    finish(&orchestrator.report(&state), json)
}

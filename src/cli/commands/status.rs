//! Status command implementation
//!
//! Handles `hldflow status <STATE>` and `hldflow status <STATE> --json`.

use anyhow::Result;
use camino::Utf8Path;

use hldflow_engine::stages::dry_run_registry;

use super::common::print_report;
use super::json_emit::emit_report_json;

use crate::{ExitCode, HldError, RunReport, state_store};

/// Execute the status command
///
/// Always exits with success when the state file is readable; the outcome
/// is part of the report, not the exit code.
pub fn execute_status_command(state_path: &Utf8Path, json: bool) -> Result<ExitCode> {
    let state = state_store::load(state_path)?;

    let registry = dry_run_registry().map_err(HldError::from)?;
    let report = RunReport::from_state(&state, &registry);

    if json {
        println!("{}", emit_report_json(&report)?);
    } else {
        print_report(&report);
        if report.pending > 0 {
            println!("\nResume with: hldflow resume {state_path}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

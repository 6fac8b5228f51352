//! Common helper functions used across CLI commands
//!
//! Report rendering, state persistence, and validation of stage names given
//! on the command line.

use anyhow::Result;
use camino::Utf8Path;

use super::json_emit::emit_report_json;

use crate::{
    ConfigError, ExitCode, Orchestrator, OrchestratorError, PipelineState, RunReport, StageStatus,
    state_store,
};

/// Print a report (JSON or human-readable) and return its exit code.
pub fn finish(report: &RunReport, json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", emit_report_json(report)?);
    } else {
        print_report(report);
    }
    Ok(report.exit_code())
}

/// Human-readable report
pub fn print_report(report: &RunReport) {
    println!("Run: {}", report.identity);
    if let Some(strategy) = report.strategy {
        println!("  Strategy: {strategy}");
    }
    println!("  Outcome: {}", report.outcome);

    println!("  Stages:");
    for row in &report.stages {
        let glyph = match row.status {
            StageStatus::Completed => "✓",
            StageStatus::Failed => "✗",
            StageStatus::Skipped => "-",
            StageStatus::Pending | StageStatus::Running => "·",
        };
        let mut line = format!("    {glyph} {:<20} {}", row.name, row.status);
        if let Some(ms) = row.duration_ms {
            line.push_str(&format!(" ({ms}ms)"));
        }
        if !row.critical {
            line.push_str(" [optional]");
        }
        println!("{line}");
        if let Some(message) = &row.message {
            println!("        {message}");
        }
    }

    println!(
        "  Summary: {} completed, {} failed, {} skipped, {} pending",
        report.completed, report.failed, report.skipped, report.pending
    );
    if let Some(ms) = report.duration_ms {
        println!("  Duration: {ms}ms");
    }

    if !report.warnings.is_empty() {
        println!("  Warnings:");
        for warning in &report.warnings {
            println!("    ⚠ {warning}");
        }
    }
}

/// Persist whatever state a run leaves behind.
///
/// A run that hits its deadline still writes the partial state so it can be
/// resumed; the deadline error is returned afterwards.
pub fn persist_outcome(
    result: Result<PipelineState, OrchestratorError>,
    state_out: Option<&Utf8Path>,
) -> Result<PipelineState> {
    if let (Err(OrchestratorError::RunTimedOut { state, .. }), Some(path)) = (&result, state_out) {
        state_store::save(state, path)?;
        eprintln!("Partial state written to {path}");
    }

    let state = result?;
    if let Some(path) = state_out {
        state_store::save(&state, path)?;
        tracing::info!(path = %path, "state written");
    }
    Ok(state)
}

/// Reject stage names the orchestrator does not know about.
pub fn ensure_known_stages(
    orchestrator: &Orchestrator,
    flag: &str,
    stages: &[String],
) -> Result<(), ConfigError> {
    match stages
        .iter()
        .find(|stage| !orchestrator.registry().contains(stage))
    {
        Some(unknown) => Err(ConfigError::InvalidValue {
            key: flag.to_string(),
            value: format!(
                "unknown stage '{unknown}' (known: {})",
                orchestrator.registry().names().join(", ")
            ),
        }),
        None => Ok(()),
    }
}

//! JSON emit functions for CLI output
//!
//! Every JSON document the CLI prints goes through JCS (RFC 8785) so output
//! is byte-stable for identical inputs.

use anyhow::{Context, Result};

use crate::{RunReport, WorkflowInfo, emit_jcs};

/// Emit a run or status report as canonical JSON
pub fn emit_report_json(report: &RunReport) -> Result<String> {
    emit_jcs(report).context("Failed to emit report JSON")
}

/// Emit workflow information as canonical JSON
pub fn emit_workflow_json(info: &WorkflowInfo) -> Result<String> {
    emit_jcs(info).context("Failed to emit workflow JSON")
}

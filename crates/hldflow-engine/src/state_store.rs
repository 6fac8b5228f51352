//! Persisting pipeline states between runs.
//!
//! States are written as canonical JSON (JCS) through an atomic rename, so a
//! reader never observes a half-written file and identical states produce
//! identical bytes.

use camino::Utf8Path;

use hldflow_stage_api::{PipelineState, STATE_SCHEMA_VERSION, StageStatus};
use hldflow_utils::atomic_write::write_file_atomic;
use hldflow_utils::canonicalization::emit_jcs;
use hldflow_utils::error::HldError;

/// # Errors
///
/// [`HldError::Persistence`] if serialization or the write fails.
pub fn save(state: &PipelineState, path: &Utf8Path) -> Result<(), HldError> {
    let persistence = |reason: String| HldError::Persistence {
        path: path.to_string(),
        reason,
    };

    let mut json = emit_jcs(state).map_err(|e| persistence(format!("{e:#}")))?;
    json.push('\n');
    write_file_atomic(path, &json).map_err(|e| persistence(format!("{e:#}")))?;

    tracing::debug!(path = %path, identity = %state.identity(), "saved pipeline state");
    Ok(())
}

/// # Errors
///
/// [`HldError::Persistence`] for unreadable or malformed files, for states
/// written by a different schema version, and for states whose results
/// disagree with their stage statuses.
pub fn load(path: &Utf8Path) -> Result<PipelineState, HldError> {
    let persistence = |reason: String| HldError::Persistence {
        path: path.to_string(),
        reason,
    };

    let text = std::fs::read_to_string(path).map_err(|e| persistence(e.to_string()))?;
    let state: PipelineState =
        serde_json::from_str(&text).map_err(|e| persistence(format!("invalid state: {e}")))?;

    if state.schema_version() != STATE_SCHEMA_VERSION {
        return Err(persistence(format!(
            "unsupported schema version {} (expected {STATE_SCHEMA_VERSION})",
            state.schema_version()
        )));
    }
    check_results_match_status(&state).map_err(persistence)?;
    Ok(state)
}

/// A stage has a result exactly when it is completed.
fn check_results_match_status(state: &PipelineState) -> Result<(), String> {
    if let Some(stage) = state
        .results()
        .keys()
        .find(|stage| state.status(stage).is_none())
    {
        return Err(format!("result for unknown stage '{stage}'"));
    }
    for (stage, status) in state.stage_statuses() {
        let completed = *status == StageStatus::Completed;
        let has_result = state.result(stage).is_some();
        if completed != has_result {
            return Err(if has_result {
                format!("stage '{stage}' has a result but is {status}")
            } else {
                format!("stage '{stage}' is completed without a result")
            });
        }
    }
    Ok(())
}

use serde::Serialize;
use std::fmt;

use hldflow_stage_api::{CriticalityLookup, ErrorEntry, PipelineState, StageStatus};
use hldflow_utils::exit_codes::ExitCode;
use hldflow_utils::types::StrategyKind;

use crate::registry::StageRegistry;

/// Run-level verdict derived from a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every stage completed.
    Succeeded,
    /// No critical failure, but some stage did not complete.
    Degraded,
    /// A critical stage failed.
    Aborted { stage: String },
}

impl RunOutcome {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Succeeded => ExitCode::SUCCESS,
            Self::Degraded => ExitCode::DEGRADED,
            Self::Aborted { .. } => ExitCode::ABORTED,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Degraded => write!(f, "degraded"),
            Self::Aborted { stage } => write!(f, "aborted at {stage}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRow {
    pub name: String,
    pub status: StageStatus,
    pub critical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Summary of a state for display and exit-code selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub stages: Vec<StageRow>,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    pub errors: Vec<ErrorEntry>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl RunReport {
    /// Rows follow registration order; stages in the state but not in the
    /// registry are appended after them.
    #[must_use]
    pub fn from_state(state: &PipelineState, registry: &StageRegistry) -> Self {
        let mut names: Vec<&str> = registry.names();
        for name in state.stage_statuses().keys() {
            if !registry.contains(name) {
                names.push(name.as_str());
            }
        }

        let stages: Vec<StageRow> = names
            .into_iter()
            .filter_map(|name| {
                let status = state.status(name)?;
                let detail = state.stage_detail(name);
                Some(StageRow {
                    name: name.to_string(),
                    status,
                    critical: CriticalityLookup::is_critical(registry, name),
                    duration_ms: detail.and_then(|d| d.duration_ms),
                    message: detail
                        .filter(|_| matches!(status, StageStatus::Failed | StageStatus::Skipped))
                        .map(|d| d.message.clone()),
                })
            })
            .collect();

        let count = |wanted: StageStatus| stages.iter().filter(|row| row.status == wanted).count();
        let completed = count(StageStatus::Completed);
        let failed = count(StageStatus::Failed);
        let skipped = count(StageStatus::Skipped);
        let pending = count(StageStatus::Pending) + count(StageStatus::Running);

        let outcome = match state.first_critical_failure(registry) {
            Some(stage) => RunOutcome::Aborted {
                stage: stage.to_string(),
            },
            None if completed == stages.len() => RunOutcome::Succeeded,
            None => RunOutcome::Degraded,
        };

        Self {
            identity: state.identity().to_string(),
            strategy: state.strategy(),
            outcome,
            stages,
            completed,
            failed,
            skipped,
            pending,
            errors: state.errors().to_vec(),
            warnings: state.warnings().to_vec(),
            duration_ms: state.duration().map(|d| d.num_milliseconds()),
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        self.outcome.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::DryRunStage;
    use hldflow_stage_api::{RunOptions, StageDescriptor};
    use serde_json::json;

    fn registry() -> StageRegistry {
        let mut registry = StageRegistry::new();
        registry
            .register(DryRunStage::new(StageDescriptor::new("extract", "")))
            .unwrap();
        registry
            .register(DryRunStage::new(
                StageDescriptor::new("auth", "").non_critical().depends_on(["extract"]),
            ))
            .unwrap();
        registry
            .register(DryRunStage::new(
                StageDescriptor::new("domain", "").depends_on(["auth"]),
            ))
            .unwrap();
        registry
    }

    fn state(registry: &StageRegistry) -> PipelineState {
        let mut state = PipelineState::new("spec.pdf", RunOptions::default()).unwrap();
        state.initialize_stages(registry.names());
        state
    }

    fn settle(state: &mut PipelineState, stage: &str, ok: bool) {
        state.mark_running(stage).unwrap();
        if ok {
            state.mark_completed(stage, json!({})).unwrap();
        } else {
            state.mark_failed(stage, format!("{stage} broke")).unwrap();
        }
    }

    #[test]
    fn test_all_completed_succeeds() {
        let registry = registry();
        let mut state = state(&registry);
        for stage in ["extract", "auth", "domain"] {
            settle(&mut state, stage, true);
        }
        let report = RunReport::from_state(&state, &registry);
        assert_eq!(report.outcome, RunOutcome::Succeeded);
        assert_eq!(report.exit_code(), ExitCode::SUCCESS);
        assert_eq!(report.completed, 3);
    }

    #[test]
    fn test_non_critical_failure_degrades() {
        let registry = registry();
        let mut state = state(&registry);
        settle(&mut state, "extract", true);
        settle(&mut state, "auth", false);
        settle(&mut state, "domain", true);

        let report = RunReport::from_state(&state, &registry);
        assert_eq!(report.outcome, RunOutcome::Degraded);
        assert_eq!(report.exit_code(), ExitCode::DEGRADED);
        assert_eq!(report.failed, 1);
        assert_eq!(report.stages[1].message.as_deref(), Some("auth broke"));
        assert!(!report.stages[1].critical);
    }

    #[test]
    fn test_critical_failure_aborts() {
        let registry = registry();
        let mut state = state(&registry);
        settle(&mut state, "extract", false);

        let report = RunReport::from_state(&state, &registry);
        assert_eq!(
            report.outcome,
            RunOutcome::Aborted {
                stage: "extract".to_string()
            }
        );
        assert_eq!(report.pending, 2);
        assert_eq!(report.exit_code(), ExitCode::ABORTED);
    }

    #[test]
    fn test_json_shape() {
        let registry = registry();
        let state = state(&registry);
        let value = serde_json::to_value(RunReport::from_state(&state, &registry)).unwrap();
        assert_eq!(value["outcome"], "degraded");
        assert_eq!(value["stages"][0]["status"], "pending");
        assert!(value.get("duration_ms").is_none());
    }
}

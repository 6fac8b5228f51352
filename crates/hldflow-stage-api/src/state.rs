use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use hldflow_utils::error::{InputError, StateError};
use hldflow_utils::identity::identity_from_path;
use hldflow_utils::types::{ImageFormat, Renderer, StageStatus, StrategyKind, Theme};

/// Version of the persisted state layout.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Per-run options, resolved once when the state is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    pub render_images: bool,
    pub image_format: ImageFormat,
    pub renderer: Renderer,
    pub theme: Theme,
    pub save_sources: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            render_images: true,
            image_format: ImageFormat::default(),
            renderer: Renderer::default(),
            theme: Theme::default(),
            save_sources: false,
        }
    }
}

/// One entry of the append-only error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub stage: String,
    pub message: String,
}

/// Diagnostics recorded with each status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDetail {
    pub message: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Answers whether a stage's failure aborts the run.
///
/// Criticality belongs to the stage definitions, not to the state, so state
/// queries that need it take a lookup.
pub trait CriticalityLookup {
    fn is_critical(&self, stage: &str) -> bool;
}

impl<F> CriticalityLookup for F
where
    F: Fn(&str) -> bool,
{
    fn is_critical(&self, stage: &str) -> bool {
        self(stage)
    }
}

/// The single record threaded through a run.
///
/// Invariants maintained by the mutators:
/// - `results` has an entry for a stage iff that stage is `completed`
/// - `errors` is append-only
/// - a `failed` stage only runs again after [`reset_stage`](Self::reset_stage)
///   or [`request_retry`](Self::request_retry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    schema_version: u32,
    identity: String,
    input: PathBuf,
    configuration: RunOptions,
    stage_status: BTreeMap<String, StageStatus>,
    results: BTreeMap<String, Value>,
    errors: Vec<ErrorEntry>,
    warnings: Vec<String>,
    #[serde(default)]
    stage_details: BTreeMap<String, StageDetail>,
    #[serde(default)]
    retry_requests: BTreeSet<String>,
    #[serde(default)]
    strategy: Option<StrategyKind>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    /// Create a state for `input`, deriving the identity from its file stem.
    ///
    /// No stages are registered yet; see [`initialize_stages`](Self::initialize_stages).
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] when no usable identity can be derived.
    pub fn new(input: impl Into<PathBuf>, configuration: RunOptions) -> Result<Self, InputError> {
        let input = input.into();
        let identity = identity_from_path(&input)?.ok_or_else(|| InputError::NoFileStem {
            path: input.clone(),
        })?;

        Ok(Self {
            schema_version: STATE_SCHEMA_VERSION,
            identity,
            input,
            configuration,
            stage_status: BTreeMap::new(),
            results: BTreeMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            stage_details: BTreeMap::new(),
            retry_requests: BTreeSet::new(),
            strategy: None,
            started_at: None,
            completed_at: None,
        })
    }

    /// Insert a `pending` entry for each name that has none. Existing entries
    /// are left alone so a resumed state keeps its history.
    pub fn initialize_stages<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.stage_status
                .entry(name.to_string())
                .or_insert(StageStatus::Pending);
        }
    }

    /// Prepare the state for a new run.
    ///
    /// Timestamps are refreshed and `skipped` stages go back to `pending`: a
    /// skip is decided per run from the statuses of upstream stages.
    ///
    /// # Errors
    ///
    /// [`StateError::LeftRunning`] if an earlier run was interrupted while a
    /// stage was running; that stage must be reset first.
    pub fn begin_run(&mut self, strategy: StrategyKind) -> Result<(), StateError> {
        if let Some(stage) = self.stages_with(StageStatus::Running).next() {
            return Err(StateError::LeftRunning {
                stage: stage.to_string(),
            });
        }

        let now = Utc::now();
        for (name, status) in &mut self.stage_status {
            if *status == StageStatus::Skipped {
                *status = StageStatus::Pending;
                self.stage_details.insert(
                    name.clone(),
                    StageDetail {
                        message: "re-evaluating skip".to_string(),
                        updated_at: now,
                        duration_ms: None,
                    },
                );
            }
        }

        self.strategy = Some(strategy);
        self.started_at = Some(now);
        self.completed_at = None;
        Ok(())
    }

    /// Stamp the end of the run.
    pub fn finish_run(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// `pending` -> `running`, or `failed` -> `running` when a retry was requested.
    ///
    /// # Errors
    ///
    /// [`StateError`] for unknown stages and disallowed transitions.
    pub fn mark_running(&mut self, stage: &str) -> Result<(), StateError> {
        let current = self.current(stage)?;
        let allowed = current == StageStatus::Pending
            || (current == StageStatus::Failed && self.retry_requests.contains(stage));
        if !allowed {
            return Err(Self::invalid(stage, current, StageStatus::Running));
        }

        self.retry_requests.remove(stage);
        self.set(stage, StageStatus::Running, "running");
        Ok(())
    }

    /// `running` -> `completed`, storing the stage's result.
    ///
    /// # Errors
    ///
    /// [`StateError`] unless the stage is `running`.
    pub fn mark_completed(&mut self, stage: &str, result: Value) -> Result<(), StateError> {
        self.require(stage, StageStatus::Running, StageStatus::Completed)?;
        self.results.insert(stage.to_string(), result);
        self.set(stage, StageStatus::Completed, "completed");
        Ok(())
    }

    /// `running` -> `failed`, appending to the error log.
    ///
    /// # Errors
    ///
    /// [`StateError`] unless the stage is `running`.
    pub fn mark_failed(&mut self, stage: &str, error: impl Into<String>) -> Result<(), StateError> {
        self.require(stage, StageStatus::Running, StageStatus::Failed)?;
        let message = error.into();
        self.errors.push(ErrorEntry {
            stage: stage.to_string(),
            message: message.clone(),
        });
        self.set(stage, StageStatus::Failed, message);
        Ok(())
    }

    /// `pending` -> `skipped`.
    ///
    /// # Errors
    ///
    /// [`StateError`] unless the stage is `pending`.
    pub fn mark_skipped(&mut self, stage: &str, reason: impl Into<String>) -> Result<(), StateError> {
        self.require(stage, StageStatus::Pending, StageStatus::Skipped)?;
        self.set(stage, StageStatus::Skipped, reason);
        Ok(())
    }

    /// Attach the wall-clock time of the stage's latest execution.
    pub fn record_duration(&mut self, stage: &str, elapsed: Duration) {
        if let Some(detail) = self.stage_details.get_mut(stage) {
            detail.duration_ms = Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        }
    }

    pub fn add_warning(&mut self, text: impl Into<String>) {
        self.warnings.push(text.into());
    }

    /// Put a stage back to `pending` so the next run executes it again.
    ///
    /// The result is discarded; the error log is kept. Stages that depend on
    /// this one are untouched; the orchestrator's reset reopens them too.
    ///
    /// # Errors
    ///
    /// [`StateError::UnknownStage`] if the stage has no entry.
    pub fn reset_stage(&mut self, stage: &str) -> Result<(), StateError> {
        self.current(stage)?;
        self.results.remove(stage);
        self.retry_requests.remove(stage);
        self.set(stage, StageStatus::Pending, "reset");
        Ok(())
    }

    /// Ask the conditional strategy to run a failed stage again.
    ///
    /// # Errors
    ///
    /// [`StateError::NotRetryable`] unless the stage is `failed`.
    pub fn request_retry(&mut self, stage: &str) -> Result<(), StateError> {
        let current = self.current(stage)?;
        if current != StageStatus::Failed {
            return Err(StateError::NotRetryable {
                stage: stage.to_string(),
                status: current,
            });
        }
        self.retry_requests.insert(stage.to_string());
        Ok(())
    }

    #[must_use]
    pub fn is_retry_requested(&self, stage: &str) -> bool {
        self.retry_requests.contains(stage)
    }

    #[must_use]
    pub fn is_completed(&self, stage: &str) -> bool {
        self.status(stage) == Some(StageStatus::Completed)
    }

    /// True if any stage the lookup reports as critical has failed.
    #[must_use]
    pub fn has_critical_failure(&self, criticality: &impl CriticalityLookup) -> bool {
        self.first_critical_failure(criticality).is_some()
    }

    /// The first (by error log order) critical stage that is currently `failed`.
    #[must_use]
    pub fn first_critical_failure(&self, criticality: &impl CriticalityLookup) -> Option<&str> {
        self.errors
            .iter()
            .map(|entry| entry.stage.as_str())
            .find(|stage| {
                self.status(stage) == Some(StageStatus::Failed) && criticality.is_critical(stage)
            })
    }

    #[must_use]
    pub fn status(&self, stage: &str) -> Option<StageStatus> {
        self.stage_status.get(stage).copied()
    }

    /// Names of stages currently in `status`, sorted by name.
    pub fn stages_with(&self, status: StageStatus) -> impl Iterator<Item = &str> {
        self.stage_status
            .iter()
            .filter(move |(_, s)| **s == status)
            .map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn stage_statuses(&self) -> &BTreeMap<String, StageStatus> {
        &self.stage_status
    }

    #[must_use]
    pub fn result(&self, stage: &str) -> Option<&Value> {
        self.results.get(stage)
    }

    #[must_use]
    pub fn results(&self) -> &BTreeMap<String, Value> {
        &self.results
    }

    #[must_use]
    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    #[must_use]
    pub fn stage_detail(&self, stage: &str) -> Option<&StageDetail> {
        self.stage_details.get(stage)
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn input(&self) -> &Path {
        &self.input
    }

    #[must_use]
    pub fn configuration(&self) -> &RunOptions {
        &self.configuration
    }

    #[must_use]
    pub fn strategy(&self) -> Option<StrategyKind> {
        self.strategy
    }

    #[must_use]
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// `completed_at - started_at`, when both are set.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }

    fn current(&self, stage: &str) -> Result<StageStatus, StateError> {
        self.status(stage).ok_or_else(|| StateError::UnknownStage {
            stage: stage.to_string(),
        })
    }

    fn require(&self, stage: &str, expected: StageStatus, to: StageStatus) -> Result<(), StateError> {
        let current = self.current(stage)?;
        if current == expected {
            Ok(())
        } else {
            Err(Self::invalid(stage, current, to))
        }
    }

    fn invalid(stage: &str, from: StageStatus, to: StageStatus) -> StateError {
        StateError::InvalidTransition {
            stage: stage.to_string(),
            from,
            to,
        }
    }

    fn set(&mut self, stage: &str, status: StageStatus, message: impl Into<String>) {
        self.stage_status.insert(stage.to_string(), status);
        self.stage_details.insert(
            stage.to_string(),
            StageDetail {
                message: message.into(),
                updated_at: Utc::now(),
                duration_ms: None,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn state_with(stages: &[&str]) -> PipelineState {
        let mut state = PipelineState::new("/docs/payments.pdf", RunOptions::default()).unwrap();
        state.initialize_stages(stages.iter().copied());
        state
    }

    #[test]
    fn test_new_derives_identity_and_defaults() {
        let state = state_with(&["extract", "auth"]);
        assert_eq!(state.identity(), "payments");
        assert_eq!(state.input(), Path::new("/docs/payments.pdf"));
        assert_eq!(state.status("extract"), Some(StageStatus::Pending));
        assert_eq!(state.status("auth"), Some(StageStatus::Pending));
        assert!(state.results().is_empty());
        assert!(state.started_at().is_none());

        let options = state.configuration();
        assert!(options.render_images);
        assert_eq!(options.image_format, ImageFormat::Png);
        assert_eq!(options.renderer, Renderer::Service);
        assert_eq!(options.theme, Theme::Default);
        assert!(!options.save_sources);
    }

    #[test]
    fn test_new_rejects_input_without_identity() {
        let err = PipelineState::new("/", RunOptions::default()).unwrap_err();
        assert!(matches!(err, InputError::NoFileStem { .. }));
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut state = state_with(&["extract"]);
        state.mark_running("extract").unwrap();
        assert_eq!(state.status("extract"), Some(StageStatus::Running));
        assert!(state.result("extract").is_none());

        state.mark_completed("extract", json!({"pages": 3})).unwrap();
        assert!(state.is_completed("extract"));
        assert_eq!(state.result("extract"), Some(&json!({"pages": 3})));
        assert_eq!(state.stage_detail("extract").unwrap().message, "completed");
    }

    #[test]
    fn test_failure_appends_error_and_is_terminal() {
        let mut state = state_with(&["auth"]);
        state.mark_running("auth").unwrap();
        state.mark_failed("auth", "quota exceeded").unwrap();

        assert_eq!(
            state.errors(),
            &[ErrorEntry {
                stage: "auth".to_string(),
                message: "quota exceeded".to_string()
            }]
        );
        assert!(state.result("auth").is_none());

        let err = state.mark_running("auth").unwrap_err();
        assert_eq!(
            err,
            StateError::InvalidTransition {
                stage: "auth".to_string(),
                from: StageStatus::Failed,
                to: StageStatus::Running,
            }
        );
    }

    #[test]
    fn test_completion_requires_running() {
        let mut state = state_with(&["extract"]);
        assert!(state.mark_completed("extract", json!(null)).is_err());
        assert!(state.mark_failed("extract", "x").is_err());
        assert!(state.results().is_empty());
        assert!(state.errors().is_empty());
    }

    #[test]
    fn test_unknown_stage_rejected() {
        let mut state = state_with(&["extract"]);
        assert_eq!(
            state.mark_running("ghost").unwrap_err(),
            StateError::UnknownStage {
                stage: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_retry_request_allows_rerun_once() {
        let mut state = state_with(&["auth"]);
        state.mark_running("auth").unwrap();
        state.mark_failed("auth", "boom").unwrap();

        state.request_retry("auth").unwrap();
        assert!(state.is_retry_requested("auth"));
        state.mark_running("auth").unwrap();
        assert!(!state.is_retry_requested("auth"));
        state.mark_completed("auth", json!("ok")).unwrap();

        // History survives the retry.
        assert_eq!(state.errors().len(), 1);
        assert!(state.is_completed("auth"));
    }

    #[test]
    fn test_retry_only_from_failed() {
        let mut state = state_with(&["auth"]);
        assert!(matches!(
            state.request_retry("auth"),
            Err(StateError::NotRetryable { .. })
        ));
    }

    #[test]
    fn test_reset_discards_result_keeps_errors() {
        let mut state = state_with(&["domain"]);
        state.mark_running("domain").unwrap();
        state.mark_failed("domain", "bad").unwrap();
        state.reset_stage("domain").unwrap();
        assert_eq!(state.status("domain"), Some(StageStatus::Pending));
        assert_eq!(state.errors().len(), 1);

        state.mark_running("domain").unwrap();
        state.mark_completed("domain", json!(1)).unwrap();
        state.reset_stage("domain").unwrap();
        assert!(state.result("domain").is_none());
    }

    #[test]
    fn test_critical_failure_lookup() {
        let mut state = state_with(&["auth", "domain"]);
        let critical = |stage: &str| stage != "auth";

        state.mark_running("auth").unwrap();
        state.mark_failed("auth", "non-critical").unwrap();
        assert!(!state.has_critical_failure(&critical));

        state.mark_running("domain").unwrap();
        state.mark_failed("domain", "critical").unwrap();
        assert!(state.has_critical_failure(&critical));
        assert_eq!(state.first_critical_failure(&critical), Some("domain"));

        state.reset_stage("domain").unwrap();
        assert!(!state.has_critical_failure(&critical));
    }

    #[test]
    fn test_begin_run_reopens_skips_and_rejects_running() {
        let mut state = state_with(&["a", "b"]);
        state.mark_skipped("a", "upstream failed").unwrap();
        state.begin_run(StrategyKind::Conditional).unwrap();
        assert_eq!(state.status("a"), Some(StageStatus::Pending));
        assert_eq!(state.strategy(), Some(StrategyKind::Conditional));
        assert!(state.started_at().is_some());
        assert!(state.completed_at().is_none());

        state.mark_running("b").unwrap();
        assert_eq!(
            state.begin_run(StrategyKind::Sequential).unwrap_err(),
            StateError::LeftRunning {
                stage: "b".to_string()
            }
        );
    }

    #[test]
    fn test_duration_and_serde() {
        let mut state = state_with(&["extract"]);
        state.begin_run(StrategyKind::Sequential).unwrap();
        state.mark_running("extract").unwrap();
        state.mark_completed("extract", json!({"k": "v"})).unwrap();
        state.record_duration("extract", Duration::from_millis(42));
        state.add_warning("diagram renderer offline");
        state.finish_run();

        assert!(state.duration().unwrap() >= chrono::Duration::zero());
        assert_eq!(state.stage_detail("extract").unwrap().duration_ms, Some(42));

        let text = serde_json::to_string(&state).unwrap();
        let back: PipelineState = serde_json::from_str(&text).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.schema_version(), STATE_SCHEMA_VERSION);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Run(usize),
        Complete(usize),
        Fail(usize),
        Skip(usize),
        Reset(usize),
        Retry(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        (0usize..4, 0u8..6).prop_map(|(i, kind)| match kind {
            0 => Op::Run(i),
            1 => Op::Complete(i),
            2 => Op::Fail(i),
            3 => Op::Skip(i),
            4 => Op::Reset(i),
            _ => Op::Retry(i),
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(
            std::env::var("PROPTEST_CASES").ok().and_then(|v| v.parse().ok()).unwrap_or(128)
        ))]

        #[test]
        fn prop_results_present_iff_completed(ops in prop::collection::vec(op(), 0..40)) {
            let names = ["a", "b", "c", "d"];
            let mut state = state_with(&names);
            let mut error_count = 0;

            for op in ops {
                // Rejected transitions leave the state untouched; only invariants matter here.
                let _ = match op {
                    Op::Run(i) => state.mark_running(names[i]),
                    Op::Complete(i) => state.mark_completed(names[i], json!(i)),
                    Op::Fail(i) => state.mark_failed(names[i], "x"),
                    Op::Skip(i) => state.mark_skipped(names[i], "skip"),
                    Op::Reset(i) => state.reset_stage(names[i]),
                    Op::Retry(i) => state.request_retry(names[i]),
                };

                prop_assert!(state.errors().len() >= error_count);
                error_count = state.errors().len();

                for name in names {
                    prop_assert_eq!(state.result(name).is_some(), state.is_completed(name));
                }
            }
        }
    }
}

//! Drives an execution graph over a pipeline state.
//!
//! The orchestrator owns the state for the duration of a run and is its only
//! writer. Stages receive a shared reference, execute one at a time, and
//! report back through their return value. Stage failures are recorded;
//! only infrastructure problems are raised as [`OrchestratorError`].

mod error;
mod report;

pub use error::OrchestratorError;
pub use report::{RunOutcome, RunReport, StageRow};

use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use hldflow_config::Config;
use hldflow_stage_api::{
    EnvCredentialProvider, PipelineState, RunOptions, StageError, StageStatus,
};
use hldflow_utils::error::{ConfigError, InputError};
use hldflow_utils::logging::{
    log_run_complete, log_run_start, log_stage_complete, log_stage_failed, log_stage_skipped,
    log_stage_start, run_span,
};
use hldflow_utils::types::{MissingDependencyPolicy, StrategyKind};

use crate::graph::{ExecutionGraph, NextStep, WorkflowInfo};
use crate::registry::StageRegistry;
use crate::stages::{
    command_registry, default_credential_env, default_descriptors, dry_run_registry,
    resolve_program,
};

/// Run-level settings that are not part of the pipeline state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Overrides the strategy's default policy when set.
    pub missing_dependency_policy: Option<MissingDependencyPolicy>,
    /// Deadline for the whole run, measured from its start.
    pub run_timeout: Option<Duration>,
    /// Whether the registry holds dry-run stages.
    pub dry_run: bool,
}

/// What the loop does after one stage execution.
enum Flow {
    Continue,
    Abort,
    TimedOut,
}

#[derive(Debug)]
pub struct Orchestrator {
    registry: StageRegistry,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(registry: StageRegistry, config: OrchestratorConfig) -> Self {
        Self { registry, config }
    }

    /// Build the default six-stage pipeline from resolved configuration.
    ///
    /// Without an analyzer command (or with dry-run forced) every stage is a
    /// [`DryRunStage`](crate::stages::DryRunStage); otherwise each stage
    /// invokes the analyzer with its credential taken from the environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when the credential map names an unknown stage or the
    /// analyzer program cannot be found.
    pub fn from_config(config: &Config) -> Result<Self, OrchestratorError> {
        let known: Vec<String> = default_descriptors()
            .into_iter()
            .map(|descriptor| descriptor.name)
            .collect();
        if let Some(stage) = config
            .credentials
            .stages
            .keys()
            .find(|stage| !known.contains(stage))
        {
            return Err(ConfigError::InvalidValue {
                key: format!("credentials.stages.{stage}"),
                value: "unknown stage".to_string(),
            }
            .into());
        }

        let dry_run = config.dry_run();
        let registry = match config.analyzer.command.as_deref() {
            Some(command) if !dry_run => {
                let program = resolve_program(command)?;
                let mut stage_vars: BTreeMap<String, String> = default_credential_env();
                stage_vars.extend(config.credentials.stages.clone());
                let credentials = EnvCredentialProvider::new(
                    stage_vars,
                    Some(config.credential_fallback_env().to_string()),
                );
                tracing::debug!(program = %program.display(), "using analyzer command");
                command_registry(
                    program,
                    &config.analyzer.args,
                    config.analyzer_timeout(),
                    Arc::new(credentials),
                )?
            }
            _ => dry_run_registry()?,
        };

        Ok(Self::new(
            registry,
            OrchestratorConfig {
                missing_dependency_policy: config.missing_dependency_policy(),
                run_timeout: config.run_timeout(),
                dry_run,
            },
        ))
    }

    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Plan the registry for `strategy`.
    ///
    /// # Errors
    ///
    /// Any graph validation failure.
    pub fn graph(&self, strategy: StrategyKind) -> Result<ExecutionGraph, OrchestratorError> {
        Ok(ExecutionGraph::build(
            &self.registry,
            strategy,
            self.config.missing_dependency_policy,
        )?)
    }

    /// # Errors
    ///
    /// Any graph validation failure.
    pub fn workflow_info(&self, strategy: StrategyKind) -> Result<WorkflowInfo, OrchestratorError> {
        Ok(self.graph(strategy)?.info())
    }

    #[must_use]
    pub fn report(&self, state: &PipelineState) -> RunReport {
        RunReport::from_state(state, &self.registry)
    }

    /// Put `stage` back to `pending` along with the stages built on it.
    ///
    /// Downstream stages that completed, were skipped, or failed without
    /// being critical are reopened; their inputs are about to change. Other
    /// stages keep their status and the error log is kept.
    ///
    /// Returns the reopened stages in registration order, `stage` first.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownStage`] when the registry lacks `stage`, and
    /// [`StateError::UnknownStage`] when the state has no entry for it.
    ///
    /// [`RegistryError::UnknownStage`]: hldflow_utils::error::RegistryError::UnknownStage
    /// [`StateError::UnknownStage`]: hldflow_utils::error::StateError::UnknownStage
    pub fn reset_stage(
        &self,
        state: &mut PipelineState,
        stage: &str,
    ) -> Result<Vec<String>, OrchestratorError> {
        let downstream = self.registry.downstream_of(stage)?;
        state.reset_stage(stage)?;

        let mut reopened = vec![stage.to_string()];
        for name in downstream {
            let reopen = match state.status(name) {
                Some(StageStatus::Completed | StageStatus::Skipped) => true,
                Some(StageStatus::Failed) => !self.registry.is_critical(name)?,
                _ => false,
            };
            if reopen {
                state.reset_stage(name)?;
                reopened.push(name.to_string());
            }
        }
        tracing::info!(stage, reopened = ?reopened, "reset stage");
        Ok(reopened)
    }

    /// Run every stage of the pipeline against a fresh state for `input`.
    ///
    /// Stage failures are recorded in the returned state.
    ///
    /// # Errors
    ///
    /// Input validation, graph validation, illegal transitions, and the run
    /// deadline.
    pub async fn run(
        &self,
        input: impl AsRef<Path>,
        options: RunOptions,
        strategy: StrategyKind,
    ) -> Result<PipelineState, OrchestratorError> {
        let input = input.as_ref();
        validate_input(input)?;
        let graph = self.graph(strategy)?;

        let mut state = PipelineState::new(input, options)?;
        state.initialize_stages(self.registry.names());
        self.drive(state, &graph).await
    }

    /// Continue an existing state, typically one loaded from disk.
    ///
    /// Completed stages are left alone under every strategy; `skipped`
    /// stages are re-evaluated.
    ///
    /// # Errors
    ///
    /// As for [`run`](Self::run), plus [`StateError::LeftRunning`] when a
    /// stage was interrupted and not reset.
    ///
    /// [`StateError::LeftRunning`]: hldflow_utils::error::StateError::LeftRunning
    pub async fn resume(
        &self,
        mut state: PipelineState,
        strategy: StrategyKind,
    ) -> Result<PipelineState, OrchestratorError> {
        let graph = self.graph(strategy)?;
        state.initialize_stages(self.registry.names());
        self.drive(state, &graph).await
    }

    async fn drive(
        &self,
        mut state: PipelineState,
        graph: &ExecutionGraph,
    ) -> Result<PipelineState, OrchestratorError> {
        let strategy = graph.strategy();
        state.begin_run(strategy)?;

        let span = run_span(state.identity(), strategy.as_str());
        async move {
            log_run_start(state.identity(), strategy.as_str(), self.registry.len());
            let started = Instant::now();
            let deadline = self
                .config
                .run_timeout
                .map(|timeout| tokio::time::Instant::now() + timeout);

            'run: loop {
                let batch = match graph.next_step(&state)? {
                    NextStep::Terminate => break,
                    NextStep::Skip { stage, reason } => {
                        state.mark_skipped(&stage, reason.as_str())?;
                        log_stage_skipped(state.identity(), &stage, &reason);
                        continue;
                    }
                    NextStep::RunStage(stage) => vec![stage],
                    NextStep::RunBatch(stages) => stages,
                };

                for stage in batch {
                    match self.execute_stage(&mut state, graph, &stage, deadline).await? {
                        Flow::Continue => {}
                        Flow::Abort => break 'run,
                        Flow::TimedOut => {
                            let timeout_secs =
                                self.config.run_timeout.map_or(0, |t| t.as_secs());
                            tracing::error!(
                                identity = %state.identity(),
                                stage = %stage,
                                timeout_secs,
                                "Run deadline expired"
                            );
                            return Err(OrchestratorError::RunTimedOut {
                                stage,
                                timeout_secs,
                                state: Box::new(state),
                            });
                        }
                    }
                }
            }

            state.finish_run();
            let outcome = RunReport::from_state(&state, &self.registry).outcome;
            log_run_complete(
                state.identity(),
                &outcome.to_string(),
                started.elapsed().as_millis(),
            );
            Ok(state)
        }
        .instrument(span)
        .await
    }

    async fn execute_stage(
        &self,
        state: &mut PipelineState,
        graph: &ExecutionGraph,
        name: &str,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<Flow, OrchestratorError> {
        let stage = Arc::clone(self.registry.get(name)?);
        let critical = stage.descriptor().critical;

        let missing = graph.missing_dependencies(name, state);
        if !missing.is_empty() {
            let warning = format!(
                "{name}: running without results from {}",
                missing.join(", ")
            );
            tracing::warn!(identity = %state.identity(), stage = %name, "{warning}");
            state.add_warning(warning);
        }

        state.mark_running(name)?;
        log_stage_start(state.identity(), name);
        let started = Instant::now();

        let execution = AssertUnwindSafe(stage.execute(state)).catch_unwind();
        let outcome = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, execution).await {
                Ok(outcome) => outcome,
                Err(_) => return Ok(Flow::TimedOut),
            },
            None => execution.await,
        };
        let result = outcome.unwrap_or_else(|panic| Err(StageError::Panicked(panic_message(&*panic))));
        let elapsed = started.elapsed();

        match result {
            Ok(output) => {
                for warning in output.warnings {
                    state.add_warning(format!("{name}: {warning}"));
                }
                state.mark_completed(name, output.payload)?;
                state.record_duration(name, elapsed);
                log_stage_complete(state.identity(), name, elapsed.as_millis());
                Ok(Flow::Continue)
            }
            Err(err) => {
                let message = err.to_string();
                state.mark_failed(name, message.as_str())?;
                state.record_duration(name, elapsed);
                log_stage_failed(state.identity(), name, &message, critical, elapsed.as_millis());
                Ok(if critical { Flow::Abort } else { Flow::Continue })
            }
        }
    }
}

/// Per-run options resolved from configuration.
#[must_use]
pub fn run_options(config: &Config) -> RunOptions {
    RunOptions {
        render_images: config.render_images(),
        image_format: config.image_format(),
        renderer: config.renderer(),
        theme: config.theme(),
        save_sources: config.save_sources(),
    }
}

/// The input must be an existing file with a `.pdf` extension (any case).
fn validate_input(path: &Path) -> Result<(), InputError> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(InputError::NotPdf {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(InputError::NotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

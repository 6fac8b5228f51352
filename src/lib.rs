//! hldflow - stage-graph orchestration for high-level design documents
//!
//! hldflow turns a requirements PDF into a high-level design by routing one
//! shared pipeline state through a graph of analysis stages: extraction,
//! security and integrations, domain and API design, behavior and quality,
//! diagram generation, and output composition.
//!
//! hldflow can be used in two ways:
//! - **CLI**: `hldflow run`, `hldflow resume`, `hldflow status`, `hldflow stages`
//! - **Library**: build an [`Orchestrator`] over your own [`Stage`] implementations
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Run the default pipeline with dry-run stages
//! hldflow run requirements.pdf --dry-run --state-out run.json
//!
//! # Continue a run after fixing a failed stage
//! hldflow resume run.json --reset domain_api_design
//!
//! # Check run status
//! hldflow status run.json --json
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use hldflow::{Orchestrator, OrchestratorConfig, RunOptions, StrategyKind};
//! use hldflow::stages::dry_run_registry;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = dry_run_registry()?;
//! let orchestrator = Orchestrator::new(registry, OrchestratorConfig::default());
//! let state = orchestrator
//!     .run("requirements.pdf", RunOptions::default(), StrategyKind::Sequential)
//!     .await?;
//! println!("{}", orchestrator.report(&state).outcome);
//! # Ok(())
//! # }
//! ```
//!
//! # JSON Contracts
//!
//! State files, reports, and workflow descriptions are emitted in JCS
//! (RFC 8785) canonical form. Use [`emit_jcs`] for your own integrations.

pub mod cli;

// ============================================================================
// Public API
// ============================================================================

/// Configuration with discovery and precedence: CLI > config file > defaults.
///
/// Use [`Config::discover()`] for CLI-like behavior or [`Config::builder()`]
/// for programmatic configuration.
pub use hldflow_config::{CliArgs, Config, ConfigBuilder};

/// Orchestration engine: registry, execution graph, orchestrator, reports.
pub use hldflow_engine::{
    ExecutionGraph, NextStep, Orchestrator, OrchestratorConfig, OrchestratorError, RunOutcome,
    RunReport, StageInfo, StageRegistry, StageRow, WorkflowInfo,
};

/// The state contract shared by the orchestrator and stages.
pub use hldflow_stage_api::{
    CredentialProvider, EnvCredentialProvider, PipelineState, RunOptions, Stage,
    StageDescriptor, StageError, StageOutput, StageStatus,
};

/// Error types with user-facing rendering and exit-code mapping.
pub use hldflow_utils::error::{
    ConfigError, ErrorCategory, GraphError, HldError, InputError, RegistryError, StateError,
    UserFriendlyError, render_for_user,
};

/// Exit codes matching the documented exit code table.
pub use hldflow_utils::exit_codes::ExitCode;

/// JCS (RFC 8785) canonical JSON emission.
pub use hldflow_utils::canonicalization::emit_jcs;

pub use hldflow_utils::types::{ImageFormat, MissingDependencyPolicy, Renderer, StrategyKind, Theme};

// ============================================================================
// Internal modules - accessible but not stable
// ============================================================================

#[doc(hidden)]
pub use hldflow_engine::{orchestrator, stages, state_store};

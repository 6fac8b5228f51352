//! Orchestration engine for hldflow.
//!
//! - [`StageRegistry`] holds stages in registration order
//! - [`ExecutionGraph`] decides what runs next under a [`StrategyKind`]
//! - [`Orchestrator`] drives a graph over a [`PipelineState`] until it terminates
//!
//! Stage failures are recorded in the state; only infrastructure problems
//! surface as [`OrchestratorError`].

pub mod graph;
pub mod orchestrator;
pub mod registry;
pub mod stages;
pub mod state_store;

pub use graph::{ExecutionGraph, NextStep, StageInfo, WorkflowInfo};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, OrchestratorError, RunOutcome, RunReport, StageRow,
};
pub use registry::StageRegistry;

pub use hldflow_stage_api::{PipelineState, RunOptions, Stage, StageDescriptor, StageOutput};
pub use hldflow_utils::types::{MissingDependencyPolicy, StrategyKind};

//! Execution graph: the plan a strategy follows over a registry.
//!
//! A graph is built once per run from the registry and a strategy, then
//! queried with [`ExecutionGraph::next_step`] after every state change.

mod plan;
mod route;

use serde::Serialize;
use std::collections::HashMap;

use hldflow_stage_api::{PipelineState, StageStatus};
use hldflow_utils::error::GraphError;
use hldflow_utils::types::{MissingDependencyPolicy, StrategyKind};

use crate::registry::StageRegistry;

/// What the orchestrator should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Execute one stage.
    RunStage(String),
    /// Execute these stages one after another without re-querying.
    RunBatch(Vec<String>),
    /// Mark the stage skipped, then ask again.
    Skip { stage: String, reason: String },
    /// No further stage will execute.
    Terminate,
}

/// Introspection output describing a built graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowInfo {
    pub strategy: StrategyKind,
    pub missing_dependency_policy: MissingDependencyPolicy,
    pub stages: Vec<StageInfo>,
    pub batches: Vec<Vec<String>>,
    /// Stages never execute concurrently under any strategy.
    pub supports_parallel: bool,
    pub supports_resume: bool,
    pub supports_streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageInfo {
    pub name: String,
    pub description: String,
    pub critical: bool,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    strategy: StrategyKind,
    policy: MissingDependencyPolicy,
    stages: Vec<StageInfo>,
    positions: HashMap<String, usize>,
    batches: Vec<Vec<String>>,
}

impl ExecutionGraph {
    /// Validate the registry and plan it for `strategy`.
    ///
    /// `policy` overrides the strategy's default missing-dependency policy.
    ///
    /// # Errors
    ///
    /// [`GraphError`] for an empty registry, unknown or self dependencies,
    /// cycles, and (for the fixed-order strategies) dependencies registered
    /// after their dependents.
    pub fn build(
        registry: &StageRegistry,
        strategy: StrategyKind,
        policy: Option<MissingDependencyPolicy>,
    ) -> Result<Self, GraphError> {
        if registry.is_empty() {
            return Err(GraphError::EmptyPipeline);
        }
        registry.validate()?;
        plan::check_acyclic(registry)?;

        let batches = match strategy {
            StrategyKind::Sequential => {
                plan::check_registration_order(registry)?;
                registry.names().into_iter().map(|n| vec![n.to_string()]).collect()
            }
            StrategyKind::OptimizedSequential => {
                plan::check_registration_order(registry)?;
                plan::partition_batches(registry)
            }
            StrategyKind::Conditional => {
                registry.names().into_iter().map(|n| vec![n.to_string()]).collect()
            }
        };

        let stages: Vec<StageInfo> = registry
            .descriptors()
            .map(|d| StageInfo {
                name: d.name.clone(),
                description: d.description.clone(),
                critical: d.critical,
                dependencies: d.dependencies.clone(),
            })
            .collect();
        let positions = stages
            .iter()
            .enumerate()
            .map(|(i, stage)| (stage.name.clone(), i))
            .collect();

        Ok(Self {
            strategy,
            policy: policy.unwrap_or_else(|| strategy.default_missing_dependency_policy()),
            stages,
            positions,
            batches,
        })
    }

    /// Decide the next step for `state`.
    ///
    /// # Errors
    ///
    /// [`GraphError::Stalled`] when the conditional strategy finds pending
    /// stages it can neither run nor skip.
    pub fn next_step(&self, state: &PipelineState) -> Result<NextStep, GraphError> {
        match self.strategy {
            StrategyKind::Sequential | StrategyKind::OptimizedSequential => {
                Ok(self.next_in_order(state))
            }
            StrategyKind::Conditional => self.next_conditional(state),
        }
    }

    /// Dependencies of `stage` that have not completed.
    #[must_use]
    pub fn missing_dependencies<'a>(&'a self, stage: &str, state: &PipelineState) -> Vec<&'a str> {
        self.stage(stage)
            .map(|info| {
                info.dependencies
                    .iter()
                    .filter(|dep| !state.is_completed(dep))
                    .map(String::as_str)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    #[must_use]
    pub fn policy(&self) -> MissingDependencyPolicy {
        self.policy
    }

    #[must_use]
    pub fn batches(&self) -> &[Vec<String>] {
        &self.batches
    }

    /// Stage names in registration order.
    pub fn order(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|stage| stage.name.as_str())
    }

    #[must_use]
    pub fn is_critical(&self, stage: &str) -> bool {
        self.stage(stage).is_some_and(|info| info.critical)
    }

    #[must_use]
    pub fn info(&self) -> WorkflowInfo {
        WorkflowInfo {
            strategy: self.strategy,
            missing_dependency_policy: self.policy,
            stages: self.stages.clone(),
            batches: self.batches.clone(),
            supports_parallel: false,
            supports_resume: self.strategy == StrategyKind::Conditional,
            supports_streaming: false,
        }
    }

    fn stage(&self, name: &str) -> Option<&StageInfo> {
        self.positions.get(name).map(|&i| &self.stages[i])
    }

    fn status(state: &PipelineState, stage: &str) -> StageStatus {
        state.status(stage).unwrap_or_default()
    }
}

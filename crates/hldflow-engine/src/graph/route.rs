//! Strategy-specific routing for [`ExecutionGraph::next_step`].

use hldflow_stage_api::{CriticalityLookup, PipelineState, StageStatus};
use hldflow_utils::error::GraphError;
use hldflow_utils::types::MissingDependencyPolicy;

use super::{ExecutionGraph, NextStep};

impl CriticalityLookup for ExecutionGraph {
    fn is_critical(&self, stage: &str) -> bool {
        ExecutionGraph::is_critical(self, stage)
    }
}

/// How a stage's dependencies stand in the current state.
enum Readiness<'a> {
    Ready,
    Waiting,
    Missing(&'a str),
    CriticalFailure(&'a str),
}

impl ExecutionGraph {
    /// Sequential and optimized-sequential traversal over the planned batches.
    pub(super) fn next_in_order(&self, state: &PipelineState) -> NextStep {
        if state.has_critical_failure(self) {
            return NextStep::Terminate;
        }

        for batch in &self.batches {
            let mut runnable = Vec::new();
            for stage in batch {
                if Self::status(state, stage) != StageStatus::Pending {
                    continue;
                }
                if let Some(reason) = self.skip_in_order(stage, state) {
                    if runnable.is_empty() {
                        return NextStep::Skip {
                            stage: stage.clone(),
                            reason,
                        };
                    }
                    break;
                }
                runnable.push(stage.clone());
            }

            match runnable.len() {
                0 => {}
                1 => return NextStep::RunStage(runnable.remove(0)),
                _ => return NextStep::RunBatch(runnable),
            }
        }
        NextStep::Terminate
    }

    /// Fixed-order strategies only skip when the policy asks for it.
    fn skip_in_order(&self, stage: &str, state: &PipelineState) -> Option<String> {
        if self.policy != MissingDependencyPolicy::SkipDependents {
            return None;
        }
        match self.readiness(stage, state) {
            Readiness::Missing(dep) | Readiness::CriticalFailure(dep) => {
                Some(format!("dependency '{dep}' did not complete"))
            }
            Readiness::Ready | Readiness::Waiting => None,
        }
    }

    /// Dynamic routing: earliest runnable stage whose dependencies have settled.
    pub(super) fn next_conditional(&self, state: &PipelineState) -> Result<NextStep, GraphError> {
        let mut waiting = Vec::new();

        for info in &self.stages {
            let stage = info.name.as_str();
            let status = Self::status(state, stage);
            let retrying = status == StageStatus::Failed
                && state.is_retry_requested(stage)
                && !info.critical;
            if status != StageStatus::Pending && !retrying {
                continue;
            }

            match self.readiness(stage, state) {
                Readiness::Ready => return Ok(NextStep::RunStage(stage.to_string())),
                Readiness::Waiting => waiting.push(stage.to_string()),
                Readiness::CriticalFailure(dep) if status == StageStatus::Pending => {
                    return Ok(NextStep::Skip {
                        stage: stage.to_string(),
                        reason: format!("critical dependency '{dep}' failed"),
                    });
                }
                Readiness::CriticalFailure(_) => {}
                Readiness::Missing(dep) => match self.policy {
                    MissingDependencyPolicy::RunWithMissing => {
                        return Ok(NextStep::RunStage(stage.to_string()));
                    }
                    MissingDependencyPolicy::SkipDependents if status == StageStatus::Pending => {
                        return Ok(NextStep::Skip {
                            stage: stage.to_string(),
                            reason: format!("dependency '{dep}' did not complete"),
                        });
                    }
                    MissingDependencyPolicy::SkipDependents => {}
                },
            }
        }

        if waiting.is_empty() {
            Ok(NextStep::Terminate)
        } else {
            Err(GraphError::Stalled { pending: waiting })
        }
    }

    fn readiness<'a>(&'a self, stage: &str, state: &PipelineState) -> Readiness<'a> {
        let Some(info) = self.stage(stage) else {
            return Readiness::Ready;
        };

        let mut missing = None;
        for dep in &info.dependencies {
            match Self::status(state, dep) {
                StageStatus::Completed => {}
                StageStatus::Failed if self.is_critical(dep) => {
                    return Readiness::CriticalFailure(dep.as_str());
                }
                StageStatus::Failed if state.is_retry_requested(dep) => return Readiness::Waiting,
                StageStatus::Failed | StageStatus::Skipped => {
                    missing.get_or_insert(dep.as_str());
                }
                StageStatus::Pending | StageStatus::Running => return Readiness::Waiting,
            }
        }
        missing.map_or(Readiness::Ready, Readiness::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StageRegistry;
    use crate::stages::DryRunStage;
    use hldflow_stage_api::{RunOptions, StageDescriptor};
    use hldflow_utils::types::StrategyKind;
    use serde_json::json;

    /// `deps` is a comma-separated list; a leading `!` marks the stage non-critical.
    fn registry(pipeline: &[(&str, &str)]) -> StageRegistry {
        let mut registry = StageRegistry::new();
        for (name, deps) in pipeline {
            let (name, critical) = match name.strip_prefix('!') {
                Some(rest) => (rest, false),
                None => (*name, true),
            };
            let mut descriptor =
                StageDescriptor::new(name, "").depends_on(deps.split(',').filter(|d| !d.is_empty()));
            if !critical {
                descriptor = descriptor.non_critical();
            }
            registry.register(DryRunStage::new(descriptor)).unwrap();
        }
        registry
    }

    fn linear() -> StageRegistry {
        registry(&[
            ("extract", ""),
            ("!auth", "extract"),
            ("domain", "auth"),
            ("behavior", "domain"),
            ("diagram", "behavior"),
            ("output", "diagram"),
        ])
    }

    fn fan_out() -> StageRegistry {
        registry(&[
            ("extract", ""),
            ("!auth", "extract"),
            ("domain", "extract"),
            ("behavior", "extract"),
            ("diagram", "auth,domain,behavior"),
            ("output", "diagram"),
        ])
    }

    fn state_for(registry: &StageRegistry, strategy: StrategyKind) -> PipelineState {
        let mut state = PipelineState::new("requirements.pdf", RunOptions::default()).unwrap();
        state.initialize_stages(registry.names());
        state.begin_run(strategy).unwrap();
        state
    }

    fn complete(state: &mut PipelineState, stage: &str) {
        state.mark_running(stage).unwrap();
        state.mark_completed(stage, json!({})).unwrap();
    }

    fn fail(state: &mut PipelineState, stage: &str) {
        state.mark_running(stage).unwrap();
        state.mark_failed(stage, "boom").unwrap();
    }

    #[test]
    fn test_build_rejects_empty_pipeline() {
        let err = ExecutionGraph::build(&StageRegistry::new(), StrategyKind::Sequential, None)
            .unwrap_err();
        assert_eq!(err, GraphError::EmptyPipeline);
    }

    #[test]
    fn test_build_rejects_unknown_dependency() {
        let reg = registry(&[("a", "ghost")]);
        let err = ExecutionGraph::build(&reg, StrategyKind::Conditional, None).unwrap_err();
        assert!(matches!(err, GraphError::Registry(_)));
    }

    #[test]
    fn test_conditional_accepts_forward_dependency() {
        let reg = registry(&[("b", "a"), ("a", "")]);
        assert!(ExecutionGraph::build(&reg, StrategyKind::Sequential, None).is_err());

        let graph = ExecutionGraph::build(&reg, StrategyKind::Conditional, None).unwrap();
        let mut state = state_for(&reg, StrategyKind::Conditional);
        assert_eq!(
            graph.next_step(&state).unwrap(),
            NextStep::RunStage("a".to_string())
        );
        complete(&mut state, "a");
        assert_eq!(
            graph.next_step(&state).unwrap(),
            NextStep::RunStage("b".to_string())
        );
    }

    #[test]
    fn test_sequential_walks_registration_order() {
        let reg = linear();
        let graph = ExecutionGraph::build(&reg, StrategyKind::Sequential, None).unwrap();
        let mut state = state_for(&reg, StrategyKind::Sequential);

        let mut order = Vec::new();
        while let NextStep::RunStage(stage) = graph.next_step(&state).unwrap() {
            complete(&mut state, &stage);
            order.push(stage);
        }
        assert_eq!(order, reg.names());
    }

    #[test]
    fn test_sequential_runs_past_non_critical_failure() {
        let reg = linear();
        let graph = ExecutionGraph::build(&reg, StrategyKind::Sequential, None).unwrap();
        let mut state = state_for(&reg, StrategyKind::Sequential);
        complete(&mut state, "extract");
        fail(&mut state, "auth");

        assert_eq!(graph.policy(), MissingDependencyPolicy::RunWithMissing);
        assert_eq!(
            graph.next_step(&state).unwrap(),
            NextStep::RunStage("domain".to_string())
        );
        assert_eq!(graph.missing_dependencies("domain", &state), vec!["auth"]);
    }

    #[test]
    fn test_sequential_skip_policy() {
        let reg = linear();
        let graph = ExecutionGraph::build(
            &reg,
            StrategyKind::Sequential,
            Some(MissingDependencyPolicy::SkipDependents),
        )
        .unwrap();
        let mut state = state_for(&reg, StrategyKind::Sequential);
        complete(&mut state, "extract");
        fail(&mut state, "auth");

        assert!(matches!(
            graph.next_step(&state).unwrap(),
            NextStep::Skip { stage, .. } if stage == "domain"
        ));
    }

    #[test]
    fn test_sequential_terminates_after_critical_failure() {
        let reg = linear();
        let graph = ExecutionGraph::build(&reg, StrategyKind::Sequential, None).unwrap();
        let mut state = state_for(&reg, StrategyKind::Sequential);
        fail(&mut state, "extract");
        assert_eq!(graph.next_step(&state).unwrap(), NextStep::Terminate);
    }

    #[test]
    fn test_optimized_batches_fan_out() {
        let reg = fan_out();
        let graph = ExecutionGraph::build(&reg, StrategyKind::OptimizedSequential, None).unwrap();
        let mut state = state_for(&reg, StrategyKind::OptimizedSequential);

        assert_eq!(
            graph.next_step(&state).unwrap(),
            NextStep::RunStage("extract".to_string())
        );
        complete(&mut state, "extract");
        assert_eq!(
            graph.next_step(&state).unwrap(),
            NextStep::RunBatch(vec![
                "auth".to_string(),
                "domain".to_string(),
                "behavior".to_string()
            ])
        );

        complete(&mut state, "auth");
        assert_eq!(
            graph.next_step(&state).unwrap(),
            NextStep::RunBatch(vec!["domain".to_string(), "behavior".to_string()])
        );
    }

    #[test]
    fn test_optimized_linear_matches_sequential() {
        let reg = linear();
        let graph = ExecutionGraph::build(&reg, StrategyKind::OptimizedSequential, None).unwrap();
        let mut state = state_for(&reg, StrategyKind::OptimizedSequential);

        let mut order = Vec::new();
        loop {
            match graph.next_step(&state).unwrap() {
                NextStep::RunStage(stage) => {
                    complete(&mut state, &stage);
                    order.push(stage);
                }
                NextStep::RunBatch(stages) => {
                    for stage in stages {
                        complete(&mut state, &stage);
                        order.push(stage);
                    }
                }
                NextStep::Terminate => break,
                other @ NextStep::Skip { .. } => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(order, reg.names());
    }

    #[test]
    fn test_conditional_idempotent_on_completed_state() {
        let reg = linear();
        let graph = ExecutionGraph::build(&reg, StrategyKind::Conditional, None).unwrap();
        let mut state = state_for(&reg, StrategyKind::Conditional);
        for stage in reg.names() {
            complete(&mut state, stage);
        }
        assert_eq!(graph.next_step(&state).unwrap(), NextStep::Terminate);
        assert_eq!(graph.next_step(&state).unwrap(), NextStep::Terminate);
    }

    #[test]
    fn test_conditional_skips_dependents_of_critical_failure() {
        let reg = fan_out();
        let graph = ExecutionGraph::build(&reg, StrategyKind::Conditional, None).unwrap();
        let mut state = state_for(&reg, StrategyKind::Conditional);
        complete(&mut state, "extract");
        complete(&mut state, "auth");
        fail(&mut state, "domain");

        // behavior does not depend on domain
        assert_eq!(
            graph.next_step(&state).unwrap(),
            NextStep::RunStage("behavior".to_string())
        );
        complete(&mut state, "behavior");

        match graph.next_step(&state).unwrap() {
            NextStep::Skip { stage, reason } => {
                assert_eq!(stage, "diagram");
                assert!(reason.contains("domain"));
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn test_conditional_retries_requested_non_critical_failure() {
        let reg = linear();
        let graph = ExecutionGraph::build(&reg, StrategyKind::Conditional, None).unwrap();
        let mut state = state_for(&reg, StrategyKind::Conditional);
        complete(&mut state, "extract");
        fail(&mut state, "auth");
        state.mark_skipped("domain", "auth failed").unwrap();

        state.request_retry("auth").unwrap();
        state.begin_run(StrategyKind::Conditional).unwrap();
        assert_eq!(
            graph.next_step(&state).unwrap(),
            NextStep::RunStage("auth".to_string())
        );
    }

    #[test]
    fn test_conditional_resume_starts_at_first_incomplete() {
        let reg = linear();
        let graph = ExecutionGraph::build(&reg, StrategyKind::Conditional, None).unwrap();
        let mut state = state_for(&reg, StrategyKind::Conditional);
        complete(&mut state, "extract");
        complete(&mut state, "auth");

        assert_eq!(
            graph.next_step(&state).unwrap(),
            NextStep::RunStage("domain".to_string())
        );
    }

    #[test]
    fn test_conditional_run_with_missing_policy() {
        let reg = linear();
        let graph = ExecutionGraph::build(
            &reg,
            StrategyKind::Conditional,
            Some(MissingDependencyPolicy::RunWithMissing),
        )
        .unwrap();
        let mut state = state_for(&reg, StrategyKind::Conditional);
        complete(&mut state, "extract");
        fail(&mut state, "auth");

        assert_eq!(
            graph.next_step(&state).unwrap(),
            NextStep::RunStage("domain".to_string())
        );
    }

    #[test]
    fn test_info_flags() {
        let reg = fan_out();
        let info = ExecutionGraph::build(&reg, StrategyKind::OptimizedSequential, None)
            .unwrap()
            .info();
        assert!(!info.supports_parallel);
        assert!(!info.supports_resume);
        assert!(!info.supports_streaming);
        assert_eq!(info.batches.len(), 4);
        assert_eq!(info.stages.len(), 6);

        let info = ExecutionGraph::build(&reg, StrategyKind::Conditional, None)
            .unwrap()
            .info();
        assert!(info.supports_resume);
        assert_eq!(info.missing_dependency_policy, MissingDependencyPolicy::SkipDependents);
    }
}

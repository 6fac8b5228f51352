#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hldflow_engine::{Orchestrator, OrchestratorConfig, StageRegistry};
use hldflow_stage_api::{PipelineState, Stage, StageDescriptor, StageError, StageOutput};

/// What a scripted stage does when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    Sleep(Duration),
}

/// Records executions in a shared log and behaves as scripted.
pub struct ScriptedStage {
    descriptor: StageDescriptor,
    behavior: Arc<Mutex<Behavior>>,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Stage for ScriptedStage {
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, StageError> {
        self.log.lock().unwrap().push(self.descriptor.name.clone());
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            Behavior::Succeed => Ok(StageOutput::new(json!({
                "stage": self.descriptor.name,
                "upstream": state.results().len(),
            }))),
            Behavior::Fail => Err(StageError::failed(format!(
                "{} could not analyze the document",
                self.descriptor.name
            ))),
            Behavior::Panic => panic!("{} exploded", self.descriptor.name),
            Behavior::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(StageOutput::new(json!({})))
            }
        }
    }
}

/// A pipeline of scripted stages plus handles to steer and observe it.
pub struct Harness {
    pub log: Arc<Mutex<Vec<String>>>,
    behaviors: Vec<(String, Arc<Mutex<Behavior>>)>,
    registry: StageRegistry,
}

impl Harness {
    /// `pipeline` entries are `(name, comma-separated deps)`; a leading `!` marks
    /// the stage non-critical.
    pub fn new(pipeline: &[(&str, &str)]) -> Self {
        let descriptors = pipeline.iter().map(|(name, deps)| {
            let (name, critical) = match name.strip_prefix('!') {
                Some(rest) => (rest, false),
                None => (*name, true),
            };
            let descriptor = StageDescriptor::new(name, format!("{name} stage"))
                .depends_on(deps.split(',').filter(|d| !d.is_empty()));
            if critical {
                descriptor
            } else {
                descriptor.non_critical()
            }
        });
        Self::from_descriptors(descriptors)
    }

    /// Scripted stages carrying the given descriptors, e.g. the shipped
    /// pipeline's.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = StageDescriptor>) -> Self {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut behaviors = Vec::new();
        let mut registry = StageRegistry::new();

        for descriptor in descriptors {
            let behavior = Arc::new(Mutex::new(Behavior::Succeed));
            behaviors.push((descriptor.name.clone(), Arc::clone(&behavior)));
            registry
                .register(ScriptedStage {
                    descriptor,
                    behavior,
                    log: Arc::clone(&log),
                })
                .unwrap();
        }

        Self {
            log,
            behaviors,
            registry,
        }
    }

    /// `[extract, auth, domain, behavior, diagram, output]`, each depending on
    /// the previous one; only `auth` is non-critical.
    pub fn six_stage() -> Self {
        Self::new(&[
            ("extract", ""),
            ("!auth", "extract"),
            ("domain", "auth"),
            ("behavior", "domain"),
            ("diagram", "behavior"),
            ("output", "diagram"),
        ])
    }

    pub fn set(&self, stage: &str, behavior: Behavior) {
        let (_, slot) = self
            .behaviors
            .iter()
            .find(|(name, _)| name == stage)
            .unwrap();
        *slot.lock().unwrap() = behavior;
    }

    pub fn executed(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    pub fn orchestrator(&self, config: OrchestratorConfig) -> Orchestrator {
        Orchestrator::new(self.registry.clone(), config)
    }

    pub fn names(&self) -> Vec<String> {
        self.registry.names().into_iter().map(str::to_string).collect()
    }
}

/// An existing `.pdf` file inside a fresh temporary directory.
pub fn pdf_input(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, b"%PDF-1.7\n").unwrap();
    (dir, path)
}

/// `results` has an entry exactly for the completed stages.
pub fn assert_results_match_completed(state: &PipelineState) {
    let completed: HashSet<&str> = state
        .stage_statuses()
        .iter()
        .filter(|(_, status)| **status == hldflow_stage_api::StageStatus::Completed)
        .map(|(name, _)| name.as_str())
        .collect();
    let with_results: HashSet<&str> = state.results().keys().map(String::as_str).collect();
    assert_eq!(completed, with_results);
}

/// The state as JSON without the fields that differ between otherwise
/// identical runs: timestamps, durations, and the strategy name.
pub fn comparable(state: &PipelineState) -> serde_json::Value {
    let mut value = serde_json::to_value(state).unwrap();
    let object = value.as_object_mut().unwrap();
    for key in ["started_at", "completed_at", "strategy"] {
        object.remove(key);
    }
    if let Some(details) = object
        .get_mut("stage_details")
        .and_then(serde_json::Value::as_object_mut)
    {
        for detail in details.values_mut() {
            if let Some(detail) = detail.as_object_mut() {
                detail.remove("updated_at");
                detail.remove("duration_ms");
            }
        }
    }
    value
}

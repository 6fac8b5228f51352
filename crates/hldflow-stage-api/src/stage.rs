use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::PipelineState;

/// Static description of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub name: String,
    pub description: String,
    /// A failed critical stage stops the run.
    pub critical: bool,
    /// Stages whose results this stage consumes, in declaration order.
    pub dependencies: Vec<String>,
}

impl StageDescriptor {
    /// A critical stage with no dependencies.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            critical: true,
            dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    /// Append dependencies, ignoring names already declared.
    #[must_use]
    pub fn depends_on<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for stage in stages {
            let stage = stage.into();
            if !self.dependencies.contains(&stage) {
                self.dependencies.push(stage);
            }
        }
        self
    }
}

/// What a successful stage hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageOutput {
    /// Opaque payload stored under the stage's name.
    pub payload: Value,
    /// Advisory messages appended to the state's warnings.
    pub warnings: Vec<String>,
}

impl StageOutput {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Recoverable stage failure. Recorded in the state, never raised from a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("{0}")]
    Failed(String),

    #[error("required result from stage '{stage}' is missing")]
    MissingInput { stage: String },

    #[error("analyzer command failed: {0}")]
    Command(String),

    #[error("stage timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("invalid stage output: {0}")]
    InvalidOutput(String),

    #[error("stage panicked: {0}")]
    Panicked(String),
}

impl StageError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A named unit of pipeline work.
///
/// Stages read the shared state (typically upstream results) and report
/// their outcome through the return value; the orchestrator is the only
/// writer of the state.
#[async_trait]
pub trait Stage: Send + Sync {
    fn descriptor(&self) -> &StageDescriptor;

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, StageError>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RunOptions;
    use serde_json::json;

    struct Upper {
        descriptor: StageDescriptor,
    }

    #[async_trait]
    impl Stage for Upper {
        fn descriptor(&self) -> &StageDescriptor {
            &self.descriptor
        }

        async fn execute(&self, state: &PipelineState) -> Result<StageOutput, StageError> {
            let upstream = state.result("extract").ok_or_else(|| StageError::MissingInput {
                stage: "extract".to_string(),
            })?;
            let text = upstream
                .as_str()
                .ok_or_else(|| StageError::InvalidOutput("expected a string".to_string()))?;
            Ok(StageOutput::new(json!(text.to_uppercase())).with_warning("shouting"))
        }
    }

    #[test]
    fn test_descriptor_builder() {
        let descriptor = StageDescriptor::new("auth", "Security analysis")
            .non_critical()
            .depends_on(["extract", "extract", "domain"]);
        assert!(!descriptor.critical);
        assert_eq!(descriptor.dependencies, vec!["extract", "domain"]);
        assert!(StageDescriptor::new("x", "").critical);
    }

    #[tokio::test]
    async fn test_stage_reads_upstream_result() {
        let stage = Upper {
            descriptor: StageDescriptor::new("upper", "").depends_on(["extract"]),
        };
        let mut state = PipelineState::new("doc.pdf", RunOptions::default()).unwrap();
        state.initialize_stages(["extract", "upper"]);

        let err = stage.execute(&state).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "required result from stage 'extract' is missing"
        );

        state.mark_running("extract").unwrap();
        state.mark_completed("extract", json!("hello")).unwrap();
        let output = stage.execute(&state).await.unwrap();
        assert_eq!(output.payload, json!("HELLO"));
        assert_eq!(output.warnings, vec!["shouting".to_string()]);
        assert_eq!(stage.name(), "upper");
    }
}

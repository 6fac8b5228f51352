use async_trait::async_trait;
use serde_json::json;

use hldflow_stage_api::{PipelineState, Stage, StageDescriptor, StageError, StageOutput};

/// Stage that performs no analysis and returns a deterministic payload.
///
/// Used when no analyzer command is configured and throughout the tests.
/// The payload lists which upstream results were present.
#[derive(Debug, Clone)]
pub struct DryRunStage {
    descriptor: StageDescriptor,
}

impl DryRunStage {
    pub fn new(descriptor: StageDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl Stage for DryRunStage {
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, StageError> {
        let available: Vec<&str> = self
            .descriptor
            .dependencies
            .iter()
            .map(String::as_str)
            .filter(|dep| state.is_completed(dep))
            .collect();

        Ok(StageOutput::new(json!({
            "stage": self.descriptor.name,
            "identity": state.identity(),
            "dry_run": true,
            "inputs": available,
        })))
    }
}

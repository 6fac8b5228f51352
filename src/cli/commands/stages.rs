//! Stages command implementation
//!
//! Handles `hldflow stages`: describes the stage graph a strategy would
//! follow for the configured pipeline.

use anyhow::Result;

use super::json_emit::emit_workflow_json;

use crate::{Config, ExitCode, Orchestrator};

/// Execute the stages command
pub fn execute_stages_command(json: bool, config: &Config) -> Result<ExitCode> {
    let orchestrator = Orchestrator::from_config(config)?;
    let info = orchestrator.workflow_info(config.strategy())?;

    if json {
        println!("{}", emit_workflow_json(&info)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Strategy: {}", info.strategy);
    println!("Missing dependency policy: {}", info.missing_dependency_policy);
    println!("Stages:");
    for stage in &info.stages {
        let optional = if stage.critical { "" } else { " [optional]" };
        println!("  {}{optional} - {}", stage.name, stage.description);
        if !stage.dependencies.is_empty() {
            println!("      after: {}", stage.dependencies.join(", "));
        }
    }

    println!("Batches:");
    for (index, batch) in info.batches.iter().enumerate() {
        println!("  {}. {}", index + 1, batch.join(", "));
    }
    println!(
        "Resume: {}",
        if info.supports_resume { "yes" } else { "no" }
    );
    Ok(ExitCode::SUCCESS)
}

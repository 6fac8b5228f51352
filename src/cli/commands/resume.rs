//! Resume command implementation
//!
//! Handles `hldflow resume <STATE>`: loads a saved state, applies resets and
//! retry requests, and continues the run. A reset also reopens the stages
//! that consumed the reset stage's result.

use anyhow::Result;
use camino::Utf8Path;

use super::common::{ensure_known_stages, finish, persist_outcome};

use crate::{
    Config, ConfigError, ExitCode, HldError, Orchestrator, StrategyKind, state_store,
};

/// Stage names and output settings for a resume.
#[derive(Debug, Default)]
pub struct ResumeRequest<'a> {
    pub reset: &'a [String],
    pub retry: &'a [String],
    pub state_out: Option<&'a Utf8Path>,
    pub json: bool,
}

/// Execute the resume command
///
/// Without a configured strategy the resume runs conditionally, which starts
/// at the first stage that has not completed.
pub async fn execute_resume_command(
    state_path: &Utf8Path,
    request: ResumeRequest<'_>,
    config: &Config,
) -> Result<ExitCode> {
    let mut state = state_store::load(state_path)?;

    let mut config = config.clone();
    let strategy = *config
        .pipeline
        .strategy
        .get_or_insert(StrategyKind::Conditional);
    let orchestrator = Orchestrator::from_config(&config)?;

    ensure_known_stages(&orchestrator, "--reset", request.reset)?;
    ensure_known_stages(&orchestrator, "--retry", request.retry)?;

    for stage in request.reset {
        let reopened = orchestrator.reset_stage(&mut state, stage)?;
        if !request.json {
            println!("Reset {}", reopened.join(", "));
        }
    }

    if !request.retry.is_empty() && strategy != StrategyKind::Conditional {
        return Err(ConfigError::InvalidValue {
            key: "--retry".to_string(),
            value: format!("retry requests need the conditional strategy, not {strategy}"),
        }
        .into());
    }
    for stage in request.retry {
        if orchestrator
            .registry()
            .is_critical(stage)
            .map_err(HldError::from)?
        {
            return Err(ConfigError::InvalidValue {
                key: "--retry".to_string(),
                value: format!("'{stage}' is critical; use --reset to run it again"),
            }
            .into());
        }
        state.request_retry(stage).map_err(HldError::from)?;
    }

    if !request.json {
        println!("Resuming {} ({strategy}) from {state_path}", state.identity());
    }

    let result = orchestrator.resume(state, strategy).await;
    let state = persist_outcome(result, Some(request.state_out.unwrap_or(state_path)))?;

    finish(&orchestrator.report(&state), request.json)
}

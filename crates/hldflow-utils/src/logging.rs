//! Logging and observability for hldflow.
//!
//! Structured `tracing` events for run and stage lifecycle, plus subscriber
//! setup for the CLI. Libraries only emit events; installing a subscriber is
//! the binary's job.

use tracing::{Level, error, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence when set. Otherwise `hldflow*` targets log at
/// `info` (or `debug` when `verbose`) and everything else at `warn`.
///
/// # Errors
///
/// Fails if a global subscriber has already been installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("warn,hldflow=debug,hldflow_engine=debug,hldflow_config=debug")
            } else {
                EnvFilter::try_new("warn,hldflow=info,hldflow_engine=info")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span covering one run over one pipeline state.
pub fn run_span(identity: &str, strategy: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "pipeline_run",
        identity = %identity,
        strategy = %strategy,
    )
}

pub fn log_run_start(identity: &str, strategy: &str, stage_count: usize) {
    info!(
        identity = %identity,
        strategy = %strategy,
        stage_count,
        "Starting pipeline run"
    );
}

pub fn log_run_complete(identity: &str, outcome: &str, duration_ms: u128) {
    info!(
        identity = %identity,
        outcome = %outcome,
        duration_ms = %duration_ms,
        "Pipeline run finished"
    );
}

pub fn log_stage_start(identity: &str, stage: &str) {
    info!(identity = %identity, stage = %stage, "Starting stage");
}

pub fn log_stage_complete(identity: &str, stage: &str, duration_ms: u128) {
    info!(
        identity = %identity,
        stage = %stage,
        duration_ms = %duration_ms,
        "Stage completed"
    );
}

/// Critical failures log at `error`, non-critical ones at `warn`.
pub fn log_stage_failed(identity: &str, stage: &str, error: &str, critical: bool, duration_ms: u128) {
    if critical {
        error!(
            identity = %identity,
            stage = %stage,
            error = %error,
            duration_ms = %duration_ms,
            "Critical stage failed, aborting run"
        );
    } else {
        warn!(
            identity = %identity,
            stage = %stage,
            error = %error,
            duration_ms = %duration_ms,
            "Stage failed, continuing"
        );
    }
}

pub fn log_stage_skipped(identity: &str, stage: &str, reason: &str) {
    warn!(identity = %identity, stage = %stage, reason = %reason, "Stage skipped");
}

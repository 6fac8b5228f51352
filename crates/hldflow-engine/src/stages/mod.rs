//! Built-in stage implementations and the default pipeline.

mod command;
mod dry_run;
mod pipeline;

pub use command::{CREDENTIAL_ENV_VAR, CommandStage, resolve_program};
pub use dry_run::DryRunStage;
pub use pipeline::{
    AUTH_INTEGRATIONS, BEHAVIOR_QUALITY, DIAGRAM_GENERATION, DOMAIN_API_DESIGN, OUTPUT_COMPOSITION,
    PDF_EXTRACTION, command_registry, default_credential_env, default_descriptors,
    dry_run_registry,
};

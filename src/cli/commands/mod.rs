//! CLI command implementations (facade).
//!
//! This module re-exports the command surface used by `run.rs`.
//! Implementations live in `commands/*`.

mod common;
mod json_emit;
mod resume;
mod run;
mod stages;
mod status;

pub use resume::{ResumeRequest, execute_resume_command};
pub use run::execute_run_command;
pub use stages::execute_stages_command;
pub use status::execute_status_command;

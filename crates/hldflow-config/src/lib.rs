//! Configuration management for hldflow
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > file > defaults. The TOML file has `[pipeline]`, `[render]`,
//! `[analyzer]`, `[credentials]`, and `[logging]` sections.

mod builder;
mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use cli_args::CliArgs;
pub use hldflow_utils::types::ConfigSource;
pub use model::*;

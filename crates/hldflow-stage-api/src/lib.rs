//! Stage contract shared by the orchestrator and stage implementations.
//!
//! # Purpose
//!
//! This crate holds the minimal types needed to implement a stage without
//! depending on the engine: the [`PipelineState`] record threaded through a
//! run, the [`Stage`] trait, and the [`CredentialProvider`] capability that
//! stages receive at construction.

mod credentials;
mod stage;
mod state;

pub use credentials::{
    Credential, CredentialProvider, EnvCredentialProvider, StaticCredentialProvider,
};
pub use stage::{Stage, StageDescriptor, StageError, StageOutput};
pub use state::{
    CriticalityLookup, ErrorEntry, PipelineState, RunOptions, STATE_SCHEMA_VERSION, StageDetail,
};

pub use hldflow_utils::types::StageStatus;

//! Error taxonomy for hldflow.
//!
//! Stage failures are *not* represented here: they are recorded in the
//! pipeline state and never raised. The types in this module describe
//! infrastructure failures, the ones that prevent a run from being driven
//! at all (bad input, an invalid stage graph, an illegal status transition,
//! configuration problems).

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::exit_codes::ExitCode;
use crate::identity::IdentityError;
use crate::types::StageStatus;

/// Trait for errors that can be presented to a person at a terminal.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    StageGraph,
    StateTransition,
    FileSystem,
    Timeout,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Input => write!(f, "Input"),
            Self::StageGraph => write!(f, "Stage Graph"),
            Self::StateTransition => write!(f, "State Transition"),
            Self::FileSystem => write!(f, "File System"),
            Self::Timeout => write!(f, "Timeout"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration value for '{key}' is invalid: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::DiscoveryFailed { reason } => {
                format!("Could not locate configuration: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "Configuration is loaded with precedence CLI flags > .hldflow/config.toml > defaults."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of .hldflow/config.toml".to_string(),
                "Valid sections: [pipeline], [render], [analyzer], [credentials], [logging]"
                    .to_string(),
            ],
            Self::InvalidValue { key, .. } => vec![
                format!("Fix the value of '{key}' in the config file or on the command line"),
                "Run 'hldflow stages' to list valid stage names".to_string(),
            ],
            Self::NotFound { .. } => vec![
                "Check the path passed to --config".to_string(),
                "Omit --config to use discovery".to_string(),
            ],
            Self::DiscoveryFailed { .. } => {
                vec!["Pass an explicit config file with --config".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Errors raised while building or validating a stage registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Stage '{name}' is already registered")]
    DuplicateStage { name: String },

    #[error("Stage '{name}' is not registered")]
    UnknownStage { name: String },

    #[error("Stage '{stage}' depends on unregistered stage '{dependency}'")]
    UnknownDependency { stage: String, dependency: String },

    #[error("Stage '{stage}' depends on itself")]
    SelfDependency { stage: String },
}

impl UserFriendlyError for RegistryError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        Some("Stage names are unique and every declared dependency must name a registered stage.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::DuplicateStage { .. } => {
                vec!["Give each stage a distinct name before registering it".to_string()]
            }
            Self::UnknownStage { .. } | Self::UnknownDependency { .. } => vec![
                "Register the dependency before building the execution graph".to_string(),
                "Run 'hldflow stages' to list registered stage names".to_string(),
            ],
            Self::SelfDependency { .. } => {
                vec!["Remove the stage from its own dependency list".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::StageGraph
    }
}

/// Errors raised while planning or traversing the execution graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Dependency cycle detected among stages: {}", stages.join(", "))]
    Cycle { stages: Vec<String> },

    #[error("Stage '{stage}' is registered before its dependency '{dependency}'")]
    OrderViolation { stage: String, dependency: String },

    #[error("No runnable stage while {} remain pending", pending.join(", "))]
    Stalled { pending: Vec<String> },

    #[error("Pipeline has no registered stages")]
    EmptyPipeline,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl UserFriendlyError for GraphError {
    fn user_message(&self) -> String {
        match self {
            Self::Registry(inner) => inner.user_message(),
            other => other.to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::OrderViolation { .. } => Some(
                "Sequential strategies traverse stages in registration order, so dependencies must be registered first."
                    .to_string(),
            ),
            Self::Stalled { .. } => Some(
                "The conditional strategy could neither run nor skip any pending stage."
                    .to_string(),
            ),
            Self::Registry(inner) => inner.context(),
            _ => Some("Stages and their declared dependencies must form a DAG.".to_string()),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Cycle { .. } => vec!["Break the cycle by removing one dependency".to_string()],
            Self::OrderViolation { .. } => vec![
                "Register the dependency earlier".to_string(),
                "Use the conditional strategy, which follows dependencies instead of order"
                    .to_string(),
            ],
            Self::Stalled { .. } => vec![
                "Inspect the state file with 'hldflow status'".to_string(),
                "Reset stages left in 'running' with 'hldflow resume --reset <stage>'".to_string(),
            ],
            Self::EmptyPipeline => vec!["Register at least one stage".to_string()],
            Self::Registry(inner) => inner.suggestions(),
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::StageGraph
    }
}

/// Illegal operations on pipeline state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid status transition for stage '{stage}': {from} -> {to}")]
    InvalidTransition {
        stage: String,
        from: StageStatus,
        to: StageStatus,
    },

    #[error("Stage '{stage}' has no entry in the pipeline state")]
    UnknownStage { stage: String },

    #[error("Stage '{stage}' cannot be retried from status {status}")]
    NotRetryable { stage: String, status: StageStatus },

    #[error("Stage '{stage}' was left running by an interrupted run")]
    LeftRunning { stage: String },
}

impl UserFriendlyError for StateError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        Some(
            "Stages move pending -> running -> completed|failed, or pending -> skipped. Failed stages only re-run after an explicit reset or retry request."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidTransition { stage, .. } => {
                vec![format!("Reset the stage first: hldflow resume --reset {stage}")]
            }
            Self::UnknownStage { .. } => {
                vec!["Check the stage name against 'hldflow stages'".to_string()]
            }
            Self::NotRetryable { .. } => {
                vec!["Only failed stages can be retried; use --reset for other statuses".to_string()]
            }
            Self::LeftRunning { stage } => vec![
                format!("Reset the stage before resuming: hldflow resume --reset {stage}"),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::StateTransition
    }
}

/// Problems with the source document handed to a run.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Input file must be a PDF: {path}")]
    NotPdf { path: PathBuf },

    #[error("Input file does not exist: {path}")]
    NotFound { path: PathBuf },

    #[error("Cannot derive a run identity from {path}")]
    NoFileStem { path: PathBuf },

    #[error("Invalid run identity: {0}")]
    Identity(#[from] IdentityError),
}

impl UserFriendlyError for InputError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        Some("The run identity is derived from the requirement document's file name.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::NotPdf { .. } => vec!["Pass a requirement document ending in .pdf".to_string()],
            Self::NotFound { .. } => vec!["Check the path and working directory".to_string()],
            Self::NoFileStem { .. } | Self::Identity(_) => vec![
                "Rename the document so its name contains letters or digits".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Input
    }
}

/// Top-level infrastructure error.
#[derive(Error, Debug)]
pub enum HldError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Stage registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Execution graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Pipeline state error: {0}")]
    State(#[from] StateError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Failed to persist state at {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UserFriendlyError for HldError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Registry(e) => e.user_message(),
            Self::Graph(e) => e.user_message(),
            Self::State(e) => e.user_message(),
            Self::Input(e) => e.user_message(),
            Self::Persistence { path, reason } => {
                format!("Could not read or write the state file {path}: {reason}")
            }
            Self::Io(e) => format!("File system operation failed: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Registry(e) => e.context(),
            Self::Graph(e) => e.context(),
            Self::State(e) => e.context(),
            Self::Input(e) => e.context(),
            Self::Persistence { .. } => {
                Some("State files are canonical JSON written atomically.".to_string())
            }
            Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Registry(e) => e.suggestions(),
            Self::Graph(e) => e.suggestions(),
            Self::State(e) => e.suggestions(),
            Self::Input(e) => e.suggestions(),
            Self::Persistence { .. } => vec![
                "Check that the directory exists and is writable".to_string(),
                "Check that the file was produced by 'hldflow run --state-out'".to_string(),
            ],
            Self::Io(_) => vec!["Check file permissions and available disk space".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Registry(e) => e.category(),
            Self::Graph(e) => e.category(),
            Self::State(e) => e.category(),
            Self::Input(e) => e.category(),
            Self::Persistence { .. } | Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

impl HldError {
    /// Format the message, context, and suggestions for terminal output.
    ///
    /// ```text
    /// Error: <user message>
    ///
    /// Context: <context if available>
    ///
    /// Suggestions:
    ///   • <suggestion 1>
    /// ```
    #[must_use]
    pub fn display_for_user(&self) -> String {
        render_for_user(self)
    }

    /// Map this error to the CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            Self::Input(_) => ExitCode::INPUT,
            Self::State(
                StateError::InvalidTransition { .. }
                | StateError::NotRetryable { .. }
                | StateError::LeftRunning { .. },
            ) => ExitCode::CLI_ARGS,
            _ => ExitCode::INTERNAL,
        }
    }
}

/// Shared renderer for any [`UserFriendlyError`].
#[must_use]
pub fn render_for_user<E: UserFriendlyError + ?Sized>(err: &E) -> String {
    let mut output = format!("Error: {}\n", err.user_message());

    if let Some(ctx) = err.context() {
        output.push_str(&format!("\nContext: {ctx}\n"));
    }

    let suggestions = err.suggestions();
    if !suggestions.is_empty() {
        output.push_str("\nSuggestions:\n");
        for suggestion in suggestions {
            output.push_str(&format!("  • {suggestion}\n"));
        }
    }

    output
}

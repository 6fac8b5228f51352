use thiserror::Error;

use hldflow_stage_api::PipelineState;
use hldflow_utils::error::{
    ConfigError, ErrorCategory, GraphError, HldError, InputError, RegistryError, StateError,
    UserFriendlyError, render_for_user,
};
use hldflow_utils::exit_codes::ExitCode;

/// Failures raised by a run instead of being recorded in the state.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Hld(#[from] HldError),

    /// The run deadline expired while `stage` was executing. The state is
    /// handed back with that stage still `running`.
    #[error("Run deadline of {timeout_secs}s expired while stage '{stage}' was running")]
    RunTimedOut {
        stage: String,
        timeout_secs: u64,
        state: Box<PipelineState>,
    },
}

macro_rules! via_hld_error {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for OrchestratorError {
                fn from(err: $source) -> Self {
                    Self::Hld(HldError::from(err))
                }
            }
        )*
    };
}

via_hld_error!(ConfigError, RegistryError, GraphError, StateError, InputError);

impl OrchestratorError {
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Hld(err) => err.to_exit_code(),
            Self::RunTimedOut { .. } => ExitCode::RUN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn display_for_user(&self) -> String {
        render_for_user(self)
    }

    /// The partial state, when the error carries one.
    #[must_use]
    pub fn into_state(self) -> Option<PipelineState> {
        match self {
            Self::RunTimedOut { state, .. } => Some(*state),
            Self::Hld(_) => None,
        }
    }
}

impl UserFriendlyError for OrchestratorError {
    fn user_message(&self) -> String {
        match self {
            Self::Hld(err) => err.user_message(),
            Self::RunTimedOut { stage, timeout_secs, .. } => {
                format!("The run was aborted after {timeout_secs}s while '{stage}' was running")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Hld(err) => err.context(),
            Self::RunTimedOut { .. } => Some(
                "A deadline abort is not a stage failure: the interrupted stage stays 'running'."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Hld(err) => err.suggestions(),
            Self::RunTimedOut { stage, .. } => vec![
                "Raise [pipeline] run_timeout_secs or remove it".to_string(),
                format!("Resume with 'hldflow resume <STATE> --reset {stage}'"),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Hld(err) => err.category(),
            Self::RunTimedOut { .. } => ErrorCategory::Timeout,
        }
    }
}

//! Stage backed by an external analyzer process.
//!
//! Protocol, per invocation:
//! - the stage name is appended as the last argument
//! - stdin receives `{stage, identity, input, configuration, results}` as JSON
//! - stdout must be a single JSON object, which becomes the stage result
//! - a top-level `"_warnings"` array is moved into the run's warnings
//! - the stage's credential, if any, is exported as [`CREDENTIAL_ENV_VAR`]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use hldflow_stage_api::{
    CredentialProvider, PipelineState, Stage, StageDescriptor, StageError, StageOutput,
};
use hldflow_utils::error::ConfigError;

/// Environment variable carrying the stage's credential.
pub const CREDENTIAL_ENV_VAR: &str = "HLDFLOW_STAGE_CREDENTIAL";

/// Key in the analyzer's output object whose entries become warnings.
const WARNINGS_KEY: &str = "_warnings";

/// Stderr kept in failure messages.
const MAX_STDERR_BYTES: usize = 2048;

pub struct CommandStage {
    descriptor: StageDescriptor,
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for CommandStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandStage")
            .field("name", &self.descriptor.name)
            .field("program", &self.program)
            .field("args", &self.args)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CommandStage {
    pub fn new(
        descriptor: StageDescriptor,
        program: impl Into<PathBuf>,
        args: Vec<String>,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            descriptor,
            program: program.into(),
            args,
            timeout,
            credentials,
        }
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn request(&self, state: &PipelineState) -> Value {
        json!({
            "stage": self.descriptor.name,
            "identity": state.identity(),
            "input": state.input(),
            "configuration": state.configuration(),
            "results": state.results(),
        })
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&self.descriptor.name)
            .env_remove(CREDENTIAL_ENV_VAR)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match self.credentials.credential_for(&self.descriptor.name) {
            Some(credential) => {
                cmd.env(CREDENTIAL_ENV_VAR, credential.expose());
            }
            None => {
                tracing::debug!(stage = %self.descriptor.name, "no credential configured");
            }
        }
        cmd
    }
}

/// Locate the analyzer program: explicit paths must exist, bare names are
/// searched on `PATH`.
///
/// # Errors
///
/// [`ConfigError::InvalidValue`] for `analyzer.command` when nothing is found.
pub fn resolve_program(command: &str) -> Result<PathBuf, ConfigError> {
    let not_found = || ConfigError::InvalidValue {
        key: "analyzer.command".to_string(),
        value: format!("{command} (not found)"),
    };

    let path = Path::new(command);
    if path.components().count() > 1 {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(not_found())
        };
    }
    which::which(command).map_err(|_| not_found())
}

fn parse_output(stdout: &[u8]) -> Result<StageOutput, StageError> {
    let value: Value = serde_json::from_slice(stdout)
        .map_err(|e| StageError::InvalidOutput(format!("stdout is not JSON: {e}")))?;
    let Value::Object(mut payload) = value else {
        return Err(StageError::InvalidOutput(
            "stdout must be a JSON object".to_string(),
        ));
    };

    let warnings = match payload.remove(WARNINGS_KEY) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(text) => text,
                other => other.to_string(),
            })
            .collect(),
        Some(other) => vec![other.to_string()],
    };

    Ok(StageOutput {
        payload: Value::Object(payload),
        warnings,
    })
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= MAX_STDERR_BYTES {
        return text.to_string();
    }
    let mut cut = MAX_STDERR_BYTES;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... [truncated]", &text[..cut])
}

#[async_trait]
impl Stage for CommandStage {
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, StageError> {
        let request = serde_json::to_vec(&self.request(state))
            .map_err(|e| StageError::Command(format!("failed to encode request: {e}")))?;

        let mut child = self.build_command().spawn().map_err(|e| {
            StageError::Command(format!("failed to spawn {}: {e}", self.program.display()))
        })?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&request).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        // Dropping the child on timeout kills it.
        let (fed, output) = tokio::time::timeout(self.timeout, async {
            tokio::join!(feed, child.wait_with_output())
        })
        .await
        .map_err(|_| StageError::Timeout {
            seconds: self.timeout.as_secs(),
        })?;

        if let Err(e) = fed {
            tracing::debug!(stage = %self.descriptor.name, error = %e, "analyzer did not read its request");
        }
        let output = output.map_err(|e| StageError::Command(e.to_string()))?;

        if !output.status.success() {
            let stderr = stderr_excerpt(&output.stderr);
            return Err(StageError::Command(if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                format!("exited with {}: {stderr}", output.status)
            }));
        }

        parse_output(&output.stdout)
    }
}

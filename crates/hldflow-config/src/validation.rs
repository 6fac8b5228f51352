use hldflow_utils::error::ConfigError;

use super::{
    Config, MAX_ANALYZER_TIMEOUT_SECS, MAX_RUN_TIMEOUT_SECS, MIN_TIMEOUT_SECS,
};

impl Config {
    /// Validate configuration values
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(secs) = self.pipeline.run_timeout_secs {
            check_range("run_timeout_secs", secs, MAX_RUN_TIMEOUT_SECS)?;
        }

        if let Some(secs) = self.analyzer.timeout_secs {
            check_range("analyzer_timeout_secs", secs, MAX_ANALYZER_TIMEOUT_SECS)?;
        }

        if let Some(command) = &self.analyzer.command
            && command.trim().is_empty()
        {
            return Err(ConfigError::InvalidValue {
                key: "analyzer_command".to_string(),
                value: "must not be empty".to_string(),
            });
        }

        if let Some(env) = &self.credentials.fallback_env {
            check_env_name("credential_fallback_env", env)?;
        }

        for (stage, env) in &self.credentials.stages {
            if stage.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "credentials.stages".to_string(),
                    value: "stage name must not be empty".to_string(),
                });
            }
            check_env_name(&format!("credentials.stages.{stage}"), env)?;
        }

        Ok(())
    }
}

fn check_range(key: &str, secs: u64, max: u64) -> Result<(), ConfigError> {
    if secs < MIN_TIMEOUT_SECS {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: format!("must be at least {MIN_TIMEOUT_SECS} seconds"),
        });
    }
    if secs > max {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: format!("exceeds maximum limit of {max} seconds"),
        });
    }
    Ok(())
}

fn check_env_name(key: &str, name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: format!("'{name}' is not a valid environment variable name"),
        })
    }
}

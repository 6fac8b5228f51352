use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use hldflow_utils::error::ConfigError;

use super::sources::{assign, seed_default_sources};
use super::{
    AnalyzerConfig, CliArgs, Config, ConfigSource, CredentialsConfig, LoggingConfig,
    PipelineConfig, RenderConfig,
};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "HLDFLOW_CONFIG";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    pipeline: Option<PipelineConfig>,
    render: Option<RenderConfig>,
    analyzer: Option<AnalyzerConfig>,
    credentials: Option<CredentialsConfig>,
    logging: Option<LoggingConfig>,
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// File lookup order: `cli_args.config_path`, `$HLDFLOW_CONFIG`, upward
    /// search from the current directory, then the user config directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a named file is missing, a file cannot be
    /// parsed, or a value is invalid.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = std::env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("cannot read current directory: {e}"),
        })?;

        let mut args = cli_args.clone();
        if args.config_path.is_none() {
            args.config_path = std::env::var_os(CONFIG_ENV_VAR)
                .map(PathBuf::from)
                .or_else(|| match Self::discover_config_file_from(&start_dir) {
                    Some(found) => Some(found),
                    None => user_config_file(),
                });
        }

        Self::discover_from(&start_dir, &args)
    }

    /// Discover and load configuration starting from a specific directory
    ///
    /// This is the path-driven variant used by tests to avoid process-global
    /// state: it ignores `$HLDFLOW_CONFIG` and the user config directory.
    ///
    /// # Errors
    ///
    /// See [`Config::discover`].
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        seed_default_sources(&mut config.source_attribution);

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.is_file() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    });
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = config_path {
            let file_config = Self::load_config_file(&path)?;
            config.apply_file(file_config);
            config.config_path = Some(path);
        }

        config.apply_cli(cli_args)?;
        config.validate()?;

        Ok(config)
    }

    /// Search upward for `.hldflow/config.toml`, stopping at a repository root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current_dir = Some(start_dir);

        while let Some(dir) = current_dir {
            let config_path = dir.join(".hldflow").join("config.toml");
            if config_path.is_file() {
                return Some(config_path);
            }

            if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists()
            {
                break;
            }

            current_dir = dir.parent();
        }

        None
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))
    }

    fn apply_file(&mut self, file: TomlConfig) {
        let source = ConfigSource::Config;
        let attribution = &mut self.source_attribution;

        if let Some(pipeline) = file.pipeline {
            assign(&mut self.pipeline.strategy, pipeline.strategy, "strategy", source, attribution);
            assign(
                &mut self.pipeline.missing_dependency_policy,
                pipeline.missing_dependency_policy,
                "missing_dependency_policy",
                source,
                attribution,
            );
            assign(
                &mut self.pipeline.run_timeout_secs,
                pipeline.run_timeout_secs,
                "run_timeout_secs",
                source,
                attribution,
            );
        }

        if let Some(render) = file.render {
            assign(&mut self.render.render_images, render.render_images, "render_images", source, attribution);
            assign(&mut self.render.image_format, render.image_format, "image_format", source, attribution);
            assign(&mut self.render.renderer, render.renderer, "renderer", source, attribution);
            assign(&mut self.render.theme, render.theme, "theme", source, attribution);
            assign(&mut self.render.save_sources, render.save_sources, "save_sources", source, attribution);
        }

        if let Some(analyzer) = file.analyzer {
            assign(&mut self.analyzer.command, analyzer.command, "analyzer_command", source, attribution);
            assign(
                &mut self.analyzer.timeout_secs,
                analyzer.timeout_secs,
                "analyzer_timeout_secs",
                source,
                attribution,
            );
            assign(&mut self.analyzer.dry_run, analyzer.dry_run, "dry_run", source, attribution);
            if !analyzer.args.is_empty() {
                self.analyzer.args = analyzer.args;
                attribution.insert("analyzer_args".to_string(), source);
            }
        }

        if let Some(credentials) = file.credentials {
            assign(
                &mut self.credentials.fallback_env,
                credentials.fallback_env,
                "credential_fallback_env",
                source,
                attribution,
            );
            if !credentials.stages.is_empty() {
                self.credentials.stages.extend(credentials.stages);
                attribution.insert("credential_stages".to_string(), source);
            }
        }

        if let Some(logging) = file.logging {
            assign(&mut self.logging.verbose, logging.verbose, "verbose", source, attribution);
        }
    }

    fn apply_cli(&mut self, cli: &CliArgs) -> Result<(), ConfigError> {
        let source = ConfigSource::Cli;
        let attribution = &mut self.source_attribution;

        assign(
            &mut self.pipeline.strategy,
            parse_value("strategy", cli.strategy.as_deref())?,
            "strategy",
            source,
            attribution,
        );
        assign(
            &mut self.pipeline.missing_dependency_policy,
            parse_value(
                "missing_dependency_policy",
                cli.missing_dependency_policy.as_deref(),
            )?,
            "missing_dependency_policy",
            source,
            attribution,
        );
        assign(
            &mut self.pipeline.run_timeout_secs,
            cli.run_timeout_secs,
            "run_timeout_secs",
            source,
            attribution,
        );
        assign(&mut self.render.render_images, cli.render_images, "render_images", source, attribution);
        assign(
            &mut self.render.image_format,
            parse_value("image_format", cli.image_format.as_deref())?,
            "image_format",
            source,
            attribution,
        );
        assign(
            &mut self.render.renderer,
            parse_value("renderer", cli.renderer.as_deref())?,
            "renderer",
            source,
            attribution,
        );
        assign(
            &mut self.render.theme,
            parse_value("theme", cli.theme.as_deref())?,
            "theme",
            source,
            attribution,
        );
        assign(&mut self.render.save_sources, cli.save_sources, "save_sources", source, attribution);
        assign(
            &mut self.analyzer.command,
            cli.analyzer_command.clone(),
            "analyzer_command",
            source,
            attribution,
        );
        assign(&mut self.analyzer.dry_run, cli.dry_run, "dry_run", source, attribution);
        assign(&mut self.logging.verbose, cli.verbose, "verbose", source, attribution);

        Ok(())
    }
}

/// Parse an optional string option into its typed form.
pub(crate) fn parse_value<T: FromStr>(key: &str, raw: Option<&str>) -> Result<Option<T>, ConfigError> {
    raw.map(|value| {
        T::from_str(value).map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: format!("unrecognized value '{value}'"),
        })
    })
    .transpose()
}

fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("hldflow").join("config.toml"))
        .filter(|path| path.is_file())
}

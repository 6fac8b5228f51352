use std::collections::BTreeMap;
use std::time::Duration;

use hldflow_utils::error::ConfigError;
use hldflow_utils::types::{
    ImageFormat, MissingDependencyPolicy, Renderer, StrategyKind, Theme,
};

use super::sources::{assign, seed_default_sources};
use super::{Config, ConfigSource};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// Use this when embedding hldflow and the result must not depend on
    /// environment variables or config files.
    ///
    /// # Example
    ///
    /// ```rust
    /// use hldflow_config::Config;
    /// use hldflow_utils::types::StrategyKind;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .strategy(StrategyKind::Conditional)
    ///     .run_timeout(Duration::from_secs(900))
    ///     .build()
    ///     .expect("valid config");
    /// assert_eq!(config.strategy(), StrategyKind::Conditional);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for programmatic configuration of hldflow.
///
/// All values set via the builder are attributed to
/// `ConfigSource::Programmatic` in the resulting `Config`.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    strategy: Option<StrategyKind>,
    missing_dependency_policy: Option<MissingDependencyPolicy>,
    run_timeout: Option<Duration>,
    render_images: Option<bool>,
    image_format: Option<ImageFormat>,
    renderer: Option<Renderer>,
    theme: Option<Theme>,
    save_sources: Option<bool>,
    analyzer_command: Option<String>,
    analyzer_args: Vec<String>,
    analyzer_timeout: Option<Duration>,
    dry_run: Option<bool>,
    credential_fallback_env: Option<String>,
    credential_stages: BTreeMap<String, String>,
    verbose: Option<bool>,
}

impl ConfigBuilder {
    /// Create a new `ConfigBuilder` with no values set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub fn missing_dependency_policy(mut self, policy: MissingDependencyPolicy) -> Self {
        self.missing_dependency_policy = Some(policy);
        self
    }

    /// Overall run deadline. Sub-second precision is truncated.
    #[must_use]
    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn render_images(mut self, enabled: bool) -> Self {
        self.render_images = Some(enabled);
        self
    }

    #[must_use]
    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.image_format = Some(format);
        self
    }

    #[must_use]
    pub fn renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    #[must_use]
    pub fn theme(mut self, theme: Theme) -> Self {
        self.theme = Some(theme);
        self
    }

    #[must_use]
    pub fn save_sources(mut self, enabled: bool) -> Self {
        self.save_sources = Some(enabled);
        self
    }

    /// Program invoked for every stage, with its leading arguments.
    #[must_use]
    pub fn analyzer_command(
        mut self,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.analyzer_command = Some(command.into());
        self.analyzer_args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn analyzer_timeout(mut self, timeout: Duration) -> Self {
        self.analyzer_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = Some(enabled);
        self
    }

    #[must_use]
    pub fn credential_fallback_env(mut self, name: impl Into<String>) -> Self {
        self.credential_fallback_env = Some(name.into());
        self
    }

    /// Map a stage to the environment variable holding its credential.
    #[must_use]
    pub fn stage_credential_env(mut self, stage: impl Into<String>, env: impl Into<String>) -> Self {
        self.credential_stages.insert(stage.into(), env.into());
        self
    }

    #[must_use]
    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = Some(enabled);
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a value is out of range.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        seed_default_sources(&mut config.source_attribution);

        let source = ConfigSource::Programmatic;
        let attribution = &mut config.source_attribution;

        assign(&mut config.pipeline.strategy, self.strategy, "strategy", source, attribution);
        assign(
            &mut config.pipeline.missing_dependency_policy,
            self.missing_dependency_policy,
            "missing_dependency_policy",
            source,
            attribution,
        );
        assign(
            &mut config.pipeline.run_timeout_secs,
            self.run_timeout.map(|d| d.as_secs()),
            "run_timeout_secs",
            source,
            attribution,
        );
        assign(&mut config.render.render_images, self.render_images, "render_images", source, attribution);
        assign(&mut config.render.image_format, self.image_format, "image_format", source, attribution);
        assign(&mut config.render.renderer, self.renderer, "renderer", source, attribution);
        assign(&mut config.render.theme, self.theme, "theme", source, attribution);
        assign(&mut config.render.save_sources, self.save_sources, "save_sources", source, attribution);
        assign(
            &mut config.analyzer.command,
            self.analyzer_command,
            "analyzer_command",
            source,
            attribution,
        );
        assign(
            &mut config.analyzer.timeout_secs,
            self.analyzer_timeout.map(|d| d.as_secs()),
            "analyzer_timeout_secs",
            source,
            attribution,
        );
        assign(&mut config.analyzer.dry_run, self.dry_run, "dry_run", source, attribution);
        assign(
            &mut config.credentials.fallback_env,
            self.credential_fallback_env,
            "credential_fallback_env",
            source,
            attribution,
        );
        assign(&mut config.logging.verbose, self.verbose, "verbose", source, attribution);

        if !self.analyzer_args.is_empty() {
            config.analyzer.args = self.analyzer_args;
            attribution.insert("analyzer_args".to_string(), source);
        }
        if !self.credential_stages.is_empty() {
            config.credentials.stages = self.credential_stages;
            attribution.insert("credential_stages".to_string(), source);
        }

        config.validate()?;
        Ok(config)
    }
}

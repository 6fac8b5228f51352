use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use hldflow_utils::types::{
    ConfigSource, ImageFormat, MissingDependencyPolicy, Renderer, StrategyKind, Theme,
};

/// Default per-invocation timeout for analyzer commands, in seconds.
pub const DEFAULT_ANALYZER_TIMEOUT_SECS: u64 = 600;

/// Smallest accepted timeout, in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 5;

/// Largest accepted analyzer timeout (2 hours).
pub const MAX_ANALYZER_TIMEOUT_SECS: u64 = 7_200;

/// Largest accepted run deadline (24 hours).
pub const MAX_RUN_TIMEOUT_SECS: u64 = 86_400;

/// Environment variable consulted when a stage has no dedicated credential variable.
pub const DEFAULT_CREDENTIAL_FALLBACK_ENV: &str = "GEMINI_API_KEY";

/// Configuration for hldflow runs.
///
/// `Config` provides hierarchical configuration with discovery and precedence:
/// CLI arguments > config file > built-in defaults.
///
/// # Discovery
///
/// [`Config::discover()`] mirrors the CLI:
/// - an explicit `--config` path wins
/// - then the `HLDFLOW_CONFIG` environment variable
/// - then `.hldflow/config.toml` searched upward from the current directory
/// - then `<user config dir>/hldflow/config.toml`
///
/// # Configuration File Format
///
/// ```toml
/// [pipeline]
/// strategy = "conditional"
/// missing_dependency_policy = "skip"
/// run_timeout_secs = 1800
///
/// [render]
/// image_format = "svg"
/// theme = "dark"
///
/// [analyzer]
/// command = "hld-analyzer"
/// args = ["--json"]
/// timeout_secs = 300
///
/// [credentials]
/// fallback_env = "GEMINI_API_KEY"
///
/// [credentials.stages]
/// pdf_extraction = "GEMINI_API_KEY_4"
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Strategy and failure-policy settings.
    pub pipeline: PipelineConfig,
    /// Per-run rendering options handed to every stage.
    pub render: RenderConfig,
    /// External analyzer command used by stages.
    pub analyzer: AnalyzerConfig,
    /// Credential lookup settings.
    pub credentials: CredentialsConfig,
    pub logging: LoggingConfig,
    /// File the values were loaded from, if any.
    pub config_path: Option<PathBuf>,
    /// Source attribution for each setting (for status display).
    pub source_attribution: HashMap<String, ConfigSource>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub strategy: Option<StrategyKind>,
    /// Unset means the strategy's own default.
    pub missing_dependency_policy: Option<MissingDependencyPolicy>,
    /// Overall run deadline. Unset means no deadline.
    pub run_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    pub render_images: Option<bool>,
    pub image_format: Option<ImageFormat>,
    pub renderer: Option<Renderer>,
    pub theme: Option<Theme>,
    pub save_sources: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Program invoked once per stage. Unset means stages run in dry-run mode.
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
    /// Force dry-run stages even when a command is configured.
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    pub fallback_env: Option<String>,
    /// Stage name -> environment variable holding that stage's credential.
    #[serde(default)]
    pub stages: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub verbose: Option<bool>,
}

impl Config {
    #[must_use]
    pub fn strategy(&self) -> StrategyKind {
        self.pipeline.strategy.unwrap_or_default()
    }

    /// Explicitly configured policy, if any.
    #[must_use]
    pub fn missing_dependency_policy(&self) -> Option<MissingDependencyPolicy> {
        self.pipeline.missing_dependency_policy
    }

    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.pipeline.run_timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn analyzer_timeout(&self) -> Duration {
        Duration::from_secs(
            self.analyzer
                .timeout_secs
                .unwrap_or(DEFAULT_ANALYZER_TIMEOUT_SECS),
        )
    }

    /// Whether stages should run without invoking the analyzer.
    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.analyzer.dry_run.unwrap_or(false) || self.analyzer.command.is_none()
    }

    #[must_use]
    pub fn credential_fallback_env(&self) -> &str {
        self.credentials
            .fallback_env
            .as_deref()
            .unwrap_or(DEFAULT_CREDENTIAL_FALLBACK_ENV)
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.logging.verbose.unwrap_or(false)
    }

    #[must_use]
    pub fn render_images(&self) -> bool {
        self.render.render_images.unwrap_or(true)
    }

    #[must_use]
    pub fn image_format(&self) -> ImageFormat {
        self.render.image_format.unwrap_or_default()
    }

    #[must_use]
    pub fn renderer(&self) -> Renderer {
        self.render.renderer.unwrap_or_default()
    }

    #[must_use]
    pub fn theme(&self) -> Theme {
        self.render.theme.unwrap_or_default()
    }

    #[must_use]
    pub fn save_sources(&self) -> bool {
        self.render.save_sources.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.strategy(), StrategyKind::Sequential);
        assert_eq!(config.missing_dependency_policy(), None);
        assert_eq!(config.run_timeout(), None);
        assert_eq!(config.analyzer_timeout(), Duration::from_secs(600));
        assert!(config.dry_run());
        assert_eq!(config.credential_fallback_env(), "GEMINI_API_KEY");
        assert!(config.render_images());
        assert_eq!(config.image_format(), ImageFormat::Png);
        assert_eq!(config.renderer(), Renderer::Service);
        assert_eq!(config.theme(), Theme::Default);
        assert!(!config.save_sources());
    }

    #[test]
    fn test_command_disables_dry_run_unless_forced() {
        let mut config = Config::default();
        config.analyzer.command = Some("hld-analyzer".to_string());
        assert!(!config.dry_run());
        config.analyzer.dry_run = Some(true);
        assert!(config.dry_run());
    }
}

//! Shared value types used across the hldflow crates.
//!
//! Every enum here has a stable lowercase (or kebab-case) string form that is
//! used consistently by serde, `Display`, and `FromStr`, so the same spelling
//! works in config files, CLI flags, and persisted state.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};

/// Lifecycle status of a single stage within a run.
///
/// ```text
/// pending ──► running ──► completed
///                    └──► failed
/// pending ──► skipped
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    /// Whether no further execution will happen for this stage in the current run.
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Stable string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Output format for rendered diagrams.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ImageFormat {
    Svg,
    #[default]
    Png,
}

/// Which renderer produces diagram images.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Renderer {
    /// Remote rendering service.
    #[default]
    Service,
    /// Locally installed command-line renderer.
    Cli,
}

/// Diagram theme.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Theme {
    #[default]
    Default,
    Neutral,
    Dark,
}

/// Execution strategy selector.
///
/// `parallel` is accepted as an alias for `optimized-sequential` when parsing;
/// the canonical spelling is always emitted.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
    VariantNames,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum StrategyKind {
    /// Strict registration order, one stage at a time.
    #[default]
    Sequential,
    /// Registration order with dependency-free stages grouped into batches.
    #[serde(alias = "parallel")]
    #[strum(to_string = "optimized-sequential", serialize = "parallel")]
    OptimizedSequential,
    /// Dynamic routing driven by current stage status.
    Conditional,
}

impl StrategyKind {
    /// Stable string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// The dependency policy a strategy applies unless configured otherwise.
    #[must_use]
    pub fn default_missing_dependency_policy(self) -> MissingDependencyPolicy {
        match self {
            Self::Sequential | Self::OptimizedSequential => MissingDependencyPolicy::RunWithMissing,
            Self::Conditional => MissingDependencyPolicy::SkipDependents,
        }
    }
}

/// What happens to a stage whose upstream dependency failed non-critically
/// or was skipped.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
    VariantNames,
)]
pub enum MissingDependencyPolicy {
    /// Run the dependent anyway and record a warning naming the missing input.
    #[serde(rename = "run")]
    #[strum(serialize = "run")]
    RunWithMissing,
    /// Mark the dependent as skipped.
    #[serde(rename = "skip")]
    #[strum(serialize = "skip")]
    SkipDependents,
}

/// Source of a configuration value.
///
/// Indicates where a configuration value originated from in the precedence chain:
/// CLI arguments > config file > programmatic overrides > built-in defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConfigSource {
    /// Value provided via CLI argument (highest precedence).
    Cli,
    /// Value loaded from configuration file.
    Config,
    /// Value provided programmatically (e.g., `Config::builder()`).
    Programmatic,
    /// Built-in default value (lowest precedence).
    Default,
}

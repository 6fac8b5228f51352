use std::collections::{BTreeMap, HashMap};

use super::{Config, ConfigSource};

/// Keys that always carry an attribution, even when left at their default.
const ATTRIBUTED_KEYS: &[&str] = &[
    "strategy",
    "missing_dependency_policy",
    "run_timeout_secs",
    "render_images",
    "image_format",
    "renderer",
    "theme",
    "save_sources",
    "analyzer_command",
    "analyzer_timeout_secs",
    "dry_run",
    "credential_fallback_env",
    "verbose",
];

pub(crate) fn seed_default_sources(attribution: &mut HashMap<String, ConfigSource>) {
    for key in ATTRIBUTED_KEYS {
        attribution.insert((*key).to_string(), ConfigSource::Default);
    }
}

/// Overwrite `slot` when `value` is present and record where it came from.
pub(crate) fn assign<T>(
    slot: &mut Option<T>,
    value: Option<T>,
    key: &str,
    source: ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if let Some(value) = value {
        *slot = Some(value);
        attribution.insert(key.to_string(), source);
    }
}

impl Config {
    /// Effective configuration as `key -> (value, source)`, sorted by key.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut config = BTreeMap::new();

        let mut add = |key: &str, value: String| {
            let source = self
                .source_attribution
                .get(key)
                .copied()
                .unwrap_or(ConfigSource::Default);
            config.insert(key.to_string(), (value, source.to_string()));
        };

        add("strategy", self.strategy().to_string());
        add(
            "missing_dependency_policy",
            self.missing_dependency_policy().map_or_else(
                || format!("{} (strategy default)", self.strategy().default_missing_dependency_policy()),
                |policy| policy.to_string(),
            ),
        );
        add(
            "run_timeout_secs",
            self.pipeline
                .run_timeout_secs
                .map_or_else(|| "none".to_string(), |secs| secs.to_string()),
        );
        add("render_images", self.render_images().to_string());
        add("image_format", self.image_format().to_string());
        add("renderer", self.renderer().to_string());
        add("theme", self.theme().to_string());
        add("save_sources", self.save_sources().to_string());
        add(
            "analyzer_command",
            self.analyzer
                .command
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        );
        add(
            "analyzer_timeout_secs",
            self.analyzer_timeout().as_secs().to_string(),
        );
        add("dry_run", self.dry_run().to_string());
        add(
            "credential_fallback_env",
            self.credential_fallback_env().to_string(),
        );
        add("verbose", self.verbose().to_string());

        config
    }
}

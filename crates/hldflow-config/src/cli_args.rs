use std::path::PathBuf;

/// Configuration values supplied on the command line.
///
/// String-valued options are parsed during discovery so that a bad value is
/// reported as a configuration error naming the key.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub strategy: Option<String>,
    pub missing_dependency_policy: Option<String>,
    pub run_timeout_secs: Option<u64>,
    pub render_images: Option<bool>,
    pub image_format: Option<String>,
    pub renderer: Option<String>,
    pub theme: Option<String>,
    pub save_sources: Option<bool>,
    pub analyzer_command: Option<String>,
    pub dry_run: Option<bool>,
    pub verbose: Option<bool>,
}

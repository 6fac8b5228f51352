//! CLI argument definitions and parsing structures
//!
//! This module defines the command-line interface structure using clap,
//! including the main `Cli` struct and the subcommand enum.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::CliArgs;

/// hldflow - stage-graph orchestration for high-level design documents
#[derive(Parser, Debug)]
#[command(name = "hldflow")]
#[command(about = "Run the design-document pipeline over a requirements PDF")]
#[command(long_about = r#"
hldflow routes one shared pipeline state through a fixed graph of stages
(extraction, security analysis, domain modeling, behavior analysis, diagram
generation, output composition) and reports whether the run succeeded,
degraded, or aborted.

EXAMPLES:
  # Run every stage sequentially
  hldflow run requirements.pdf --state-out run.json

  # Group independent analysis stages
  hldflow run requirements.pdf --strategy optimized-sequential

  # Resume a saved run, re-running one failed optional stage
  hldflow resume run.json --retry auth_integrations

  # Inspect a saved run
  hldflow status run.json --json

  # Show the stage graph for a strategy
  hldflow stages --strategy conditional

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  The config file is discovered by searching upward from CWD for .hldflow/config.toml
  Use --config (or HLDFLOW_CONFIG) to specify an explicit config file path

EXIT CODES:
  0 success, 1 internal error, 2 invalid arguments or configuration,
  3 invalid input, 4 degraded run, 5 aborted run, 10 run deadline expired
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline over a requirements PDF
    ///
    /// EXAMPLES:
    ///   hldflow run requirements.pdf
    ///   hldflow run requirements.pdf --strategy conditional --state-out run.json
    ///   hldflow run requirements.pdf --dry-run --json
    Run {
        /// Requirements document (.pdf)
        input: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,

        #[command(flatten)]
        render: RenderArgs,

        /// Write the final pipeline state to this file
        #[arg(long)]
        state_out: Option<Utf8PathBuf>,

        /// Output the run report as JSON
        #[arg(long)]
        json: bool,

        /// Use dry-run stages instead of the analyzer command
        #[arg(long)]
        dry_run: bool,
    },

    /// Continue a saved run
    ///
    /// Completed stages are kept. Use --reset to run any stage again, or
    /// --retry to re-run a failed optional stage under the conditional strategy.
    ///
    /// EXAMPLES:
    ///   hldflow resume run.json
    ///   hldflow resume run.json --reset domain_api_design
    ///   hldflow resume run.json --retry auth_integrations --state-out next.json
    Resume {
        /// State file written by 'hldflow run --state-out'
        state: Utf8PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Put a stage back to pending before resuming (repeatable)
        #[arg(long, value_name = "STAGE")]
        reset: Vec<String>,

        /// Retry a failed non-critical stage (conditional strategy only, repeatable)
        #[arg(long, value_name = "STAGE")]
        retry: Vec<String>,

        /// Where to write the resumed state (defaults to the input state file)
        #[arg(long)]
        state_out: Option<Utf8PathBuf>,

        /// Output the run report as JSON
        #[arg(long)]
        json: bool,

        /// Use dry-run stages instead of the analyzer command
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the status of a saved run
    ///
    /// EXAMPLES:
    ///   hldflow status run.json
    ///   hldflow status run.json --json
    Status {
        /// State file written by 'hldflow run --state-out'
        state: Utf8PathBuf,

        /// Output status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Describe the stage graph for a strategy
    ///
    /// EXAMPLES:
    ///   hldflow stages
    ///   hldflow stages --strategy parallel --json
    Stages {
        /// sequential | optimized-sequential (alias: parallel) | conditional
        #[arg(long)]
        strategy: Option<String>,

        /// Output workflow information as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Strategy and failure-policy flags shared by `run` and `resume`.
#[derive(Args, Debug, Clone, Default)]
pub struct PipelineArgs {
    /// sequential | optimized-sequential (alias: parallel) | conditional
    #[arg(long)]
    pub strategy: Option<String>,

    /// What a stage does when an upstream stage failed non-critically: run | skip
    #[arg(long, value_name = "POLICY")]
    pub missing_dependency_policy: Option<String>,

    /// Abort the run after this many seconds (min 5, max 86400)
    #[arg(long, value_name = "SECS")]
    pub run_timeout_secs: Option<u64>,

    /// Analyzer program invoked once per stage
    #[arg(long, value_name = "PROGRAM")]
    pub analyzer_command: Option<String>,
}

/// Per-run options recorded in the pipeline state.
#[derive(Args, Debug, Clone, Default)]
pub struct RenderArgs {
    /// Render diagram images
    #[arg(long, overrides_with = "no_render_images")]
    pub render_images: bool,

    /// Do not render diagram images
    #[arg(long, overrides_with = "render_images")]
    pub no_render_images: bool,

    /// svg | png
    #[arg(long)]
    pub image_format: Option<String>,

    /// service | cli
    #[arg(long)]
    pub renderer: Option<String>,

    /// default | neutral | dark
    #[arg(long)]
    pub theme: Option<String>,

    /// Keep intermediate diagram sources
    #[arg(long)]
    pub save_sources: bool,
}

impl Cli {
    /// Configuration overrides carried by the parsed command line.
    #[must_use]
    pub fn config_args(&self) -> CliArgs {
        let mut args = CliArgs {
            config_path: self.config.clone(),
            verbose: self.verbose.then_some(true),
            ..CliArgs::default()
        };

        match &self.command {
            Commands::Run {
                pipeline,
                render,
                dry_run,
                ..
            } => {
                pipeline.apply(&mut args);
                render.apply(&mut args);
                args.dry_run = dry_run.then_some(true);
            }
            Commands::Resume {
                pipeline, dry_run, ..
            } => {
                pipeline.apply(&mut args);
                args.dry_run = dry_run.then_some(true);
            }
            Commands::Stages { strategy, .. } => {
                args.strategy.clone_from(strategy);
            }
            Commands::Status { .. } => {}
        }
        args
    }
}

impl PipelineArgs {
    fn apply(&self, args: &mut CliArgs) {
        args.strategy.clone_from(&self.strategy);
        args.missing_dependency_policy
            .clone_from(&self.missing_dependency_policy);
        args.run_timeout_secs = self.run_timeout_secs;
        args.analyzer_command.clone_from(&self.analyzer_command);
    }
}

impl RenderArgs {
    fn apply(&self, args: &mut CliArgs) {
        args.render_images = if self.render_images {
            Some(true)
        } else if self.no_render_images {
            Some(false)
        } else {
            None
        };
        args.image_format.clone_from(&self.image_format);
        args.renderer.clone_from(&self.renderer);
        args.theme.clone_from(&self.theme);
        args.save_sources = self.save_sources.then_some(true);
    }
}

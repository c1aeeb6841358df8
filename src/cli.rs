//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap and turns the
//! flags into the highest-precedence configuration layer.

use crate::config::{
    ConfigLayer, DiffSelection, HandoffSection, ListSection, Mode, ObjectiveSection,
    OutputFormat, PluginsSection,
};
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;

/// diffrisk - deterministic regression-risk scoring for code diffs
///
/// Reads a unified diff, scores it 0-100 against the repository's risk
/// profile and prints a report. Exit code 2 when the score is above
/// --fail-above.
///
/// Examples:
///   git diff main...HEAD | diffrisk
///   diffrisk change.diff --fail-above 40 --format json
///   diffrisk change.diff --objective security_strict --mode deep
///   diffrisk change.diff --format handoff --redact-secrets --max-bytes 50000
///   diffrisk --init-config > .diffrisk.toml
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Diff file to score; reads stdin when omitted or `-`
    #[arg(value_name = "DIFF")]
    pub diff: Option<PathBuf>,

    /// Repository root searched for .diffrisk.toml or Cargo.toml metadata
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub repo: PathBuf,

    /// Path to configuration file
    ///
    /// If not specified, looks for .diffrisk.toml, diffrisk.toml, then
    /// [package.metadata.diffrisk] in Cargo.toml under --repo.
    #[arg(short, long, value_name = "FILE", env = "DIFFRISK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Fail (exit code 2) when the score is above this value
    #[arg(long, value_name = "SCORE")]
    pub fail_above: Option<i64>,

    /// Objective profile (feature_oneshot, security_strict)
    #[arg(long, value_name = "NAME", env = "DIFFRISK_OBJECTIVE")]
    pub objective: Option<String>,

    /// Analysis depth; gates which plugin cost tiers may run
    #[arg(long, value_name = "MODE")]
    pub mode: Option<Mode>,

    /// Plugin time budget in seconds
    #[arg(long, value_name = "SECS")]
    pub budget: Option<f64>,

    /// Plugins to force-enable (comma-separated)
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub enable_plugins: Option<Vec<String>>,

    /// Plugins to disable (comma-separated)
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub disable_plugins: Option<Vec<String>>,

    /// Run only these rules (comma-separated)
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub enable_rules: Option<Vec<String>>,

    /// Rules to skip (comma-separated)
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub disable_rules: Option<Vec<String>>,

    /// Paths to include (comma-separated globs)
    #[arg(long, value_name = "GLOBS", value_delimiter = ',')]
    pub include: Option<Vec<String>>,

    /// Paths to exclude (comma-separated globs)
    ///
    /// Example: --exclude "vendor/**,*.lock"
    #[arg(long, value_name = "GLOBS", value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Output format
    #[arg(long, value_name = "FORMAT", env = "DIFFRISK_FORMAT")]
    pub format: Option<OutputFormat>,

    /// Byte budget for the handoff diff
    #[arg(long, value_name = "BYTES")]
    pub max_bytes: Option<usize>,

    /// Mask secret-like text in handoff output
    #[arg(long)]
    pub redact_secrets: bool,

    /// Diff slice carried by the handoff payload
    #[arg(long, value_name = "WHICH")]
    pub include_diff: Option<DiffSelection>,

    /// Dry run: schedule plugins and score rules without executing plugins
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (warnings and errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Print a commented default configuration and exit
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref path) = self.diff {
            if path.as_os_str() != "-" && !path.is_file() {
                return Err(format!("Diff file does not exist: {}", path.display()));
            }
        }

        if !self.repo.is_dir() {
            return Err(format!(
                "Repository directory does not exist: {}",
                self.repo.display()
            ));
        }

        Ok(())
    }

    /// Diff path to read, `None` for stdin.
    pub fn diff_path(&self) -> Option<&PathBuf> {
        self.diff.as_ref().filter(|p| p.as_os_str() != "-")
    }

    /// Build the override layer from the flags that were actually given.
    pub fn override_layer(&self) -> ConfigLayer {
        ConfigLayer {
            fail_above: self.fail_above,
            format: self.format,
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            rules: ListSection {
                enable: self.enable_rules.clone(),
                disable: self.disable_rules.clone(),
            },
            objective: ObjectiveSection {
                name: self.objective.clone(),
                mode: self.mode.map(|m| m.to_string()),
                budget_seconds: self.budget,
                ..Default::default()
            },
            plugins: PluginsSection {
                enable: self.enable_plugins.clone(),
                disable: self.disable_plugins.clone(),
                ..Default::default()
            },
            handoff: HandoffSection {
                max_bytes: self.max_bytes,
                redact_secrets: self.redact_secrets.then_some(true),
                include_diff: self.include_diff,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Get the log level based on verbosity flags.
    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::WARN
        } else {
            Level::INFO
        }
    }
}

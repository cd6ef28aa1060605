// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Start the registry service (default)
//! - `validate`: Validate configuration file
//! - `replay`: Feed recorded discovery results through the registry
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// census - OPC UA discovery registry
///
/// Keeps the registry of OPC UA applications, endpoints and twins in sync
/// with discovery sweeps reported by discoverer modules.
#[derive(Parser, Debug)]
#[command(
    name = "census",
    author = "Sylvex <contact@sylvex.io>",
    version = census_core::VERSION,
    about = "OPC UA discovery registry",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "census.yaml",
        env = "CENSUS_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Enable quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands for the census CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the registry service
    ///
    /// This is the default command when no subcommand is specified.
    Run(RunArgs),

    /// Validate the configuration file
    ///
    /// Parses and validates the configuration file without starting the service.
    Validate(ValidateArgs),

    /// Replay recorded discovery results
    ///
    /// Reads discovery results (a JSON array or one JSON object per line),
    /// runs them through the sweep processor against an empty registry and
    /// prints the resulting counters.
    Replay(ReplayArgs),

    /// Show detailed version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Seconds between metrics log lines (0 disables)
    #[arg(long, default_value = "60", env = "CENSUS_METRICS_INTERVAL")]
    pub metrics_interval: u64,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Strict mode: treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the `replay` command.
#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// File holding the recorded discovery results
    pub input: PathBuf,

    /// Output format for the replay report
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<census_config::LogFormat> for LogFormat {
    fn from(format: census_config::LogFormat) -> Self {
        match format {
            census_config::LogFormat::Text => LogFormat::Text,
            census_config::LogFormat::Json => LogFormat::Json,
            census_config::LogFormat::Compact => LogFormat::Compact,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs { metrics_interval: 60 }))
    }

    /// Check if verbose logging is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    /// Effective log level: flags first, then `--log-level`, then `configured`.
    pub fn effective_log_level<'a>(&'a self, configured: &'a str) -> &'a str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            self.log_level.as_deref().unwrap_or(configured)
        }
    }

    /// Effective log format: `--log-format` if given, else `configured`.
    pub fn effective_log_format(&self, configured: census_config::LogFormat) -> LogFormat {
        self.log_format.unwrap_or_else(|| configured.into())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["census"]);
        assert!(cli.command.is_none());
        match cli.effective_command() {
            Commands::Run(args) => assert_eq!(args.metrics_interval, 60),
            other => panic!("Expected Run command, got {:?}", other),
        }
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["census", "run", "--metrics-interval", "5"]);
        if let Some(Commands::Run(args)) = cli.command {
            assert_eq!(args.metrics_interval, 5);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["census", "validate", "--show-config", "-f", "json"]);
        if let Some(Commands::Validate(args)) = cli.command {
            assert!(args.show_config);
            assert_eq!(args.format, OutputFormat::Json);
        } else {
            panic!("Expected Validate command");
        }
    }

    #[test]
    fn test_replay_command() {
        let cli = Cli::parse_from(["census", "replay", "sweeps.jsonl"]);
        if let Some(Commands::Replay(args)) = cli.command {
            assert_eq!(args.input, PathBuf::from("sweeps.jsonl"));
        } else {
            panic!("Expected Replay command");
        }
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["census", "-c", "/etc/census/census.yaml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/census/census.yaml"));
    }

    #[test]
    fn test_log_level_falls_back_to_config() {
        let cli = Cli::parse_from(["census"]);
        assert_eq!(cli.effective_log_level("warn"), "warn");

        let cli = Cli::parse_from(["census", "-l", "debug"]);
        assert_eq!(cli.effective_log_level("warn"), "debug");
    }

    #[test]
    fn test_quiet_and_verbose() {
        let cli = Cli::parse_from(["census", "-q"]);
        assert_eq!(cli.effective_log_level("info"), "warn");

        let cli = Cli::parse_from(["census", "-v"]);
        assert!(cli.is_verbose());
        assert_eq!(cli.effective_log_level("info"), "debug");
    }

    #[test]
    fn test_log_format_override() {
        let cli = Cli::parse_from(["census"]);
        assert_eq!(cli.effective_log_format(census_config::LogFormat::Json), LogFormat::Json);

        let cli = Cli::parse_from(["census", "--log-format", "compact"]);
        assert_eq!(cli.effective_log_format(census_config::LogFormat::Json), LogFormat::Compact);
    }
}

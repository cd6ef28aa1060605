// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the census binary.
//!
//! Exit codes:
//!
//! | Code | Failure                                      |
//! |------|----------------------------------------------|
//! | 1    | configuration could not be loaded or passed  |
//! | 2    | startup (logging, bus subscription)          |
//! | 3    | replayed results failed, report rendering    |
//! | 4    | replay input unreadable or malformed         |

use std::path::{Path, PathBuf};

use census_config::ConfigError;
use thiserror::Error;

/// Result type alias for census-bin operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors that end a census command.
#[derive(Debug, Error)]
pub enum BinError {
    /// The configuration file could not be loaded.
    #[error("Failed to load configuration from {path}")]
    ConfigLoad {
        /// Configuration file.
        path: PathBuf,
        /// Loader failure.
        #[source]
        source: ConfigError,
    },

    /// The configuration loaded but the command refuses it.
    #[error("Configuration rejected: {0}")]
    ConfigRejected(String),

    /// The service could not start.
    #[error("Startup failed: {0}")]
    Startup(String),

    /// The replay input could not be read.
    #[error("Failed to read replay input {path}: {source}")]
    ReplayRead {
        /// Input file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A replay input record is not a discovery result.
    #[error("Invalid discovery result at {location}: {source}")]
    ReplayRecord {
        /// `path` for an array document, `path:line` for JSON lines.
        location: String,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },

    /// Some replayed results failed to process.
    #[error("{failed} replayed result(s) failed to process")]
    ReplayFailed {
        /// Number of failed results.
        failed: usize,
    },

    /// A report could not be rendered.
    #[error("Failed to render report: {0}")]
    Render(#[source] serde_json::Error),
}

impl BinError {
    /// Wraps a loader failure for `path`.
    pub fn config_load(path: impl Into<PathBuf>, source: ConfigError) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            source,
        }
    }

    /// Creates a startup error.
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }

    /// Creates a malformed record error for line `line` of `path`, or for the
    /// whole document when `line` is `None`.
    pub fn replay_record(path: &Path, line: Option<usize>, source: serde_json::Error) -> Self {
        let location = match line {
            Some(line) => format!("{}:{}", path.display(), line),
            None => path.display().to_string(),
        };
        Self::ReplayRecord { location, source }
    }

    /// Returns the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigLoad { .. } | Self::ConfigRejected(_) => 1,
            Self::Startup(_) => 2,
            Self::ReplayFailed { .. } | Self::Render(_) => 3,
            Self::ReplayRead { .. } | Self::ReplayRecord { .. } => 4,
        }
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Reports an error with its cause chain.
pub fn report_error(error: &BinError) {
    eprintln!("Error: {}", error);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }
    if let BinError::ConfigLoad { source, .. } = error {
        eprintln!("  Kind: {}", source.error_type());
    }
}

/// Reports an error and exits with the appropriate code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load_keeps_loader_cause() {
        let err = BinError::config_load(
            "census.yaml",
            ConfigError::invalid_override("CENSUS_BUS_CAPACITY", "lots", "a non-negative number"),
        );
        assert_eq!(err.to_string(), "Failed to load configuration from census.yaml");
        let cause = std::error::Error::source(&err).unwrap();
        assert!(cause.to_string().contains("CENSUS_BUS_CAPACITY"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_replay_record_location() {
        let source = serde_json::from_str::<u32>("x").unwrap_err();
        let err = BinError::replay_record(Path::new("sweeps.jsonl"), Some(7), source);
        assert!(err.to_string().starts_with("Invalid discovery result at sweeps.jsonl:7: "));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::ConfigRejected("strict".into()).exit_code(), 1);
        assert_eq!(BinError::startup("test").exit_code(), 2);
        assert_eq!(BinError::ReplayFailed { failed: 2 }.exit_code(), 3);
    }
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors raised while loading the census service configuration.
//!
//! Loading runs in four stages and each has its own failure:
//!
//! ```text
//!   read file ──▶ resolve ${VAR} ──▶ deserialize ──▶ CENSUS_* overrides ──▶ validate
//!   NotFound      UnresolvedPlaceholder  Syntax        InvalidOverride        Validation
//!   Read
//!   UnsupportedFormat
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {path}")]
    NotFound {
        /// Requested path.
        path: PathBuf,
    },

    /// The configuration file exists but could not be read.
    #[error("Failed to read configuration file '{path}': {source}")]
    Read {
        /// Requested path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension names no supported format.
    #[error("Unsupported configuration format '{extension}' (expected yaml, toml or json)")]
    UnsupportedFormat {
        /// Extension as found on the path.
        extension: String,
    },

    /// A `${VAR}` placeholder without default names an unset variable.
    #[error("Placeholder '${{{name}}}' has no value and no default")]
    UnresolvedPlaceholder {
        /// Variable name.
        name: String,
    },

    /// The document does not match the configuration schema.
    #[error("Invalid configuration in {origin}: {message}")]
    Syntax {
        /// File path, or the format name for inline documents.
        origin: String,
        /// Deserializer message.
        message: String,
    },

    /// A `CENSUS_*` override carries a value of the wrong kind.
    #[error("Invalid override {name}='{value}': expected {expected}")]
    InvalidOverride {
        /// Full variable name, prefix included.
        name: String,
        /// Value as read from the environment.
        value: String,
        /// What the setting accepts.
        expected: &'static str,
    },

    /// A setting failed validation.
    #[error("Invalid setting '{field}': {message}")]
    Validation {
        /// Dotted path of the setting.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigError {
    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error for a number outside `min..=max`.
    pub fn out_of_bounds<T: std::fmt::Display>(field: impl Into<String>, value: T, min: T, max: T) -> Self {
        Self::validation(field, format!("{} is outside {}..={}", value, min, max))
    }

    /// Creates a syntax error.
    pub fn syntax(origin: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Syntax {
            origin: origin.into(),
            message: message.to_string(),
        }
    }

    /// Creates an invalid override error.
    pub fn invalid_override(name: impl Into<String>, value: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidOverride {
            name: name.into(),
            value: value.into(),
            expected,
        }
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            ConfigError::NotFound { .. } => "not_found",
            ConfigError::Read { .. } => "read",
            ConfigError::UnsupportedFormat { .. } => "unsupported_format",
            ConfigError::UnresolvedPlaceholder { .. } => "unresolved_placeholder",
            ConfigError::Syntax { .. } => "syntax",
            ConfigError::InvalidOverride { .. } => "invalid_override",
            ConfigError::Validation { .. } => "validation",
        }
    }
}

/// A Result type with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_setting() {
        let error = ConfigError::out_of_bounds("registry.backoff.multiplier", 0.5, 1.0, 10.0);
        assert_eq!(error.error_type(), "validation");
        assert_eq!(
            error.to_string(),
            "Invalid setting 'registry.backoff.multiplier': 0.5 is outside 1..=10"
        );

        let error = ConfigError::invalid_override("CENSUS_BUS_CAPACITY", "lots", "a non-negative number");
        assert_eq!(
            error.to_string(),
            "Invalid override CENSUS_BUS_CAPACITY='lots': expected a non-negative number"
        );
    }

    #[test]
    fn test_placeholder_message_shows_variable() {
        let error = ConfigError::UnresolvedPlaceholder {
            name: "PLANT_ID".to_string(),
        };
        assert_eq!(error.to_string(), "Placeholder '${PLANT_ID}' has no value and no default");
        assert_eq!(error.error_type(), "unresolved_placeholder");
    }
}

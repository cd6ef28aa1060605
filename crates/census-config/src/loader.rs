// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading for census.
//!
//! # Loading Pipeline
//!
//! 1. Read the file; the extension selects YAML, TOML or JSON
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders in the raw text
//! 3. Parse into [`CensusConfig`]
//! 4. Apply `CENSUS_*` environment overrides
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! CENSUS_INSTANCE_ID=census-eu-1
//! CENSUS_AUTHORITY_ID=census-eu
//! CENSUS_LOG_LEVEL=debug
//! CENSUS_LOG_FORMAT=json
//! CENSUS_BUS_CAPACITY=4096
//! CENSUS_MAX_SWEEP_RESULTS=50000
//! CENSUS_MAX_PENDING_SWEEPS=64
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{CensusConfig, LogFormat, LogLevel};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader for census.
///
/// # Examples
///
/// ```no_run
/// use census_config::loader::ConfigLoader;
///
/// let loader = ConfigLoader::new();
/// let config = loader.load("census.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve placeholders and apply overrides.
    resolve_env_vars: bool,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            env_prefix: "CENSUS".to_string(),
            resolve_env_vars: true,
        }
    }

    /// Creates a builder for configuring the loader.
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::new()
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The file format is determined by the file extension:
    /// - `.yaml` or `.yml` - YAML format
    /// - `.toml` - TOML format
    /// - `.json` - JSON format
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<CensusConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let format = ConfigFormat::from_path(path)?;
        let content = self.read_file(path)?;
        let content = if self.resolve_env_vars {
            resolve_placeholders(&content, |name| env::var(name).ok())?
        } else {
            content
        };

        let mut config = parse_str(&content, format, &path.display().to_string())?;

        if self.resolve_env_vars {
            self.apply_overrides(&mut config, |name| env::var(name).ok())?;
        }
        config.validate()?;

        info!("Configuration loaded successfully");
        debug!(
            instance_id = %config.service.instance_id,
            max_sweep_results = config.registry.max_sweep_results,
            bus_capacity = config.bus.capacity,
            "Effective configuration"
        );
        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<CensusConfig> {
        let content = if self.resolve_env_vars {
            resolve_placeholders(content, |name| env::var(name).ok())?
        } else {
            content.to_string()
        };
        let origin = format!("inline {}", format.extension());
        let mut config = parse_str(&content, format, &origin)?;
        if self.resolve_env_vars {
            self.apply_overrides(&mut config, |name| env::var(name).ok())?;
        }
        config.validate()?;
        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::NotFound { path: path.to_path_buf() });
        }
        fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `<PREFIX>_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&self, config: &mut CensusConfig, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |suffix: &str| format!("{}_{}", self.env_prefix, suffix);

        if let Some(value) = lookup(&key("INSTANCE_ID")) {
            config.service.instance_id = value;
        }
        if let Some(value) = lookup(&key("AUTHORITY_ID")) {
            config.service.authority_id = value;
        }
        if let Some(value) = lookup(&key("LOG_LEVEL")) {
            config.logging.level = LogLevel::parse(&value)
                .ok_or_else(|| ConfigError::invalid_override(key("LOG_LEVEL"), value, "a log level"))?;
        }
        if let Some(value) = lookup(&key("LOG_FORMAT")) {
            config.logging.format = LogFormat::parse(&value)
                .ok_or_else(|| ConfigError::invalid_override(key("LOG_FORMAT"), value, "text, compact or json"))?;
        }
        if let Some(value) = lookup(&key("BUS_CAPACITY")) {
            config.bus.capacity = parse_number(&key("BUS_CAPACITY"), &value)?;
        }
        if let Some(value) = lookup(&key("MAX_SWEEP_RESULTS")) {
            config.registry.max_sweep_results = parse_number(&key("MAX_SWEEP_RESULTS"), &value)?;
        }
        if let Some(value) = lookup(&key("MAX_PENDING_SWEEPS")) {
            config.registry.max_pending_sweeps = parse_number(&key("MAX_PENDING_SWEEPS"), &value)?;
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigLoaderBuilder
// =============================================================================

/// Builder for ConfigLoader.
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    env_prefix: Option<String>,
    resolve_env_vars: Option<bool>,
}

impl ConfigLoaderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the environment prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn resolve_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = Some(enabled);
        self
    }

    /// Builds the ConfigLoader.
    pub fn build(self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();
        if let Some(prefix) = self.env_prefix {
            loader.env_prefix = prefix;
        }
        if let Some(resolve_env_vars) = self.resolve_env_vars {
            loader.resolve_env_vars = resolve_env_vars;
        }
        loader
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::UnsupportedFormat {
                extension: other.to_string(),
            }),
            None => Err(ConfigError::UnsupportedFormat {
                extension: String::new(),
            }),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Replaces `${VAR}` and `${VAR:default}` placeholders.
///
/// An unterminated placeholder is kept verbatim. A variable that is unset and
/// has no default fails with `UnresolvedPlaceholder`.
pub fn resolve_placeholders<F>(content: &str, lookup: F) -> ConfigResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' || chars.peek() != Some(&'{') {
            result.push(c);
            continue;
        }
        chars.next();

        let mut var_content = String::new();
        let mut found_close = false;
        for c in chars.by_ref() {
            if c == '}' {
                found_close = true;
                break;
            }
            var_content.push(c);
        }

        if !found_close {
            result.push_str("${");
            result.push_str(&var_content);
            continue;
        }

        let (var_name, default_value) = match var_content.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (var_content.as_str(), None),
        };
        match (lookup(var_name), default_value) {
            (Some(value), _) => result.push_str(&value),
            (None, Some(default)) => result.push_str(default),
            (None, None) => {
                warn!("Environment variable '{}' not found", var_name);
                return Err(ConfigError::UnresolvedPlaceholder {
                    name: var_name.to_string(),
                });
            }
        }
    }

    Ok(result)
}

fn parse_str(content: &str, format: ConfigFormat, origin: &str) -> ConfigResult<CensusConfig> {
    match format {
        ConfigFormat::Yaml => yaml_parse(content, origin),
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::syntax(origin, e)),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::syntax(origin, e)),
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid_override(name, value, "a non-negative number"))
}

/// YAML parsing through the config crate.
fn yaml_parse(content: &str, origin: &str) -> ConfigResult<CensusConfig> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::syntax(origin, e))?;

    config.try_deserialize().map_err(|e| ConfigError::syntax(origin, e))
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<CensusConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<CensusConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for census.
//!
//! # Schema Structure
//!
//! ```text
//! CensusConfig
//! ├── service: ServiceConfig
//! ├── store: StoreSettings
//! ├── registry: RegistrySettings
//! │   └── backoff: BackoffSettings
//! ├── bus: BusSettings
//! └── logging: LoggingConfig
//! ```
//!
//! Every section is optional in the file; missing fields take the defaults
//! below.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Constants
// =============================================================================

/// Default query page size.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default upper bound of a requested page size.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 1000;

/// Default largest sweep accepted for reconciliation.
pub const DEFAULT_MAX_SWEEP_RESULTS: usize = 10_000;

/// Default number of sweeps buffered at once.
pub const DEFAULT_MAX_PENDING_SWEEPS: usize = 256;

/// Default bus capacity per subscriber.
pub const DEFAULT_BUS_CAPACITY: usize = 16_384;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default time a routed discovery request stays pending, in seconds.
pub const DEFAULT_PENDING_REQUEST_TTL_SECS: u64 = 3600;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for census.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CensusConfig {
    /// Service identity.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Document store settings.
    #[serde(default)]
    pub store: StoreSettings,

    /// Registry engine settings.
    #[serde(default)]
    pub registry: RegistrySettings,

    /// Event bus settings.
    #[serde(default)]
    pub bus: BusSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CensusConfig {
    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.service.validate()?;
        self.store.validate()?;
        self.registry.validate()?;
        self.bus.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

// =============================================================================
// Service Configuration
// =============================================================================

/// Service identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Instance identifier used in logs.
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    /// Authority attached to mutations the service originates itself.
    #[serde(default = "default_authority_id")]
    pub authority_id: String,

    /// Time allowed for graceful shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_instance_id() -> String {
    "census-01".to_string()
}

fn default_authority_id() -> String {
    "census".to_string()
}

fn default_shutdown_timeout() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

impl ServiceConfig {
    /// Validates the service configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.instance_id.trim().is_empty() {
            return Err(ConfigError::validation("service.instance_id", "cannot be empty"));
        }
        if self.instance_id.len() > 64 {
            return Err(ConfigError::validation(
                "service.instance_id",
                "cannot exceed 64 characters",
            ));
        }
        if self.authority_id.trim().is_empty() {
            return Err(ConfigError::validation("service.authority_id", "cannot be empty"));
        }
        Ok(())
    }

    /// Shutdown timeout as a duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            instance_id: default_instance_id(),
            authority_id: default_authority_id(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

// =============================================================================
// Store Configuration
// =============================================================================

/// Document store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSettings {
    /// Page size when a query asks for none.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Largest page size honoured.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    DEFAULT_MAX_PAGE_SIZE
}

impl StoreSettings {
    /// Validates the store settings.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_page_size == 0 {
            return Err(ConfigError::validation("store.default_page_size", "must be positive"));
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::validation(
                "store.default_page_size",
                "cannot exceed store.max_page_size",
            ));
        }
        Ok(())
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

// =============================================================================
// Registry Configuration
// =============================================================================

/// Registry engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySettings {
    /// Backoff between lost write races.
    #[serde(default)]
    pub backoff: BackoffSettings,

    /// Sweeps buffered at once, across all discoverers.
    #[serde(default = "default_max_pending_sweeps")]
    pub max_pending_sweeps: usize,

    /// Largest sweep accepted for reconciliation.
    #[serde(default = "default_max_sweep_results")]
    pub max_sweep_results: usize,

    /// Seconds a routed discovery request stays pending before eviction.
    #[serde(default = "default_pending_request_ttl")]
    pub pending_request_ttl_secs: u64,
}

fn default_max_pending_sweeps() -> usize {
    DEFAULT_MAX_PENDING_SWEEPS
}

fn default_pending_request_ttl() -> u64 {
    DEFAULT_PENDING_REQUEST_TTL_SECS
}

fn default_max_sweep_results() -> usize {
    DEFAULT_MAX_SWEEP_RESULTS
}

impl RegistrySettings {
    /// Validates the registry settings.
    pub fn validate(&self) -> ConfigResult<()> {
        self.backoff.validate()?;
        if self.max_pending_sweeps == 0 {
            return Err(ConfigError::validation("registry.max_pending_sweeps", "must be positive"));
        }
        if self.max_sweep_results == 0 {
            return Err(ConfigError::validation("registry.max_sweep_results", "must be positive"));
        }
        if self.pending_request_ttl_secs == 0 {
            return Err(ConfigError::validation("registry.pending_request_ttl_secs", "must be positive"));
        }
        Ok(())
    }

    /// Pending request TTL as a duration.
    pub fn pending_request_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_request_ttl_secs)
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            backoff: BackoffSettings::default(),
            max_pending_sweeps: default_max_pending_sweeps(),
            max_sweep_results: default_max_sweep_results(),
            pending_request_ttl_secs: default_pending_request_ttl(),
        }
    }
}

/// Conflict backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffSettings {
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound of a single delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Growth factor per retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_initial_delay() -> u64 {
    5
}

fn default_max_delay() -> u64 {
    500
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.2
}

impl BackoffSettings {
    /// Validates the backoff settings.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigError::validation(
                "registry.backoff.initial_delay_ms",
                "cannot exceed max_delay_ms",
            ));
        }
        if !(1.0..=10.0).contains(&self.multiplier) {
            return Err(ConfigError::out_of_bounds(
                "registry.backoff.multiplier",
                self.multiplier,
                1.0,
                10.0,
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::out_of_bounds("registry.backoff.jitter", self.jitter, 0.0, 1.0));
        }
        Ok(())
    }

    /// Initial delay as a duration.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Maximum delay as a duration.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

// =============================================================================
// Bus Configuration
// =============================================================================

/// Event bus settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusSettings {
    /// Messages buffered per subscriber.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,

    /// Topic registry changes are published on.
    #[serde(default = "default_registry_events_topic")]
    pub registry_events: String,

    /// Topic discoverers report sweep results on.
    #[serde(default = "default_discovery_results_topic")]
    pub discovery_results: String,

    /// Topic discovery requests are routed on.
    #[serde(default = "default_discovery_requests_topic")]
    pub discovery_requests: String,
}

fn default_bus_capacity() -> usize {
    DEFAULT_BUS_CAPACITY
}

fn default_registry_events_topic() -> String {
    "registry.events".to_string()
}

fn default_discovery_results_topic() -> String {
    "discovery.results".to_string()
}

fn default_discovery_requests_topic() -> String {
    "discovery.requests".to_string()
}

impl BusSettings {
    /// Validates the bus settings.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::validation("bus.capacity", "must be positive"));
        }
        let topics = [
            ("bus.registry_events", &self.registry_events),
            ("bus.discovery_results", &self.discovery_results),
            ("bus.discovery_requests", &self.discovery_requests),
        ];
        for (field, topic) in topics {
            if topic.trim().is_empty() {
                return Err(ConfigError::validation(field, "cannot be empty"));
            }
        }
        if self.registry_events == self.discovery_results
            || self.registry_events == self.discovery_requests
            || self.discovery_results == self.discovery_requests
        {
            return Err(ConfigError::validation("bus", "topics must be distinct"));
        }
        Ok(())
    }
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
            registry_events: default_registry_events_topic(),
            discovery_results: default_discovery_results_topic(),
            discovery_requests: default_discovery_requests_topic(),
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Validates the logging configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        Ok(())
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Single-line compact text.
    Compact,
    /// JSON lines.
    Json,
}

impl LogFormat {
    /// Returns the name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        }
    }

    /// Parses a format name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "text" | "pretty" => Some(LogFormat::Text),
            "compact" => Some(LogFormat::Compact),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

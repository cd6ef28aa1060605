// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # census-config
//!
//! Configuration management for the census discovery registry.
//!
//! ## Features
//!
//! - **Schema Definition**: typed sections with defaults and validation
//! - **Multi-Format Support**: YAML, TOML, and JSON configuration files
//! - **Environment Overrides**: `CENSUS_*` variables override file values
//! - **Placeholders**: `${VAR}` and `${VAR:default}` inside config files
//!
//! ## Quick Start
//!
//! ```no_run
//! use census_config::loader::load_config;
//!
//! let config = load_config("census.yaml").unwrap();
//! println!("Instance: {}", config.service.instance_id);
//! println!("Max sweep results: {}", config.registry.max_sweep_results);
//! ```
//!
//! ## Configuration Schema
//!
//! - `service` - instance identity and shutdown timeout
//! - `store` - paging limits of the document store
//! - `registry` - write backoff and sweep buffering limits
//! - `bus` - event bus capacity and topic names
//! - `logging` - log level and output format
//!
//! ```yaml
//! service:
//!   instance_id: "${CENSUS_INSTANCE:census-01}"
//! registry:
//!   max_sweep_results: 10000
//!   backoff:
//!     initial_delay_ms: 5
//!     max_delay_ms: 500
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    load_config, load_config_str, resolve_placeholders, ConfigFormat, ConfigLoader,
    ConfigLoaderBuilder,
};
pub use schema::{
    BackoffSettings, BusSettings, CensusConfig, LogFormat, LogLevel, LoggingConfig,
    RegistrySettings, ServiceConfig, StoreSettings,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

// =============================================================================
// Prelude
// =============================================================================

/// Convenience re-exports for common use cases.
pub mod prelude {
    pub use crate::error::{ConfigError, ConfigResult};
    pub use crate::loader::{load_config, ConfigLoader};
    pub use crate::schema::{CensusConfig, LogFormat, LogLevel};
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: Start the registry service
//! - `validate`: Validate configuration file
//! - `replay`: Feed recorded discovery results through the registry
//! - `version`: Show version information

mod replay;
mod run;
mod validate;
mod version;

pub use replay::{read_results, replay};
pub use run::run;
pub use validate::validate;
pub use version::version;

use census_config::{load_config, CensusConfig, LogFormat as ConfigLogFormat};

use crate::cli::{Cli, Commands};
use crate::error::{BinError, BinResult};
use crate::logging::init_logging;

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => {
            let config = load(&cli)?;
            start_logging(&cli, &config)?;
            run::run(config, args).await
        }
        Commands::Replay(args) => {
            let config = if cli.config.exists() {
                load(&cli)?
            } else {
                CensusConfig::default()
            };
            start_logging(&cli, &config)?;
            replay::replay(config, args).await
        }
        Commands::Validate(args) => {
            init_logging(cli.effective_log_level("warn"), cli.effective_log_format(ConfigLogFormat::Text))?;
            validate::validate(&cli, args)
        }
        Commands::Version => version::version(&cli),
    }
}

fn load(cli: &Cli) -> BinResult<CensusConfig> {
    load_config(&cli.config).map_err(|e| BinError::config_load(&cli.config, e))
}

fn start_logging(cli: &Cli, config: &CensusConfig) -> BinResult<()> {
    init_logging(
        cli.effective_log_level(config.logging.level.as_str()),
        cli.effective_log_format(config.logging.format),
    )
}

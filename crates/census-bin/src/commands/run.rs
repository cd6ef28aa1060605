// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use std::time::Duration;

use census_config::CensusConfig;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

/// Executes the `run` command to start the registry service.
pub async fn run(config: CensusConfig, args: RunArgs) -> BinResult<()> {
    info!("Starting census registry...");

    let runtime = RuntimeBuilder::new()
        .config(config)
        .metrics_interval(Duration::from_secs(args.metrics_interval))
        .build()?;

    runtime.run().await
}

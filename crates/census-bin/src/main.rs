// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! census - OPC UA discovery registry
//!
//! Main binary entry point.

use census_bin::cli::Cli;
use census_bin::commands;
use census_bin::error::report_error_and_exit;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    if let Err(error) = commands::execute(cli).await {
        report_error_and_exit(error);
    }
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use census_config::{CensusConfig, LogLevel};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Executes the `validate` command to validate configuration.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;
    let config =
        census_config::load_config(config_path).map_err(|e| BinError::config_load(config_path, e))?;
    let warnings = collect_warnings(&config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Instance ID:        {}", config.service.instance_id);
            println!("  Authority ID:       {}", config.service.authority_id);
            println!("  Max sweep results:  {}", config.registry.max_sweep_results);
            println!("  Max pending sweeps: {}", config.registry.max_pending_sweeps);
            println!("  Bus capacity:       {}", config.bus.capacity);
            println!("  Log:                {} ({})", config.logging.level.as_str(), config.logging.format.as_str());

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!(
                    "{}",
                    serde_json::to_string_pretty(&config).unwrap_or_else(|_| "(serialization error)".to_string())
                );
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "instance_id": config.service.instance_id,
                    "authority_id": config.service.authority_id,
                    "max_sweep_results": config.registry.max_sweep_results,
                    "max_pending_sweeps": config.registry.max_pending_sweeps,
                    "bus_capacity": config.bus.capacity,
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            let rendered = serde_json::to_string_pretty(&output).map_err(BinError::Render)?;
            println!("{}", rendered);
        }
    }

    if args.strict && !warnings.is_empty() {
        return Err(BinError::ConfigRejected(format!(
            "strict mode, {} warning(s) found",
            warnings.len()
        )));
    }

    Ok(())
}

/// Settings that are valid but likely to misbehave.
pub fn collect_warnings(config: &CensusConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.bus.capacity < config.registry.max_sweep_results {
        warnings.push(format!(
            "bus.capacity ({}) is below registry.max_sweep_results ({}); a lagging processor discards the sweeps it loses results of",
            config.bus.capacity, config.registry.max_sweep_results
        ));
    }
    if config.registry.backoff.max_delay_ms == 0 {
        warnings.push("registry.backoff.max_delay_ms is 0; contended writes retry without pause".to_string());
    }
    if config.logging.level == LogLevel::Trace {
        warnings.push("logging.level is trace; expect very large log volume".to_string());
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_no_warnings() {
        assert!(collect_warnings(&CensusConfig::default()).is_empty());
    }

    #[test]
    fn test_small_bus_warns() {
        let mut config = CensusConfig::default();
        config.bus.capacity = config.registry.max_sweep_results / 2;
        let warnings = collect_warnings(&config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("bus.capacity"));
    }
}

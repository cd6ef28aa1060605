// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `replay` command.
//!
//! Accepts either a JSON array of discovery results or JSON lines:
//!
//! ```text
//! {"discoverer_id":"d1","time_stamp":"2025-03-01T10:00:00Z","index":0,"application":{...}}
//! {"discoverer_id":"d1","time_stamp":"2025-03-01T10:00:00Z","index":1,"result":{...}}
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use census_config::CensusConfig;
use census_core::DiscoveryResult;
use census_registry::{Disposition, ReconcileReport};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{OutputFormat, ReplayArgs};
use crate::error::{BinError, BinResult};
use crate::runtime::{Components, ServiceMetrics};

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    /// Results read from the input.
    pub results: usize,
    /// Results held in a sweep buffer.
    pub buffered: usize,
    /// Dropped results by reason.
    pub dropped: BTreeMap<&'static str, usize>,
    /// Results whose processing failed.
    pub failed: usize,
    /// One report per reconciled sweep.
    pub sweeps: Vec<ReconcileReport>,
    /// Counters after the replay.
    pub metrics: ServiceMetrics,
}

/// Executes the `replay` command.
pub async fn replay(config: CensusConfig, args: ReplayArgs) -> BinResult<()> {
    let results = read_results(&args.input)?;
    info!(count = results.len(), input = %args.input.display(), "Replaying discovery results");

    let report = replay_results(&config, results).await;

    match args.format {
        OutputFormat::Text => print_text(&report),
        OutputFormat::Json => {
            let rendered = serde_json::to_string_pretty(&report).map_err(BinError::Render)?;
            println!("{}", rendered);
        }
    }

    if report.failed > 0 {
        return Err(BinError::ReplayFailed { failed: report.failed });
    }
    Ok(())
}

/// Runs `results` through a fresh registry in order.
pub async fn replay_results(config: &CensusConfig, results: Vec<DiscoveryResult>) -> ReplayReport {
    let components = Components::build(config);
    let mut report = ReplayReport {
        results: results.len(),
        buffered: 0,
        dropped: BTreeMap::new(),
        failed: 0,
        sweeps: Vec::new(),
        metrics: components.metrics(),
    };

    for result in results {
        match components.processor.process(result).await {
            Ok(Disposition::Buffered) => report.buffered += 1,
            Ok(Disposition::Dropped(reason)) => *report.dropped.entry(reason.name()).or_default() += 1,
            Ok(Disposition::Reconciled(sweep)) => report.sweeps.push(sweep),
            Err(e) => {
                warn!(error = %e, "Replayed result failed");
                report.failed += 1;
            }
        }
    }

    report.metrics = components.metrics();
    report
}

/// Reads discovery results from a JSON array or JSON lines file.
pub fn read_results(path: &Path) -> BinResult<Vec<DiscoveryResult>> {
    let content = std::fs::read_to_string(path).map_err(|source| BinError::ReplayRead {
        path: path.to_path_buf(),
        source,
    })?;

    if content.trim_start().starts_with('[') {
        return serde_json::from_str(&content).map_err(|e| BinError::replay_record(path, None, e));
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).map_err(|e| BinError::replay_record(path, Some(number + 1), e))
        })
        .collect()
}

fn print_text(report: &ReplayReport) {
    println!("Replayed {} result(s)", report.results);
    println!("  Buffered: {}", report.buffered);
    for (reason, count) in &report.dropped {
        println!("  Dropped ({}): {}", reason, count);
    }
    if report.failed > 0 {
        println!("  Failed:   {}", report.failed);
    }
    println!();
    for sweep in &report.sweeps {
        let discoverer = sweep
            .discoverer_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "Sweep of {}: {} application(s), {} endpoint(s), created {}, updated {}, found {}, lost {}",
            discoverer,
            sweep.applications,
            sweep.endpoints,
            sweep.created,
            sweep.updated,
            sweep.found,
            sweep.lost
        );
    }
    println!();
    println!(
        "Writes: {} created, {} updated, {} unchanged, {} retries",
        report.metrics.registry.writes.created,
        report.metrics.registry.writes.updated,
        report.metrics.registry.writes.unchanged,
        report.metrics.registry.writes.retries
    );
}

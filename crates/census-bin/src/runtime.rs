// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Service runtime orchestration.
//!
//! Startup order:
//!
//! 1. Document store and event bus
//! 2. Registry (writer, notifier, entity registries, reconciler)
//! 3. Discovery coordinator on the requests topic
//! 4. Sweep processor subscribed to the results topic
//!
//! Shutdown stops the processor, waits for it up to the configured timeout
//! and logs the final counters.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use census_config::{load_config, CensusConfig};
use census_core::{BackoffConfig, BusStats, EventBus, InMemoryEventBus, OperationContext};
use census_registry::{
    CoordinatorMetricsSnapshot, DiscoveryCoordinator, ProcessorMetricsSnapshot,
    ReconcilerMetricsSnapshot, Registry, RegistryConfig, RegistryMetrics, SweepProcessor,
};
use census_store::{MemoryDocumentStore, StoreConfig};

use crate::error::{BinError, BinResult};
use crate::shutdown::{drain, ShutdownCoordinator};

// =============================================================================
// Config conversion
// =============================================================================

/// Engine settings derived from the service configuration.
pub fn registry_config(config: &CensusConfig) -> RegistryConfig {
    let backoff = &config.registry.backoff;
    RegistryConfig {
        backoff: BackoffConfig {
            initial_delay: backoff.initial_delay(),
            max_delay: backoff.max_delay(),
            multiplier: backoff.multiplier,
            jitter: backoff.jitter,
        },
        max_sweep_results: config.registry.max_sweep_results,
        max_pending_sweeps: config.registry.max_pending_sweeps,
    }
}

/// Store settings derived from the service configuration.
pub fn store_config(config: &CensusConfig) -> StoreConfig {
    StoreConfig {
        default_page_size: config.store.default_page_size,
        max_page_size: config.store.max_page_size,
    }
}

// =============================================================================
// Components
// =============================================================================

/// The wired registry service.
#[derive(Clone)]
pub struct Components {
    /// Registry over the in-memory store.
    pub registry: Registry,
    /// Bus carrying events, discovery requests and results.
    pub bus: Arc<InMemoryEventBus>,
    /// Discovery request routing.
    pub coordinator: Arc<DiscoveryCoordinator>,
    /// Discovery result ingestion.
    pub processor: Arc<SweepProcessor>,
}

impl Components {
    /// Wires all components from `config`.
    pub fn build(config: &CensusConfig) -> Self {
        let registry_config = registry_config(config);
        let store = Arc::new(MemoryDocumentStore::new(store_config(config)));
        let bus = Arc::new(InMemoryEventBus::new(config.bus.capacity));
        let dyn_bus: Arc<dyn EventBus> = bus.clone();

        let registry = Registry::builder(store)
            .bus(Arc::clone(&dyn_bus))
            .events_topic(config.bus.registry_events.clone())
            .config(registry_config.clone())
            .build();

        let coordinator = Arc::new(
            DiscoveryCoordinator::new(registry.modules().clone(), dyn_bus)
                .with_topic(config.bus.discovery_requests.clone())
                .with_pending_ttl(config.registry.pending_request_ttl()),
        );
        let processor = Arc::new(
            SweepProcessor::new(Arc::clone(registry.reconciler()), &registry_config)
                .with_context(OperationContext::new(config.service.authority_id.clone()))
                .with_coordinator(Arc::clone(&coordinator)),
        );

        Self {
            registry,
            bus,
            coordinator,
            processor,
        }
    }

    /// Collects all counters.
    pub fn metrics(&self) -> ServiceMetrics {
        ServiceMetrics {
            registry: self.registry.metrics(),
            reconciler: self.registry.reconciler().metrics(),
            processor: self.processor.metrics(),
            coordinator: self.coordinator.metrics(),
            bus: self.bus.stats(),
            pending_sweeps: self.processor.pending_sweeps(),
        }
    }
}

/// Counters of the whole service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceMetrics {
    /// Writes, notifications and store counters.
    pub registry: RegistryMetrics,
    /// Reconciliation passes.
    pub reconciler: ReconcilerMetricsSnapshot,
    /// Sweep buffering.
    pub processor: ProcessorMetricsSnapshot,
    /// Discovery requests.
    pub coordinator: CoordinatorMetricsSnapshot,
    /// Bus traffic.
    pub bus: BusStats,
    /// Sweeps still being buffered.
    pub pending_sweeps: usize,
}

// =============================================================================
// CensusRuntime
// =============================================================================

/// The registry service runtime.
pub struct CensusRuntime {
    config: Arc<CensusConfig>,
    shutdown: ShutdownCoordinator,
    metrics_interval: Option<Duration>,
}

impl CensusRuntime {
    /// Creates a new runtime.
    pub fn new(config: CensusConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: ShutdownCoordinator::new(),
            metrics_interval: None,
        }
    }

    /// Logs counters every `interval`.
    pub fn with_metrics_interval(mut self, interval: Option<Duration>) -> Self {
        self.metrics_interval = interval;
        self
    }

    /// Returns the shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Runs the service until shutdown is signaled.
    pub async fn run(self) -> BinResult<()> {
        info!(
            instance_id = %self.config.service.instance_id,
            "Starting census v{}",
            census_core::VERSION
        );

        let components = Components::build(&self.config);
        let subscriber = components
            .bus
            .subscribe(&self.config.bus.discovery_results)
            .map_err(|e| BinError::startup(format!("Failed to subscribe to discovery results: {}", e)))?;

        let processor_task = tokio::spawn(
            Arc::clone(&components.processor).run(subscriber, self.shutdown.subscribe()),
        );
        let reporter_task = self
            .metrics_interval
            .filter(|interval| !interval.is_zero())
            .map(|interval| tokio::spawn(report_metrics(components.clone(), interval, self.shutdown.clone())));

        info!(
            results_topic = %self.config.bus.discovery_results,
            requests_topic = %self.config.bus.discovery_requests,
            events_topic = %self.config.bus.registry_events,
            "census is ready"
        );
        self.shutdown.wait_for_shutdown().await;

        info!("Shutdown initiated, draining sweep processor...");
        let timeout = self.config.service.shutdown_timeout();
        if !drain(processor_task, timeout).await {
            warn!("Sweep processor abandoned with {} open sweep(s)", components.processor.pending_sweeps());
        }
        if let Some(task) = reporter_task {
            drain(task, timeout).await;
        }

        log_metrics(&components);
        info!("census shutdown complete");
        Ok(())
    }
}

async fn report_metrics(components: Components, interval: Duration, shutdown: ShutdownCoordinator) {
    let mut stop = shutdown.subscribe();
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            _ = ticker.tick() => log_metrics(&components),
        }
    }
}

fn log_metrics(components: &Components) {
    match serde_json::to_string(&components.metrics()) {
        Ok(json) => info!(metrics = %json, "Service metrics"),
        Err(e) => warn!(error = %e, "Failed to serialize metrics"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the runtime.
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<CensusConfig>,
    metrics_interval: Option<Duration>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: CensusConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the metrics log interval.
    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<CensusRuntime> {
        let config = match self.config {
            Some(cfg) => cfg,
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::ConfigRejected("no configuration provided".to_string()))?;
                load_config(&path).map_err(|e| BinError::config_load(&path, e))?
            }
        };

        Ok(CensusRuntime::new(config).with_metrics_interval(self.metrics_interval))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use census_core::bus::encode;
    use census_core::{
        ApplicationInfo, ApplicationType, DiscovererId, DiscoveryResult, DiscoveryResultSummary,
        EndpointInfo,
    };
    use chrono::Utc;

    #[test]
    fn test_config_conversion() {
        let mut config = CensusConfig::default();
        config.registry.backoff.initial_delay_ms = 7;
        config.registry.max_sweep_results = 42;
        config.store.default_page_size = 9;

        let registry = registry_config(&config);
        assert_eq!(registry.backoff.initial_delay, Duration::from_millis(7));
        assert_eq!(registry.max_sweep_results, 42);
        assert_eq!(store_config(&config).default_page_size, 9);
    }

    #[test]
    fn test_runtime_builder_requires_config() {
        assert!(RuntimeBuilder::new().build().is_err());
        assert!(RuntimeBuilder::new().config(CensusConfig::default()).build().is_ok());
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let runtime = RuntimeBuilder::new()
            .config(CensusConfig::default())
            .build()
            .unwrap();
        let shutdown = runtime.shutdown().clone();
        let handle = tokio::spawn(runtime.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.initiate_shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[tokio::test]
    async fn test_sweep_over_bus_is_reconciled() {
        let config = CensusConfig::default();
        let components = Components::build(&config);
        let shutdown = ShutdownCoordinator::new();
        let subscriber = components.bus.subscribe(&config.bus.discovery_results).unwrap();
        let task = tokio::spawn(Arc::clone(&components.processor).run(subscriber, shutdown.subscribe()));

        let discoverer = DiscovererId::new("d1");
        let now = Utc::now();
        let application = ApplicationInfo::new("urn:plant:press", ApplicationType::Server);
        let endpoint = EndpointInfo::new(application.application_id.clone(), "opc.tcp://press:4840", None);
        let finding = DiscoveryResult::finding(discoverer.clone(), now, 0, application, Some(endpoint));
        let summary = DiscoveryResult::summary(
            discoverer.clone(),
            now,
            1,
            DiscoveryResultSummary::new(discoverer, now),
        );
        for message in [finding, summary] {
            components
                .bus
                .publish(&config.bus.discovery_results, encode(&message).unwrap())
                .await
                .unwrap();
        }

        let mut reconciled = false;
        for _ in 0..100 {
            if components.processor.metrics().sweeps_reconciled == 1 {
                reconciled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.initiate_shutdown();
        assert!(drain(task, Duration::from_secs(1)).await);

        assert!(reconciled);
        let metrics = components.metrics();
        assert_eq!(metrics.reconciler.passes, 1);
        assert_eq!(metrics.registry.writes.created, 2);
    }
}

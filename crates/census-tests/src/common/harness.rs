// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! A fully wired registry for integration tests.
//!
//! ## Design Principles
//!
//! - Every harness owns its own store, bus and registry
//! - A [`RecordingListener`] and an events tap are attached before the
//!   first write, so nothing a test triggers goes unobserved
//! - Sweeps are applied either directly or through the processor

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use census_core::error::{RegistryError, RegistryResult};
use census_core::types::{ApplicationType, DiscovererId};
use census_core::bus::{encode, DISCOVERY_RESULTS_TOPIC};
use census_core::{
    ApplicationInfo, BusSubscriber, DiscoveryResult, EndpointInfo, EventBus, InMemoryEventBus, OperationContext,
    RegistryEvent,
};
use census_registry::{
    ApplicationQuery, DiscoveryCoordinator, Disposition, ProcessorMetricsSnapshot, ReconcileReport, Registry, RegistryConfig, SweepProcessor,
};
use census_store::{DocumentStore, MemoryDocumentStore, StoreConfig};

use super::builders::SweepBuilder;
use super::fixtures::ContextFixtures;
use super::init_test_logging;
use super::mocks::RecordingListener;

/// Bus capacity of the harness; large enough that no test lags.
const HARNESS_BUS_CAPACITY: usize = 8192;

// =============================================================================
// TestRegistry
// =============================================================================

/// Registry, processor and coordinator over one in-memory store and bus.
pub struct TestRegistry {
    /// The registry under test.
    pub registry: Registry,
    /// Backing store.
    pub store: Arc<dyn DocumentStore>,
    /// Bus carrying registry events and discovery requests.
    pub bus: Arc<InMemoryEventBus>,
    /// Listener attached to every application, endpoint and twin change.
    pub recorder: Arc<RecordingListener>,
    /// Discovery request routing.
    pub coordinator: Arc<DiscoveryCoordinator>,
    /// Discovery result buffering.
    pub processor: Arc<SweepProcessor>,
    events: Mutex<BusSubscriber>,
}

impl TestRegistry {
    /// Creates a harness over a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryDocumentStore::new(StoreConfig::for_testing())))
    }

    /// Creates a harness over `store`.
    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        Self::build(store, RegistryConfig::for_testing())
    }

    /// Creates a harness with custom engine settings.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::build(
            Arc::new(MemoryDocumentStore::new(StoreConfig::for_testing())),
            config,
        )
    }

    fn build(store: Arc<dyn DocumentStore>, config: RegistryConfig) -> Self {
        init_test_logging();

        let bus = Arc::new(InMemoryEventBus::new(HARNESS_BUS_CAPACITY));
        let dyn_bus: Arc<dyn EventBus> = bus.clone();
        let registry = Registry::builder(Arc::clone(&store))
            .bus(Arc::clone(&dyn_bus))
            .config(config.clone())
            .build();
        let events = bus
            .subscribe(registry.notifier().topic())
            .expect("in-memory subscribe never fails");

        let recorder = RecordingListener::new();
        let notifier = registry.notifier();
        notifier.applications().register(recorder.clone());
        notifier.endpoints().register(recorder.clone());
        notifier.twins().register(recorder.clone());

        let coordinator = Arc::new(DiscoveryCoordinator::new(registry.modules().clone(), dyn_bus));
        let processor = Arc::new(
            SweepProcessor::new(Arc::clone(registry.reconciler()), &config)
                .with_coordinator(Arc::clone(&coordinator)),
        );

        Self {
            registry,
            store,
            bus,
            recorder,
            coordinator,
            processor,
            events: Mutex::new(events),
        }
    }

    /// Applies `sweep` directly through the reconciler.
    pub async fn reconcile(&self, sweep: &SweepBuilder) -> RegistryResult<ReconcileReport> {
        self.registry
            .reconciler()
            .reconcile(
                sweep.discoverer(),
                sweep.working_set(),
                sweep.is_register_only(),
                sweep.time_stamp(),
                &ContextFixtures::discovery(sweep.discoverer()),
            )
            .await
    }

    /// Streams `sweep` through the processor, findings then summary.
    pub async fn feed(&self, sweep: &SweepBuilder) -> RegistryResult<Vec<Disposition>> {
        let mut dispositions = Vec::new();
        for result in sweep.results() {
            dispositions.push(self.processor.process(result).await?);
        }
        Ok(dispositions)
    }

    /// Drains the events published since the last call.
    pub fn take_events(&self) -> Vec<RegistryEvent> {
        let mut subscriber = self.events.lock();
        let mut events = Vec::new();
        while let Ok(Some(message)) = subscriber.try_recv() {
            events.push(message.decode::<RegistryEvent>().expect("registry event payload"));
        }
        events
    }

    /// Looks up an application by URI. Server type is assumed.
    pub async fn application(&self, uri: &str) -> Option<ApplicationInfo> {
        let id = ApplicationInfo::new(uri, ApplicationType::Server).application_id;
        match self.registry.applications().get(&id).await {
            Ok(app) => Some(app),
            Err(RegistryError::NotFound { .. }) => None,
            Err(e) => panic!("lookup of {} failed: {}", uri, e),
        }
    }

    /// Every endpoint of the application at `uri`.
    pub async fn endpoints_of(&self, uri: &str) -> Vec<EndpointInfo> {
        let id = ApplicationInfo::new(uri, ApplicationType::Server).application_id;
        self.registry
            .endpoints()
            .list_by_application(&id)
            .await
            .expect("endpoint listing")
    }

    /// All applications owned by `discoverer`, including stale ones.
    pub async fn owned_by(&self, discoverer: &DiscovererId) -> Vec<ApplicationInfo> {
        let query = ApplicationQuery::all()
            .with_discoverer(discoverer.clone())
            .including_not_seen();
        let mut applications = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self
                .registry
                .applications()
                .query(&query, None, continuation.as_deref())
                .await
                .expect("application query");
            applications.extend(page.items);
            match page.continuation_token {
                Some(token) => continuation = Some(token),
                None => return applications,
            }
        }
    }

    /// Context for operator actions.
    pub fn operator(&self) -> OperationContext {
        ContextFixtures::operator()
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// RunningProcessor
// =============================================================================

/// A sweep processor consuming the discovery results topic of a bus.
pub struct RunningProcessor {
    processor: Arc<SweepProcessor>,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl RunningProcessor {
    /// Subscribes `processor` to the results topic of `bus` and spawns it.
    pub fn start(processor: Arc<SweepProcessor>, bus: &InMemoryEventBus) -> Self {
        let subscriber = bus
            .subscribe(DISCOVERY_RESULTS_TOPIC)
            .expect("subscribe to discovery results");
        let (shutdown, stop) = broadcast::channel(1);
        let task = tokio::spawn(Arc::clone(&processor).run(subscriber, stop));
        Self {
            processor,
            shutdown,
            task,
        }
    }

    /// Polls the counters until `done` holds, panicking after five seconds.
    pub async fn wait_until(&self, done: impl Fn(&ProcessorMetricsSnapshot) -> bool) -> ProcessorMetricsSnapshot {
        for _ in 0..500 {
            let metrics = self.processor.metrics();
            if done(&metrics) {
                return metrics;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("processor never reached the expected state: {:?}", self.processor.metrics());
    }

    /// Signals shutdown and waits for the processor to finish queued sweeps.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("processor stops")
            .expect("processor task");
    }
}

/// Publishes `results` on the discovery results topic of `bus`.
pub async fn publish_results(bus: &InMemoryEventBus, results: impl IntoIterator<Item = DiscoveryResult>) {
    for result in results {
        bus.publish(DISCOVERY_RESULTS_TOPIC, encode(&result).expect("encode result"))
            .await
            .expect("publish result");
    }
}

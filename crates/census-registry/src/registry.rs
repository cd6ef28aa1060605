// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Registry assembly.
//!
//! [`Registry`] wires the store, the optimistic writer and the change
//! notifier into the entity registries. Everything shares one
//! [`RegistryContext`]; the registries are cheap handles onto it.
//!
//! ```text
//!                 ┌──────────────────────── Registry ───────────────────────┐
//!                 │                                                          │
//!   applications ─┤                                                          │
//!   endpoints ────┤     RegistryContext                                      │
//!   twins ────────┼──▶  ├── Collection<T> × 4 ──▶ Arc<dyn DocumentStore>     │
//!   modules ──────┤     ├── OptimisticWriter (backoff + metrics)             │
//!   reconciler ───┤     └── ChangeNotifier ──▶ listeners, Arc<dyn EventBus>  │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use census_core::bus::{EventBus, EventSerializer};
use census_core::retry::BackoffConfig;
use census_core::{ApplicationInfo, EndpointInfo, ModuleInfo, TwinInfo};
use census_store::{Collection, DocumentStore, StoreStats};

use crate::applications::ApplicationRegistry;
use crate::cas::{OptimisticWriter, WriteMetricsSnapshot};
use crate::endpoints::EndpointRegistry;
use crate::modules::ModuleRegistry;
use crate::notifier::{ChangeNotifier, NotifierMetricsSnapshot};
use crate::reconciler::DiscoveryReconciler;
use crate::twins::TwinRegistry;

// =============================================================================
// Configuration
// =============================================================================

/// Registry engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Backoff between lost write races.
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Largest sweep accepted for reconciliation.
    #[serde(default = "default_max_sweep_results")]
    pub max_sweep_results: usize,

    /// Open sweep buffers allowed across all discoverers.
    #[serde(default = "default_max_pending_sweeps")]
    pub max_pending_sweeps: usize,
}

fn default_max_sweep_results() -> usize {
    10_000
}

fn default_max_pending_sweeps() -> usize {
    256
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            max_sweep_results: default_max_sweep_results(),
            max_pending_sweeps: default_max_pending_sweeps(),
        }
    }
}

impl RegistryConfig {
    /// Configuration for tests: no backoff delay, small limits.
    pub fn for_testing() -> Self {
        Self {
            backoff: BackoffConfig::immediate(),
            max_sweep_results: 100,
            max_pending_sweeps: 8,
        }
    }

    /// Sets the backoff.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the sweep size limit.
    pub fn with_max_sweep_results(mut self, max: usize) -> Self {
        self.max_sweep_results = max;
        self
    }
}

// =============================================================================
// RegistryContext
// =============================================================================

/// State shared by all registries.
pub struct RegistryContext {
    pub(crate) applications: Collection<ApplicationInfo>,
    pub(crate) endpoints: Collection<EndpointInfo>,
    pub(crate) twins: Collection<TwinInfo>,
    pub(crate) modules: Collection<ModuleInfo>,
    pub(crate) writer: OptimisticWriter,
    pub(crate) notifier: ChangeNotifier,
    pub(crate) config: RegistryConfig,
    store: Arc<dyn DocumentStore>,
}

impl RegistryContext {
    /// Creates a context over `store`.
    pub fn new(store: Arc<dyn DocumentStore>, notifier: ChangeNotifier, config: RegistryConfig) -> Self {
        Self {
            applications: Collection::new(Arc::clone(&store)),
            endpoints: Collection::new(Arc::clone(&store)),
            twins: Collection::new(Arc::clone(&store)),
            modules: Collection::new(Arc::clone(&store)),
            writer: OptimisticWriter::new(config.backoff.clone()),
            notifier,
            config,
            store,
        }
    }

    /// Change notifier.
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Engine settings.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}

impl fmt::Debug for RegistryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryContext")
            .field("store", &self.store.name())
            .field("writer", &self.writer)
            .field("notifier", &self.notifier)
            .finish()
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Combined registry counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryMetrics {
    /// Optimistic write loop.
    pub writes: WriteMetricsSnapshot,
    /// Change notifier.
    pub notifier: NotifierMetricsSnapshot,
    /// Document store.
    pub store: StoreStats,
}

// =============================================================================
// Registry
// =============================================================================

/// The assembled registry.
#[derive(Clone)]
pub struct Registry {
    context: Arc<RegistryContext>,
    applications: ApplicationRegistry,
    endpoints: EndpointRegistry,
    twins: TwinRegistry,
    modules: ModuleRegistry,
    reconciler: Arc<DiscoveryReconciler>,
}

impl Registry {
    /// Starts building a registry over `store`.
    pub fn builder(store: Arc<dyn DocumentStore>) -> RegistryBuilder {
        RegistryBuilder {
            store,
            bus: None,
            serializer: None,
            topic: None,
            config: RegistryConfig::default(),
        }
    }

    /// Shared context.
    pub fn context(&self) -> &Arc<RegistryContext> {
        &self.context
    }

    /// Application registry.
    pub fn applications(&self) -> &ApplicationRegistry {
        &self.applications
    }

    /// Endpoint registry.
    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    /// Twin registry.
    pub fn twins(&self) -> &TwinRegistry {
        &self.twins
    }

    /// Module registry.
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Discovery reconciler.
    pub fn reconciler(&self) -> &Arc<DiscoveryReconciler> {
        &self.reconciler
    }

    /// Change notifier, for listener registration.
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.context.notifier
    }

    /// Returns combined counters.
    pub fn metrics(&self) -> RegistryMetrics {
        RegistryMetrics {
            writes: self.context.writer.metrics(),
            notifier: self.context.notifier.metrics(),
            store: self.context.store.stats(),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("context", &self.context).finish()
    }
}

/// Builder for [`Registry`].
pub struct RegistryBuilder {
    store: Arc<dyn DocumentStore>,
    bus: Option<Arc<dyn EventBus>>,
    serializer: Option<Arc<dyn EventSerializer>>,
    topic: Option<String>,
    config: RegistryConfig,
}

impl RegistryBuilder {
    /// Publishes registry events on `bus`.
    pub fn bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Serializes events with `serializer` instead of JSON.
    pub fn serializer(mut self, serializer: Arc<dyn EventSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Publishes registry events on `topic`.
    pub fn events_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets engine settings.
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the registry.
    pub fn build(self) -> Registry {
        let mut notifier = ChangeNotifier::new();
        if let Some(bus) = self.bus {
            notifier = notifier.with_bus(bus);
        }
        if let Some(serializer) = self.serializer {
            notifier = notifier.with_serializer(serializer);
        }
        if let Some(topic) = self.topic {
            notifier = notifier.with_topic(topic);
        }

        let context = Arc::new(RegistryContext::new(self.store, notifier, self.config));
        let endpoints = EndpointRegistry::new(Arc::clone(&context));
        Registry {
            applications: ApplicationRegistry::new(Arc::clone(&context)),
            twins: TwinRegistry::new(Arc::clone(&context), endpoints.clone()),
            modules: ModuleRegistry::new(Arc::clone(&context)),
            reconciler: Arc::new(DiscoveryReconciler::new(Arc::clone(&context))),
            endpoints,
            context,
        }
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("store", &self.store.name())
            .field("bus", &self.bus.is_some())
            .field("config", &self.config)
            .finish()
    }
}

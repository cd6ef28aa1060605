// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # census-registry
//!
//! Registry engine for OPC UA applications, endpoints, twins and modules.
//!
//! ## Architecture
//!
//! ```text
//!   discovery.results ──▶ SweepProcessor ──▶ DiscoveryReconciler ─┐
//!                          (per-discoverer                        │
//!                           sweep buffers)                        ▼
//!   register / unregister ──▶ ApplicationRegistry ──▶ OptimisticWriter ──▶ DocumentStore
//!   activate / update / ──▶ TwinRegistry ───────────▶       │
//!   deactivate                                              ▼
//!                                                    ChangeNotifier ──▶ listeners
//!                                                                   └─▶ registry.events
//!
//!   discover / cancel ──▶ DiscoveryCoordinator ──▶ discovery.requests
//! ```
//!
//! ## Guarantees
//!
//! - **No lost updates**: every write is a read-decide-write loop retried on
//!   conflict or stale generation
//! - **Idempotent sweeps**: an identical sweep writes and emits nothing
//! - **One event per record per pass**: watermark transitions win over
//!   content updates
//! - **Delivery isolation**: listener failures are logged and counted, bus
//!   failures are surfaced after all writes finished
//!
//! ## Example
//!
//! ```rust,ignore
//! use census_registry::{Registry, RegistryConfig};
//! use census_store::MemoryDocumentStore;
//!
//! let registry = Registry::builder(Arc::new(MemoryDocumentStore::default()))
//!     .bus(bus)
//!     .config(RegistryConfig::default())
//!     .build();
//! let report = registry
//!     .reconciler()
//!     .reconcile(&discoverer, working_set, false, Utc::now(), &OperationContext::system())
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Engine
// =============================================================================

pub mod cas;
pub mod notifier;
pub mod queries;
pub mod registry;

// =============================================================================
// Entity registries
// =============================================================================

pub mod applications;
pub mod endpoints;
pub mod modules;
pub mod twins;

// =============================================================================
// Discovery
// =============================================================================

pub mod coordinator;
pub mod processor;
pub mod reconciler;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use applications::ApplicationRegistry;
pub use cas::{OptimisticWriter, Proposal, UpsertOutcome, WriteMetricsSnapshot};
pub use coordinator::{CoordinatorMetricsSnapshot, DiscoveryCoordinator, PendingDiscovery};
pub use endpoints::EndpointRegistry;
pub use modules::ModuleRegistry;
pub use notifier::{classify, ChangeNotifier, Notifications, NotifierMetricsSnapshot};
pub use processor::{Disposition, DropReason, ProcessorMetricsSnapshot, SweepProcessor};
pub use queries::{ApplicationQuery, EndpointQuery, TwinQuery};
pub use reconciler::{DiscoveryReconciler, ReconcileReport, ReconcilerMetricsSnapshot};
pub use registry::{Registry, RegistryBuilder, RegistryConfig, RegistryContext, RegistryMetrics};
pub use twins::TwinRegistry;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # census-core
//!
//! Domain model and reconciliation primitives for the census OPC UA registry.
//!
//! This crate provides the types and pure algorithms every other census
//! component builds on:
//!
//! - **Types**: identifiers, generation tokens, OPC UA enumerations, paging
//! - **Records**: `ApplicationInfo`, `EndpointInfo`, `TwinInfo`, `ModuleInfo`
//! - **Identity**: `SameAs` and `ContentEq` predicates
//! - **Merge**: order-independent union of discovery findings
//! - **Staleness**: not-seen watermark marking
//! - **Listeners**: observer traits, registries and isolated fan-out
//! - **Bus**: event bus contract, in-memory bus and event serialization
//! - **Retry**: backoff for optimistic write loops
//! - **Error**: layered error hierarchy
//!
//! ## Example
//!
//! ```
//! use census_core::merge::{ApplicationRegistration, WorkingSet};
//! use census_core::{ApplicationInfo, ApplicationType, EndpointInfo, ApplicationId};
//!
//! let mut set = WorkingSet::new();
//! for capability in ["DA", "HD"] {
//!     let app = ApplicationInfo::new("urn:demo:server1", ApplicationType::Server)
//!         .with_capability(capability);
//!     let endpoint = EndpointInfo::new(ApplicationId::new(""), "opc.tcp://host:4840", None);
//!     set.add_or_update(ApplicationRegistration::new(app, [endpoint]));
//! }
//!
//! assert_eq!(set.len(), 1);
//! assert_eq!(set.endpoint_count(), 1);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod identity;
pub mod types;

// =============================================================================
// Records
// =============================================================================

pub mod application;
pub mod discovery;
pub mod endpoint;
pub mod module;
pub mod twin;

// =============================================================================
// Reconciliation
// =============================================================================

pub mod merge;
pub mod retry;
pub mod staleness;

// =============================================================================
// Notification
// =============================================================================

pub mod bus;
pub mod events;
pub mod listener;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::*;
pub use types::*;

pub use application::ApplicationInfo;
pub use discovery::{
    DiscoveryCancel, DiscoveryCommand, DiscoveryConfig, DiscoveryMode, DiscoveryRequest,
    DiscoveryResult, DiscoveryResultSummary,
};
pub use endpoint::{EndpointDescription, EndpointInfo};
pub use identity::{ContentEq, SameAs};
pub use merge::{ApplicationRegistration, WorkingSet};
pub use module::{ModuleInfo, ModuleKind};
pub use staleness::{Sighting, Watermarked};
pub use twin::{
    DiagnosticsLevel, DiagnosticsSettings, TwinActivationRequest, TwinActivationResult, TwinInfo,
    TwinUpdateRequest, UserCredential,
};

pub use bus::{
    BusMessage, BusStats, BusSubscriber, EventBus, EventSerializer, InMemoryEventBus,
    JsonEventSerializer,
};
pub use events::{ChangeKind, EntityKind, EventPayload, RegistryEvent};
pub use listener::{
    ApplicationListener, EndpointListener, FanOutReport, GatewayListener, Listener,
    ListenerHandle, ListenerRegistry, PublisherListener, SupervisorListener, TwinListener,
};
pub use retry::{BackoffConfig, ConflictBackoff};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

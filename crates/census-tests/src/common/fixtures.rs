// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built test data for consistent and reproducible testing.
//!
//! ## Design Principles
//!
//! - Fixtures are plain values, built fresh on every call
//! - Each fixture represents a realistic plant-floor scenario
//! - Time comes from a fixed clock so sweeps order deterministically

use chrono::{DateTime, Duration, TimeZone, Utc};

use census_core::types::{
    ApplicationId, ApplicationType, DiscovererId, SecurityMode, SecurityPolicy,
};
use census_core::{
    ApplicationInfo, DiscoveryMode, DiscoveryRequest, EndpointDescription, EndpointInfo,
    ModuleInfo, ModuleKind, OperationContext,
};

// =============================================================================
// Clock
// =============================================================================

/// Fixed points in time for sweeps.
pub struct Clock;

impl Clock {
    /// The reference instant.
    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0)
            .single()
            .expect("valid fixture time")
    }

    /// `minutes` after [`Clock::t0`].
    pub fn at(minutes: i64) -> DateTime<Utc> {
        Self::t0() + Duration::minutes(minutes)
    }
}

// =============================================================================
// Discoverer Fixtures
// =============================================================================

/// Discovery agents.
pub struct DiscovererFixtures;

impl DiscovererFixtures {
    /// The discoverer of the assembly hall.
    pub fn hall_a() -> DiscovererId {
        DiscovererId::new("discoverer-hall-a")
    }

    /// The discoverer of the paint shop.
    pub fn hall_b() -> DiscovererId {
        DiscovererId::new("discoverer-hall-b")
    }

    /// Module record announcing a connected discoverer.
    pub fn module(id: &DiscovererId) -> ModuleInfo {
        ModuleInfo::new(id.as_str(), ModuleKind::Discoverer)
            .with_site("plant-1")
            .connected()
    }

    /// A fast discovery request addressed to `id`.
    pub fn request(id: &DiscovererId) -> DiscoveryRequest {
        DiscoveryRequest::new(DiscoveryMode::Fast).for_discoverer(id.clone())
    }
}

// =============================================================================
// Application Fixtures
// =============================================================================

/// OPC UA applications found on the plant network.
pub struct ApplicationFixtures;

impl ApplicationFixtures {
    /// Hydraulic press controller.
    pub fn press() -> ApplicationInfo {
        ApplicationInfo::new("urn:plant:press", ApplicationType::Server)
            .with_name("Press 1")
            .with_discovery_url("opc.tcp://press:4840")
            .with_host_address("10.0.0.11")
    }

    /// Paint mixer controller.
    pub fn mixer() -> ApplicationInfo {
        ApplicationInfo::new("urn:plant:mixer", ApplicationType::Server)
            .with_name("Mixer")
            .with_discovery_url("opc.tcp://mixer:4840")
            .with_host_address("10.0.0.12")
    }

    /// A local discovery server.
    pub fn lds() -> ApplicationInfo {
        ApplicationInfo::new("urn:plant:lds", ApplicationType::DiscoveryServer)
            .with_discovery_url("opc.tcp://lds:4840")
    }

    /// `count` distinct servers, `urn:plant:line:000` onwards.
    pub fn batch(count: usize) -> Vec<ApplicationInfo> {
        (0..count)
            .map(|i| {
                ApplicationInfo::new(format!("urn:plant:line:{:03}", i), ApplicationType::Server)
                    .with_discovery_url(format!("opc.tcp://line-{:03}:4840", i))
            })
            .collect()
    }
}

// =============================================================================
// Endpoint Fixtures
// =============================================================================

/// Endpoints as reported by discovery, before binding to an application.
pub struct EndpointFixtures;

impl EndpointFixtures {
    /// An unsecured endpoint.
    pub fn plain(url: &str) -> EndpointInfo {
        EndpointInfo::new(ApplicationId::new(""), url, None)
    }

    /// A signed and encrypted Basic256Sha256 endpoint.
    pub fn secured(url: &str) -> EndpointInfo {
        EndpointInfo::new(
            ApplicationId::new(""),
            url,
            Some(EndpointDescription::new(
                SecurityMode::SignAndEncrypt,
                SecurityPolicy::Basic256Sha256,
            )),
        )
    }
}

// =============================================================================
// Context Fixtures
// =============================================================================

/// Operation contexts.
pub struct ContextFixtures;

impl ContextFixtures {
    /// A human operator.
    pub fn operator() -> OperationContext {
        OperationContext::new("operator@plant")
    }

    /// The context a discoverer's sweep is applied under.
    pub fn discovery(id: &DiscovererId) -> OperationContext {
        OperationContext::new(id.as_str())
    }
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Discovery results and discovery requests.
//!
//! A discoverer reports one sweep as a batch of [`DiscoveryResult`]s sharing a
//! sweep timestamp. Each carries an application and optionally one of its
//! endpoints; the last one carries a [`DiscoveryResultSummary`] marking the
//! sweep complete.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::ApplicationInfo;
use crate::endpoint::EndpointInfo;
use crate::error::{RegistryError, RegistryResult};
use crate::merge::ApplicationRegistration;
use crate::types::{DiscovererId, OperationContext};

// =============================================================================
// DiscoveryResult
// =============================================================================

/// One finding of a sweep, or the sweep's terminating summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// Reporting discoverer.
    pub discoverer_id: DiscovererId,
    /// Sweep timestamp shared by every result of the sweep.
    pub time_stamp: DateTime<Utc>,
    /// Ordinal within the sweep.
    #[serde(default)]
    pub index: u32,
    /// Found application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationInfo>,
    /// Found endpoint of `application`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointInfo>,
    /// Present only on the terminating record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<DiscoveryResultSummary>,
}

impl DiscoveryResult {
    /// A finding.
    pub fn finding(
        discoverer_id: DiscovererId,
        time_stamp: DateTime<Utc>,
        index: u32,
        application: ApplicationInfo,
        endpoint: Option<EndpointInfo>,
    ) -> Self {
        Self {
            discoverer_id,
            time_stamp,
            index,
            application: Some(application),
            endpoint,
            result: None,
        }
    }

    /// The terminating summary.
    pub fn summary(
        discoverer_id: DiscovererId,
        time_stamp: DateTime<Utc>,
        index: u32,
        summary: DiscoveryResultSummary,
    ) -> Self {
        Self {
            discoverer_id,
            time_stamp,
            index,
            application: None,
            endpoint: None,
            result: Some(summary),
        }
    }

    /// Returns `true` if this record completes the sweep.
    #[inline]
    pub fn is_summary(&self) -> bool {
        self.result.is_some()
    }

    /// Converts the finding into a registration owned by the discoverer.
    ///
    /// Returns `None` for summaries and for findings without application.
    pub fn to_registration(&self) -> Option<ApplicationRegistration> {
        let mut application = self.application.clone()?.with_derived_id();
        if application.discoverer_id.is_none() {
            application.discoverer_id = Some(self.discoverer_id.clone());
        }
        Some(ApplicationRegistration::new(
            application,
            self.endpoint.iter().cloned(),
        ))
    }
}

/// Summary closing a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResultSummary {
    /// Discoverer that ran the sweep.
    pub discoverer_id: DiscovererId,
    /// Request that triggered the sweep, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Sweep completion time.
    pub time_stamp: DateTime<Utc>,
    /// The sweep only registers findings and must not mark anything stale.
    #[serde(default)]
    pub register_only: bool,
    /// Free-form diagnostics reported by the discoverer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<serde_json::Value>,
}

impl DiscoveryResultSummary {
    /// Summary of a periodic sweep.
    pub fn new(discoverer_id: DiscovererId, time_stamp: DateTime<Utc>) -> Self {
        Self {
            discoverer_id,
            request_id: None,
            time_stamp,
            register_only: false,
            diagnostics: None,
        }
    }

    /// Marks the sweep register-only.
    pub fn register_only(mut self) -> Self {
        self.register_only = true;
        self
    }

    /// Links the sweep to a request.
    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

// =============================================================================
// Requests
// =============================================================================

/// How aggressively a discoverer scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// Discovery off.
    Off,
    /// Local host only.
    #[default]
    Local,
    /// Directly attached networks.
    Network,
    /// Well-known ports on all reachable hosts.
    Fast,
    /// All ports on all reachable hosts.
    Scan,
}

/// Scan parameters of a discovery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiscoveryConfig {
    /// Address ranges to scan, e.g. `10.0.0.0/24`.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub address_ranges: BTreeSet<String>,
    /// Port ranges to probe, e.g. `4840-4850`.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub port_ranges: BTreeSet<String>,
    /// Discovery urls to query directly.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub discovery_urls: BTreeSet<String>,
    /// Locales to request names in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locales: Vec<String>,
    /// Upper bound on network probe time.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "option_secs")]
    pub max_network_probe_time: Option<Duration>,
}

/// One-shot discovery request routed to a discoverer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    /// Request id.
    pub id: String,
    /// Target discoverer. `None` lets the coordinator pick one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discoverer_id: Option<DiscovererId>,
    /// Scan mode.
    #[serde(default)]
    pub mode: DiscoveryMode,
    /// Scan parameters.
    #[serde(default)]
    pub configuration: DiscoveryConfig,
    /// Requesting authority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<OperationContext>,
}

impl DiscoveryRequest {
    /// Creates a request with a fresh id.
    pub fn new(mode: DiscoveryMode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            discoverer_id: None,
            mode,
            configuration: DiscoveryConfig::default(),
            context: None,
        }
    }

    /// Targets a discoverer.
    pub fn for_discoverer(mut self, discoverer_id: DiscovererId) -> Self {
        self.discoverer_id = Some(discoverer_id);
        self
    }

    /// Adds a discovery url to query.
    pub fn with_discovery_url(mut self, url: impl Into<String>) -> Self {
        self.configuration.discovery_urls.insert(url.into());
        self
    }

    /// Validates the request.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.id.trim().is_empty() {
            return Err(RegistryError::invalid_argument("id", "cannot be empty"));
        }
        if self.mode == DiscoveryMode::Off && self.configuration.discovery_urls.is_empty() {
            return Err(RegistryError::invalid_argument(
                "mode",
                "discovery is off and no discovery url was given",
            ));
        }
        Ok(())
    }
}

/// Advisory cancellation of a discovery request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryCancel {
    /// Request to cancel.
    pub id: String,
    /// Discoverer the request was routed to.
    pub discoverer_id: DiscovererId,
    /// Cancelling authority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<OperationContext>,
}

/// Message sent to discoverers on the requests topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryCommand {
    /// Run a discovery.
    Discover(DiscoveryRequest),
    /// Stop a running discovery.
    Cancel(DiscoveryCancel),
}

impl DiscoveryCommand {
    /// Target discoverer of the command.
    pub fn discoverer_id(&self) -> Option<&DiscovererId> {
        match self {
            Self::Discover(request) => request.discoverer_id.as_ref(),
            Self::Cancel(cancel) => Some(&cancel.discoverer_id),
        }
    }
}

mod option_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApplicationId, ApplicationType};

    fn disc() -> DiscovererId {
        DiscovererId::new("disc-1")
    }

    #[test]
    fn test_finding_to_registration_assigns_owner() {
        let app = ApplicationInfo::new("urn:x", ApplicationType::Server);
        let ep = EndpointInfo::new(ApplicationId::new(""), "opc.tcp://h:4840", None);
        let result = DiscoveryResult::finding(disc(), Utc::now(), 0, app.clone(), Some(ep));

        let reg = result.to_registration().unwrap();
        let owned = reg.application.as_ref().unwrap();
        assert_eq!(owned.discoverer_id, Some(disc()));
        assert_eq!(reg.endpoints.len(), 1);
        assert_eq!(reg.endpoints[0].application_id, app.application_id);
        assert_eq!(reg.endpoints[0].discoverer_id, Some(disc()));
    }

    #[test]
    fn test_summary_has_no_registration() {
        let now = Utc::now();
        let summary = DiscoveryResult::summary(disc(), now, 3, DiscoveryResultSummary::new(disc(), now));
        assert!(summary.is_summary());
        assert!(summary.to_registration().is_none());
    }

    #[test]
    fn test_command_is_tagged() {
        let cancel = DiscoveryCommand::Cancel(DiscoveryCancel {
            id: "r1".into(),
            discoverer_id: disc(),
            context: None,
        });
        let json = serde_json::to_value(&cancel).unwrap();
        assert_eq!(json["type"], "cancel");
        assert_eq!(cancel.discoverer_id(), Some(&disc()));
    }

    #[test]
    fn test_request_validation() {
        assert!(DiscoveryRequest::new(DiscoveryMode::Off).validate().is_err());
        assert!(DiscoveryRequest::new(DiscoveryMode::Off)
            .with_discovery_url("opc.tcp://h:4840")
            .validate()
            .is_ok());
        assert!(DiscoveryRequest::new(DiscoveryMode::Fast).validate().is_ok());
    }
}

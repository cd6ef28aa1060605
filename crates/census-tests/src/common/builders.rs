// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Builders
//!
//! Builders describing one discovery sweep. The same description can be
//! applied directly as a [`WorkingSet`] or streamed as the
//! [`DiscoveryResult`] sequence a discoverer would publish.
//!
//! ```text
//! SweepBuilder ──▶ working_set() ──▶ DiscoveryReconciler
//!              └─▶ results()     ──▶ SweepProcessor (findings + summary)
//! ```

use chrono::{DateTime, Utc};

use census_core::types::{ApplicationId, ApplicationType, DiscovererId};
use census_core::{
    ApplicationInfo, ApplicationRegistration, DiscoveryResult, DiscoveryResultSummary, EndpointInfo,
    WorkingSet,
};

use super::fixtures::{Clock, EndpointFixtures};

// =============================================================================
// SweepBuilder
// =============================================================================

/// Builder for one sweep of one discoverer.
#[derive(Debug, Clone)]
pub struct SweepBuilder {
    discoverer_id: DiscovererId,
    time_stamp: DateTime<Utc>,
    findings: Vec<(ApplicationInfo, Vec<EndpointInfo>)>,
    register_only: bool,
    request_id: Option<String>,
}

impl SweepBuilder {
    /// Starts an empty sweep of `discoverer` at [`Clock::t0`].
    pub fn new(discoverer: impl Into<DiscovererId>) -> Self {
        Self {
            discoverer_id: discoverer.into(),
            time_stamp: Clock::t0(),
            findings: Vec::new(),
            register_only: false,
            request_id: None,
        }
    }

    /// Sets the sweep time.
    pub fn at(mut self, time_stamp: DateTime<Utc>) -> Self {
        self.time_stamp = time_stamp;
        self
    }

    /// Adds an application with unsecured endpoints at `urls`.
    pub fn application(self, uri: &str, urls: &[&str]) -> Self {
        let application = ApplicationInfo::new(uri, ApplicationType::Server);
        let endpoints = urls.iter().map(|url| EndpointFixtures::plain(url)).collect();
        self.finding(application, endpoints)
    }

    /// Adds a finding.
    pub fn finding(mut self, application: ApplicationInfo, endpoints: Vec<EndpointInfo>) -> Self {
        self.findings.push((application, endpoints));
        self
    }

    /// Marks the sweep register-only.
    pub fn register_only(mut self) -> Self {
        self.register_only = true;
        self
    }

    /// Tags the summary with the request that triggered the sweep.
    pub fn for_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// The sweeping discoverer.
    pub fn discoverer(&self) -> &DiscovererId {
        &self.discoverer_id
    }

    /// The sweep time.
    pub fn time_stamp(&self) -> DateTime<Utc> {
        self.time_stamp
    }

    /// Whether the sweep is register-only.
    pub fn is_register_only(&self) -> bool {
        self.register_only
    }

    /// Ids the sweep's applications will be stored under.
    pub fn application_ids(&self) -> Vec<ApplicationId> {
        self.findings
            .iter()
            .map(|(app, _)| app.clone().with_derived_id().application_id)
            .collect()
    }

    /// Merges the findings the way the processor would.
    pub fn working_set(&self) -> WorkingSet {
        let mut set = WorkingSet::new();
        for result in self.findings() {
            if let Some(registration) = result.to_registration() {
                set.add_or_update(registration);
            }
        }
        set
    }

    /// The findings as published: one result per endpoint, or one without
    /// endpoint for an application that has none.
    pub fn findings(&self) -> Vec<DiscoveryResult> {
        let mut results = Vec::new();
        for (application, endpoints) in &self.findings {
            if endpoints.is_empty() {
                results.push(self.result(results.len(), application.clone(), None));
            }
            for endpoint in endpoints {
                results.push(self.result(results.len(), application.clone(), Some(endpoint.clone())));
            }
        }
        results
    }

    /// The terminating summary.
    pub fn summary(&self) -> DiscoveryResult {
        let mut summary = DiscoveryResultSummary::new(self.discoverer_id.clone(), self.time_stamp);
        if self.register_only {
            summary = summary.register_only();
        }
        if let Some(request_id) = &self.request_id {
            summary = summary.with_request(request_id.clone());
        }
        let index = self.findings().len() as u32;
        DiscoveryResult::summary(self.discoverer_id.clone(), self.time_stamp, index, summary)
    }

    /// Findings followed by the summary.
    pub fn results(&self) -> Vec<DiscoveryResult> {
        let mut results = self.findings();
        results.push(self.summary());
        results
    }

    fn result(&self, index: usize, application: ApplicationInfo, endpoint: Option<EndpointInfo>) -> DiscoveryResult {
        DiscoveryResult::finding(
            self.discoverer_id.clone(),
            self.time_stamp,
            index as u32,
            application,
            endpoint,
        )
    }
}

// =============================================================================
// RegistrationBuilder
// =============================================================================

/// Builder for a manual registration.
#[derive(Debug, Clone)]
pub struct RegistrationBuilder {
    application: ApplicationInfo,
    endpoints: Vec<EndpointInfo>,
}

impl RegistrationBuilder {
    /// Starts a registration of a server at `uri`.
    pub fn server(uri: &str) -> Self {
        Self {
            application: ApplicationInfo::new(uri, ApplicationType::Server),
            endpoints: Vec::new(),
        }
    }

    /// Starts from an existing application record.
    pub fn from_application(application: ApplicationInfo) -> Self {
        Self {
            application,
            endpoints: Vec::new(),
        }
    }

    /// Adds a capability.
    pub fn capability(mut self, capability: &str) -> Self {
        self.application = self.application.with_capability(capability);
        self
    }

    /// Sets the display name.
    pub fn name(mut self, name: &str) -> Self {
        self.application = self.application.with_name(name);
        self
    }

    /// Adds an unsecured endpoint.
    pub fn endpoint(mut self, url: &str) -> Self {
        self.endpoints.push(EndpointFixtures::plain(url));
        self
    }

    /// Adds a secured endpoint.
    pub fn secured_endpoint(mut self, url: &str) -> Self {
        self.endpoints.push(EndpointFixtures::secured(url));
        self
    }

    /// Returns the parts for `ApplicationRegistry::register`.
    pub fn build(self) -> (ApplicationInfo, Vec<EndpointInfo>) {
        (self.application, self.endpoints)
    }

    /// Returns the merged registration.
    pub fn registration(self) -> ApplicationRegistration {
        ApplicationRegistration::new(self.application.with_derived_id(), self.endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_results_end_with_summary() {
        let sweep = SweepBuilder::new("d1")
            .application("urn:a", &["opc.tcp://a:1", "opc.tcp://a:2"])
            .application("urn:b", &[]);
        let results = sweep.results();
        assert_eq!(results.len(), 4);
        assert!(results[3].is_summary());
        assert_eq!(results[3].index, 3);
    }

    #[test]
    fn test_working_set_merges_per_application() {
        let sweep = SweepBuilder::new("d1")
            .application("urn:a", &["opc.tcp://a:1", "opc.tcp://a:2"])
            .application("urn:b", &["opc.tcp://b:1"]);
        let set = sweep.working_set();
        assert_eq!(set.len(), 2);
        assert_eq!(set.endpoint_count(), 3);
    }
}

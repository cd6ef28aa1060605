// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Merge engine.
//!
//! Folds the raw findings of one sweep into a working set of
//! [`ApplicationRegistration`]s, one per physical application. Matching uses
//! [`SameAs`]; combining uses set union on every collection field and a
//! deterministic tie-break on scalar fields, so the final working set does
//! not depend on the order findings arrived in.
//!
//! # Architecture
//!
//! ```text
//!   DiscoveryResult ──► ApplicationRegistration ──► WorkingSet::add_or_update
//!                                                        │
//!                       ┌────────────────────────────────┤
//!                       ▼                                ▼
//!               no entry IsSameAs                 entry IsSameAs
//!               ──► append                        ──► union_with
//! ```
//!
//! Matching is a linear scan; a sweep batch is bounded and reconciliation is
//! not on a hot path.

use serde::{Deserialize, Serialize};

use crate::application::ApplicationInfo;
use crate::endpoint::EndpointInfo;
use crate::identity::{same_as_opt, SameAs};

/// Keeps the greater of two optional scalars.
///
/// A present value always wins over an absent one. Used wherever two reports
/// disagree on a non-identity field and the outcome must not depend on the
/// order the reports were merged in.
pub(crate) fn union_scalar<T: Ord + Clone>(target: &mut Option<T>, other: &Option<T>) {
    if let Some(incoming) = other {
        let replace = match target {
            None => true,
            Some(current) => incoming > current,
        };
        if replace {
            *target = Some(incoming.clone());
        }
    }
}

// =============================================================================
// ApplicationRegistration
// =============================================================================

/// One application together with the endpoints found for it.
///
/// Endpoints are kept ordered by id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApplicationRegistration {
    /// Application record, `None` only for endpoint-only findings.
    pub application: Option<ApplicationInfo>,
    /// Endpoints of the application.
    pub endpoints: Vec<EndpointInfo>,
}

impl ApplicationRegistration {
    /// Creates a registration. Endpoints are bound to the application.
    pub fn new(application: ApplicationInfo, endpoints: impl IntoIterator<Item = EndpointInfo>) -> Self {
        let mut registration = Self {
            application: None,
            endpoints: Vec::new(),
        };
        for endpoint in endpoints {
            registration.add_endpoint(endpoint.bind_to(&application));
        }
        registration.application = Some(application);
        registration
    }

    /// Returns the application id, if the registration has an application.
    pub fn application_id(&self) -> Option<&crate::types::ApplicationId> {
        self.application.as_ref().map(|a| &a.application_id)
    }

    /// Merges `incoming` into this registration.
    ///
    /// - Without an application of its own, the registration adopts the
    ///   incoming application wholesale.
    /// - Otherwise the application sets are unioned.
    /// - Each incoming endpoint is unioned into its matching endpoint, or
    ///   inserted when nothing matches.
    pub fn union_with(&mut self, incoming: &ApplicationRegistration) {
        match (&mut self.application, &incoming.application) {
            (None, Some(application)) => self.application = Some(application.clone()),
            (Some(existing), Some(application)) => existing.union_with(application),
            (_, None) => {}
        }

        for endpoint in &incoming.endpoints {
            self.add_endpoint(endpoint.clone());
        }
    }

    fn add_endpoint(&mut self, endpoint: EndpointInfo) {
        let mut matched = false;
        for existing in self.endpoints.iter_mut().filter(|e| e.is_same_as(&endpoint)) {
            existing.union_with(&endpoint);
            matched = true;
        }
        if !matched {
            let at = self
                .endpoints
                .partition_point(|e| e.id <= endpoint.id);
            self.endpoints.insert(at, endpoint);
        }
    }
}

// =============================================================================
// WorkingSet
// =============================================================================

/// In-memory result of merging one sweep.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    entries: Vec<ApplicationRegistration>,
}

impl WorkingSet {
    /// Creates an empty working set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a finding, merging it into the entry describing the same
    /// application if there is one.
    pub fn add_or_update(&mut self, discovered: ApplicationRegistration) {
        let existing = self.entries.iter_mut().find(|entry| {
            same_as_opt(entry.application.as_ref(), discovered.application.as_ref())
        });
        match existing {
            Some(entry) => entry.union_with(&discovered),
            None => self.entries.push(discovered),
        }
    }

    /// Number of distinct applications.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was merged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of distinct endpoints across all applications.
    pub fn endpoint_count(&self) -> usize {
        self.entries.iter().map(|e| e.endpoints.len()).sum()
    }

    /// Iterates the merged registrations in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ApplicationRegistration> {
        self.entries.iter()
    }

    /// Consumes the set, returning registrations ordered by application id.
    pub fn into_registrations(mut self) -> Vec<ApplicationRegistration> {
        self.entries
            .sort_by(|a, b| a.application_id().cmp(&b.application_id()));
        self.entries
    }
}

impl FromIterator<ApplicationRegistration> for WorkingSet {
    fn from_iter<I: IntoIterator<Item = ApplicationRegistration>>(iter: I) -> Self {
        let mut set = WorkingSet::new();
        for registration in iter {
            set.add_or_update(registration);
        }
        set
    }
}

// =============================================================================
// Tests
// =============================================================================

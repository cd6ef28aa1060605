// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Discovery reconciliation.
//!
//! Applies one completed sweep of one discoverer to the registry:
//!
//! ```text
//!   WorkingSet ──▶ for each application ──▶ upsert application ──▶ upsert endpoints
//!                                              (owner D, mark seen)
//!                                    │
//!                                    ▼   unless register_only
//!   records owned by D ──▶ staleness::plan ──▶ missed ──▶ mark_missed(sweep time) ──▶ Lost
//! ```
//!
//! Every record write goes through the optimistic writer, so a pass running
//! concurrently with another pass or a manual registration retries on fresh
//! state instead of overwriting it. Event delivery failures do not stop the
//! pass; the first publish failure is returned once all writes are done.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use census_core::error::RegistryResult;
use census_core::staleness::{self, Sighting, Watermarked};
use census_core::types::{DiscovererId, OperationContext};
use census_core::{ApplicationInfo, ChangeKind, EndpointInfo, WorkingSet};
use census_store::Versioned;

use crate::applications::ApplicationRegistry;
use crate::cas::Proposal;
use crate::notifier::{classify, Notifications};
use crate::queries::{ApplicationQuery, EndpointQuery};
use crate::registry::RegistryContext;

/// Counts of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Discoverer whose sweep was applied.
    pub discoverer_id: Option<DiscovererId>,
    /// Applications in the sweep.
    pub applications: usize,
    /// Endpoints in the sweep.
    pub endpoints: usize,
    /// Records created.
    pub created: usize,
    /// Records whose content changed.
    pub updated: usize,
    /// Stale records seen again.
    pub found: usize,
    /// Records missing from the sweep.
    pub lost: usize,
    /// Whether the staleness step was skipped.
    pub register_only: bool,
}

impl ReconcileReport {
    /// Total records changed by the pass.
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.found + self.lost
    }
}

/// Reconciler counters.
#[derive(Debug, Default)]
pub struct ReconcilerMetrics {
    passes: AtomicU64,
    failed_passes: AtomicU64,
    records_lost: AtomicU64,
    records_found: AtomicU64,
}

impl ReconcilerMetrics {
    /// Returns a snapshot.
    pub fn snapshot(&self) -> ReconcilerMetricsSnapshot {
        ReconcilerMetricsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            failed_passes: self.failed_passes.load(Ordering::Relaxed),
            records_lost: self.records_lost.load(Ordering::Relaxed),
            records_found: self.records_found.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`ReconcilerMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerMetricsSnapshot {
    /// Passes completed.
    pub passes: u64,
    /// Passes that returned an error.
    pub failed_passes: u64,
    /// Records marked lost.
    pub records_lost: u64,
    /// Records found again.
    pub records_found: u64,
}

/// Applies completed sweeps to the registry.
#[derive(Debug)]
pub struct DiscoveryReconciler {
    context: Arc<RegistryContext>,
    applications: ApplicationRegistry,
    metrics: ReconcilerMetrics,
}

impl DiscoveryReconciler {
    /// Creates a reconciler over a registry context.
    pub fn new(context: Arc<RegistryContext>) -> Self {
        Self {
            applications: ApplicationRegistry::new(Arc::clone(&context)),
            context,
            metrics: ReconcilerMetrics::default(),
        }
    }

    /// Returns the counters.
    pub fn metrics(&self) -> ReconcilerMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Applies the sweep `working_set` of `discoverer_id`.
    ///
    /// `time_stamp` is the sweep time and becomes the not-seen watermark of
    /// records the sweep missed. With `register_only` nothing is marked.
    #[instrument(skip(self, discoverer_id, working_set, context), fields(discoverer = %discoverer_id))]
    pub async fn reconcile(
        &self,
        discoverer_id: &DiscovererId,
        working_set: WorkingSet,
        register_only: bool,
        time_stamp: DateTime<Utc>,
        context: &OperationContext,
    ) -> RegistryResult<ReconcileReport> {
        let result = self
            .run(discoverer_id, working_set, register_only, time_stamp, context)
            .await;
        match &result {
            Ok(report) => {
                self.metrics.passes.fetch_add(1, Ordering::Relaxed);
                self.metrics.records_lost.fetch_add(report.lost as u64, Ordering::Relaxed);
                self.metrics.records_found.fetch_add(report.found as u64, Ordering::Relaxed);
                info!(
                    applications = report.applications,
                    endpoints = report.endpoints,
                    created = report.created,
                    updated = report.updated,
                    found = report.found,
                    lost = report.lost,
                    "Sweep reconciled"
                );
            }
            Err(_) => {
                self.metrics.failed_passes.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    async fn run(
        &self,
        discoverer_id: &DiscovererId,
        working_set: WorkingSet,
        register_only: bool,
        time_stamp: DateTime<Utc>,
        context: &OperationContext,
    ) -> RegistryResult<ReconcileReport> {
        let mut notifications = Notifications::new();
        let mut present_applications = Vec::with_capacity(working_set.len());
        let mut present_endpoints = Vec::with_capacity(working_set.endpoint_count());

        for registration in working_set.into_registrations() {
            let stored = self
                .applications
                .upsert(&registration, Some(discoverer_id), context, &mut notifications)
                .await?;
            present_applications.extend(stored.application);
            present_endpoints.extend(stored.endpoints);
        }

        let mut report = ReconcileReport {
            discoverer_id: Some(discoverer_id.clone()),
            applications: present_applications.len(),
            endpoints: present_endpoints.len(),
            register_only,
            ..ReconcileReport::default()
        };

        if !register_only {
            let owned = self
                .context
                .applications
                .query_all(
                    &ApplicationQuery::all()
                        .with_discoverer(discoverer_id.clone())
                        .including_not_seen()
                        .to_filter(),
                )
                .await?;
            let plan = staleness::plan(owned, &present_applications);
            for missed in &plan.missed {
                self.mark_application_missed(missed, discoverer_id, time_stamp, context, &mut notifications)
                    .await?;
            }

            let owned = self
                .context
                .endpoints
                .query_all(
                    &EndpointQuery {
                        discoverer_id: Some(discoverer_id.clone()),
                        ..EndpointQuery::all().including_not_seen()
                    }
                    .to_filter(),
                )
                .await?;
            let plan = staleness::plan(owned, &present_endpoints);
            for missed in &plan.missed {
                self.mark_endpoint_missed(missed, discoverer_id, time_stamp, context, &mut notifications)
                    .await?;
            }
        }

        report.created = notifications.count(ChangeKind::New);
        report.updated = notifications.count(ChangeKind::Updated);
        report.found = notifications.count(ChangeKind::Found);
        report.lost = notifications.count(ChangeKind::Lost);
        notifications.into_result()?;
        Ok(report)
    }

    async fn mark_application_missed(
        &self,
        missed: &ApplicationInfo,
        discoverer_id: &DiscovererId,
        time_stamp: DateTime<Utc>,
        context: &OperationContext,
        notifications: &mut Notifications,
    ) -> RegistryResult<()> {
        let outcome = self
            .context
            .writer
            .write(&self.context.applications, missed.document_id(), |current| {
                Ok(mark_missed(current, |r| r.is_owned_by(discoverer_id), time_stamp, context))
            })
            .await?;
        if let (Some(change), Some(after)) = (classify(outcome.before(), outcome.after()), outcome.after()) {
            debug!(application_id = %after.application_id, change = %change, "Application missed by sweep");
            self.context
                .notifier
                .application(change, context, after, notifications)
                .await;
        }
        Ok(())
    }

    async fn mark_endpoint_missed(
        &self,
        missed: &EndpointInfo,
        discoverer_id: &DiscovererId,
        time_stamp: DateTime<Utc>,
        context: &OperationContext,
        notifications: &mut Notifications,
    ) -> RegistryResult<()> {
        let outcome = self
            .context
            .writer
            .write(&self.context.endpoints, missed.document_id(), |current| {
                Ok(mark_missed(current, |r| r.is_owned_by(discoverer_id), time_stamp, context))
            })
            .await?;
        if let (Some(change), Some(after)) = (classify(outcome.before(), outcome.after()), outcome.after()) {
            debug!(endpoint_id = %after.id, change = %change, "Endpoint missed by sweep");
            self.context
                .notifier
                .endpoint(change, context, after, notifications)
                .await;
        }
        Ok(())
    }
}

/// Decides the staleness write for a record the sweep did not contain.
///
/// The record is re-checked on every attempt: if it vanished or another
/// discoverer took it over in the meantime it is left alone.
fn mark_missed<T, F>(
    current: Option<&T>,
    still_owned: F,
    time_stamp: DateTime<Utc>,
    context: &OperationContext,
) -> Proposal<T>
where
    T: Watermarked + Clone + WithUpdated,
    F: Fn(&T) -> bool,
{
    let Some(current) = current else {
        return Proposal::Keep;
    };
    if !still_owned(current) {
        return Proposal::Keep;
    }
    let mut next = current.clone();
    match next.mark_missed(time_stamp) {
        Sighting::Unchanged => Proposal::Keep,
        _ => {
            next.set_updated(context);
            Proposal::Write(next)
        }
    }
}

/// Records that carry an update context.
trait WithUpdated {
    fn set_updated(&mut self, context: &OperationContext);
}

impl WithUpdated for ApplicationInfo {
    fn set_updated(&mut self, context: &OperationContext) {
        self.updated = Some(context.clone());
    }
}

impl WithUpdated for EndpointInfo {
    fn set_updated(&mut self, context: &OperationContext) {
        self.updated = Some(context.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use census_core::types::{ApplicationId, ApplicationType};
    use census_core::ApplicationRegistration;
    use census_store::{DocumentStore, MemoryDocumentStore};

    use crate::registry::{Registry, RegistryConfig};

    fn registry() -> Registry {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::default());
        Registry::builder(store).config(RegistryConfig::for_testing()).build()
    }

    fn sweep(uris: &[&str]) -> WorkingSet {
        let mut set = WorkingSet::new();
        for uri in uris {
            let app = ApplicationInfo::new(*uri, ApplicationType::Server).with_derived_id();
            let endpoint = EndpointInfo::new(ApplicationId::new(""), format!("opc.tcp://{uri}:4840"), None);
            set.add_or_update(ApplicationRegistration::new(app, [endpoint]));
        }
        set
    }

    #[test]
    fn test_mark_missed_skips_foreign_owner() {
        let ctx = OperationContext::system();
        let record = ApplicationInfo::new("urn:x", ApplicationType::Server)
            .with_derived_id();
        let proposal = mark_missed(Some(&record), |_| false, Utc::now(), &ctx);
        assert_eq!(proposal, Proposal::Keep);
        assert_eq!(mark_missed::<ApplicationInfo, _>(None, |_| true, Utc::now(), &ctx), Proposal::Keep);
    }

    #[test]
    fn test_mark_missed_preserves_first_time() {
        let ctx = OperationContext::system();
        let first = Utc::now() - chrono::Duration::hours(1);
        let mut record = ApplicationInfo::new("urn:x", ApplicationType::Server);
        record.not_seen_since = Some(first);
        assert_eq!(mark_missed(Some(&record), |_| true, Utc::now(), &ctx), Proposal::Keep);
    }

    #[tokio::test]
    async fn test_first_sweep_creates_everything() {
        let registry = registry();
        let d1 = DiscovererId::new("d1");
        let report = registry
            .reconciler()
            .reconcile(&d1, sweep(&["urn:a", "urn:b"]), false, Utc::now(), &OperationContext::system())
            .await
            .unwrap();
        assert_eq!(report.applications, 2);
        assert_eq!(report.endpoints, 2);
        assert_eq!(report.created, 4);
        assert_eq!(report.lost, 0);

        let page = registry
            .applications()
            .query(&ApplicationQuery::all().with_discoverer(d1), None, None)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_sweep_changes_nothing() {
        let registry = registry();
        let d1 = DiscovererId::new("d1");
        let ctx = OperationContext::system();
        registry
            .reconciler()
            .reconcile(&d1, sweep(&["urn:a"]), false, Utc::now(), &ctx)
            .await
            .unwrap();
        let report = registry
            .reconciler()
            .reconcile(&d1, sweep(&["urn:a"]), false, Utc::now(), &ctx)
            .await
            .unwrap();
        assert_eq!(report.changes(), 0);
    }

    #[tokio::test]
    async fn test_missing_records_lost_then_found() {
        let registry = registry();
        let d1 = DiscovererId::new("d1");
        let ctx = OperationContext::system();
        registry
            .reconciler()
            .reconcile(&d1, sweep(&["urn:a", "urn:b"]), false, Utc::now(), &ctx)
            .await
            .unwrap();

        let missed_at = Utc::now();
        let report = registry
            .reconciler()
            .reconcile(&d1, sweep(&["urn:a"]), false, missed_at, &ctx)
            .await
            .unwrap();
        assert_eq!(report.lost, 2);

        let b = ApplicationInfo::new("urn:b", ApplicationType::Server).application_id;
        let stored = registry.applications().get(&b).await.unwrap();
        assert_eq!(stored.not_seen_since, Some(missed_at));

        let report = registry
            .reconciler()
            .reconcile(&d1, sweep(&["urn:a"]), false, Utc::now(), &ctx)
            .await
            .unwrap();
        assert_eq!(report.lost, 0);
        assert_eq!(
            registry.applications().get(&b).await.unwrap().not_seen_since,
            Some(missed_at)
        );

        let report = registry
            .reconciler()
            .reconcile(&d1, sweep(&["urn:a", "urn:b"]), false, Utc::now(), &ctx)
            .await
            .unwrap();
        assert_eq!(report.found, 2);
        assert!(!registry.applications().get(&b).await.unwrap().is_stale());
    }

    #[tokio::test]
    async fn test_register_only_marks_nothing() {
        let registry = registry();
        let d1 = DiscovererId::new("d1");
        let ctx = OperationContext::system();
        registry
            .reconciler()
            .reconcile(&d1, sweep(&["urn:a", "urn:b"]), false, Utc::now(), &ctx)
            .await
            .unwrap();
        let report = registry
            .reconciler()
            .reconcile(&d1, WorkingSet::new(), true, Utc::now(), &ctx)
            .await
            .unwrap();
        assert_eq!(report.lost, 0);
        assert!(report.register_only);
    }

    #[tokio::test]
    async fn test_other_discoverers_records_untouched() {
        let registry = registry();
        let ctx = OperationContext::system();
        let d1 = DiscovererId::new("d1");
        let d2 = DiscovererId::new("d2");
        registry
            .reconciler()
            .reconcile(&d1, sweep(&["urn:a"]), false, Utc::now(), &ctx)
            .await
            .unwrap();
        let report = registry
            .reconciler()
            .reconcile(&d2, sweep(&["urn:b"]), false, Utc::now(), &ctx)
            .await
            .unwrap();
        assert_eq!(report.lost, 0);

        let a = ApplicationInfo::new("urn:a", ApplicationType::Server).application_id;
        let stored = registry.applications().get(&a).await.unwrap();
        assert_eq!(stored.discoverer_id, Some(d1));
        assert!(!stored.is_stale());
    }

    #[tokio::test]
    async fn test_stale_record_taken_over_by_other_discoverer() {
        let registry = registry();
        let ctx = OperationContext::system();
        let d1 = DiscovererId::new("d1");
        let d2 = DiscovererId::new("d2");
        registry
            .reconciler()
            .reconcile(&d1, sweep(&["urn:a"]), false, Utc::now(), &ctx)
            .await
            .unwrap();
        registry
            .reconciler()
            .reconcile(&d1, WorkingSet::new(), false, Utc::now(), &ctx)
            .await
            .unwrap();
        let report = registry
            .reconciler()
            .reconcile(&d2, sweep(&["urn:a"]), false, Utc::now(), &ctx)
            .await
            .unwrap();
        assert_eq!(report.found, 2);

        let a = ApplicationInfo::new("urn:a", ApplicationType::Server).application_id;
        assert_eq!(registry.applications().get(&a).await.unwrap().discoverer_id, Some(d2));
        assert_eq!(registry.reconciler().metrics().passes, 3);
    }
}

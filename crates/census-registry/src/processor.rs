// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Sweep buffering.
//!
//! Discoverers stream one [`DiscoveryResult`] per finding, all carrying the
//! sweep timestamp, and close the sweep with a summary record. The processor
//! gathers findings per discoverer into a [`WorkingSet`] and hands the set to
//! the reconciler when the summary arrives.
//!
//! ```text
//!   finding(D, t) ──▶ buffer[D] ─┬─ t == buffer.t ──▶ add_or_update
//!                                ├─ t >  buffer.t ──▶ abandon old buffer, start new
//!                                └─ t <  buffer.t ──▶ drop (late result)
//!
//!   summary(D, t) ──▶ take buffer[D] ──▶ lane[D] ──▶ reconcile(D, set, register_only, t)
//! ```
//!
//! A discoverer has at most one open buffer, so `max_pending_sweeps` bounds
//! the number of discoverers with a sweep in flight.
//!
//! Only a complete sweep is reconciled: an incomplete set would mark records
//! missing that were merely not received. A sweep is discarded when
//!
//! - it grows past `max_sweep_results`,
//! - its first received finding has a non-zero index,
//! - its summary index counts more findings than were received, or
//! - the subscription lagged while it was open.
//!
//! [`SweepProcessor::run`] reconciles on one worker lane per discoverer, so
//! the subscription keeps draining while a pass is in flight and one
//! discoverer's slow pass never delays another's.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use census_core::bus::BusSubscriber;
use census_core::error::{BusError, RegistryResult};
use census_core::types::{DiscovererId, OperationContext};
use census_core::{DiscoveryResult, DiscoveryResultSummary, WorkingSet};

use crate::coordinator::DiscoveryCoordinator;
use crate::reconciler::{DiscoveryReconciler, ReconcileReport};
use crate::registry::RegistryConfig;

// =============================================================================
// Disposition
// =============================================================================

/// Why a result was not buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Finding without application.
    Malformed,
    /// Result of a sweep older than the open one.
    Late,
    /// Too many sweeps in flight.
    TooManySweeps,
    /// The sweep exceeded the result limit.
    Overflow,
    /// Findings of the sweep were lost before they reached the processor.
    Incomplete,
}

impl DropReason {
    /// Returns the name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Late => "late",
            Self::TooManySweeps => "too_many_sweeps",
            Self::Overflow => "overflow",
            Self::Incomplete => "incomplete",
        }
    }
}

/// What happened to one processed result.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Added to the open sweep.
    Buffered,
    /// Discarded.
    Dropped(DropReason),
    /// Closed the sweep, which was reconciled.
    Reconciled(ReconcileReport),
}

impl Disposition {
    /// Returns `true` if the result completed a sweep.
    pub fn is_reconciled(&self) -> bool {
        matches!(self, Self::Reconciled(_))
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Processor counters.
#[derive(Debug, Default)]
pub struct ProcessorMetrics {
    results: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
    lagged: AtomicU64,
    sweeps_reconciled: AtomicU64,
    sweeps_abandoned: AtomicU64,
    sweeps_failed: AtomicU64,
}

impl ProcessorMetrics {
    /// Returns a snapshot.
    pub fn snapshot(&self) -> ProcessorMetricsSnapshot {
        ProcessorMetricsSnapshot {
            results: self.results.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            lagged: self.lagged.load(Ordering::Relaxed),
            sweeps_reconciled: self.sweeps_reconciled.load(Ordering::Relaxed),
            sweeps_abandoned: self.sweeps_abandoned.load(Ordering::Relaxed),
            sweeps_failed: self.sweeps_failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`ProcessorMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorMetricsSnapshot {
    /// Results received.
    pub results: u64,
    /// Results discarded.
    pub dropped: u64,
    /// Bus messages that did not decode.
    pub malformed: u64,
    /// Bus messages lost to subscription lag.
    pub lagged: u64,
    /// Sweeps reconciled.
    pub sweeps_reconciled: u64,
    /// Sweeps replaced by a newer one or discarded as oversized or incomplete.
    pub sweeps_abandoned: u64,
    /// Sweeps whose reconciliation failed.
    pub sweeps_failed: u64,
}

// =============================================================================
// SweepProcessor
// =============================================================================

#[derive(Debug)]
struct SweepBuffer {
    time_stamp: DateTime<Utc>,
    working_set: WorkingSet,
    results: usize,
    overflowed: bool,
    incomplete: bool,
}

impl SweepBuffer {
    fn new(time_stamp: DateTime<Utc>, first_index: u32) -> Self {
        Self {
            time_stamp,
            working_set: WorkingSet::new(),
            results: 0,
            overflowed: false,
            incomplete: first_index > 0,
        }
    }

    fn discard(&mut self) {
        self.working_set = WorkingSet::new();
    }
}

/// A complete sweep waiting for reconciliation.
#[derive(Debug)]
struct ClosedSweep {
    discoverer_id: DiscovererId,
    time_stamp: DateTime<Utc>,
    working_set: WorkingSet,
    summary: DiscoveryResultSummary,
}

/// Buffers sweep results per discoverer and reconciles completed sweeps.
#[derive(Debug)]
pub struct SweepProcessor {
    reconciler: Arc<DiscoveryReconciler>,
    coordinator: Option<Arc<DiscoveryCoordinator>>,
    sweeps: DashMap<DiscovererId, SweepBuffer>,
    max_sweep_results: usize,
    max_pending_sweeps: usize,
    context: OperationContext,
    metrics: ProcessorMetrics,
}

impl SweepProcessor {
    /// Creates a processor feeding `reconciler`.
    pub fn new(reconciler: Arc<DiscoveryReconciler>, config: &RegistryConfig) -> Self {
        Self {
            reconciler,
            coordinator: None,
            sweeps: DashMap::new(),
            max_sweep_results: config.max_sweep_results,
            max_pending_sweeps: config.max_pending_sweeps,
            context: OperationContext::system(),
            metrics: ProcessorMetrics::default(),
        }
    }

    /// Attributes reconciliations to `context` instead of the system.
    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }

    /// Completes requests of `coordinator` when their sweep is reconciled.
    pub fn with_coordinator(mut self, coordinator: Arc<DiscoveryCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Returns the counters.
    pub fn metrics(&self) -> ProcessorMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Number of open sweeps.
    pub fn pending_sweeps(&self) -> usize {
        self.sweeps.len()
    }

    /// Processes one result, reconciling inline when it closes a sweep.
    ///
    /// Only a summary can fail, with the error of its reconciliation.
    pub async fn process(&self, result: DiscoveryResult) -> RegistryResult<Disposition> {
        match self.accept(result) {
            Accepted::Done(disposition) => Ok(disposition),
            Accepted::Closed(sweep) => self.reconcile_sweep(sweep).await,
        }
    }

    /// Marks every open sweep incomplete after results were lost.
    pub fn poison_open_sweeps(&self, lost: u64) {
        self.metrics.lagged.fetch_add(lost, Ordering::Relaxed);
        let mut poisoned = 0usize;
        for mut buffer in self.sweeps.iter_mut() {
            if !buffer.incomplete {
                buffer.incomplete = true;
                buffer.discard();
                poisoned += 1;
            }
        }
        warn!(lost, poisoned, "Discovery results lost, open sweeps will be discarded");
    }

    fn accept(&self, result: DiscoveryResult) -> Accepted {
        self.metrics.results.fetch_add(1, Ordering::Relaxed);
        match result.result.clone() {
            Some(summary) => self.close(result.discoverer_id, result.time_stamp, result.index, summary),
            None => Accepted::Done(self.buffer(result)),
        }
    }

    fn buffer(&self, result: DiscoveryResult) -> Disposition {
        if !self.sweeps.contains_key(&result.discoverer_id)
            && self.sweeps.len() >= self.max_pending_sweeps
        {
            return self.drop_result(&result.discoverer_id, DropReason::TooManySweeps);
        }

        let mut buffer = match self.sweeps.entry(result.discoverer_id.clone()) {
            Entry::Vacant(vacant) => vacant.insert(SweepBuffer::new(result.time_stamp, result.index)),
            Entry::Occupied(mut occupied) => {
                let open = occupied.get().time_stamp;
                if result.time_stamp < open {
                    drop(occupied);
                    return self.drop_result(&result.discoverer_id, DropReason::Late);
                }
                if result.time_stamp > open {
                    let abandoned = occupied.insert(SweepBuffer::new(result.time_stamp, result.index));
                    self.metrics.sweeps_abandoned.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        discoverer = %result.discoverer_id,
                        abandoned = %abandoned.time_stamp,
                        results = abandoned.results,
                        started = %result.time_stamp,
                        "Sweep abandoned for a newer one"
                    );
                }
                occupied.into_ref()
            }
        };

        // Malformed findings still belong to the sweep and count towards its size.
        buffer.results += 1;
        let Some(registration) = result.to_registration() else {
            drop(buffer);
            return self.drop_result(&result.discoverer_id, DropReason::Malformed);
        };
        if buffer.overflowed {
            drop(buffer);
            return self.drop_result(&result.discoverer_id, DropReason::Overflow);
        }
        if buffer.results > self.max_sweep_results {
            buffer.overflowed = true;
            buffer.discard();
            warn!(
                discoverer = %result.discoverer_id,
                limit = self.max_sweep_results,
                "Sweep exceeded result limit, discarding"
            );
            drop(buffer);
            return self.drop_result(&result.discoverer_id, DropReason::Overflow);
        }
        if !buffer.incomplete {
            buffer.working_set.add_or_update(registration);
        }
        Disposition::Buffered
    }

    fn close(
        &self,
        discoverer_id: DiscovererId,
        time_stamp: DateTime<Utc>,
        index: u32,
        summary: DiscoveryResultSummary,
    ) -> Accepted {
        let taken = self
            .sweeps
            .remove_if(&discoverer_id, |_, buffer| buffer.time_stamp <= time_stamp);
        let (received, working_set) = match taken {
            Some((_, buffer)) if buffer.time_stamp < time_stamp => {
                self.metrics.sweeps_abandoned.fetch_add(1, Ordering::Relaxed);
                warn!(discoverer = %discoverer_id, abandoned = %buffer.time_stamp, "Sweep closed by a newer summary");
                (0, WorkingSet::new())
            }
            Some((_, buffer)) if buffer.overflowed => {
                return self.abandon(&discoverer_id, DropReason::Overflow);
            }
            Some((_, buffer)) if buffer.incomplete => {
                return self.abandon(&discoverer_id, DropReason::Incomplete);
            }
            Some((_, buffer)) => (buffer.results, buffer.working_set),
            None if self.sweeps.contains_key(&discoverer_id) => {
                return Accepted::Done(self.drop_result(&discoverer_id, DropReason::Late));
            }
            None => (0, WorkingSet::new()),
        };
        if (index as usize) > received {
            warn!(
                discoverer = %discoverer_id,
                expected = index,
                received,
                "Sweep summary counts findings that never arrived"
            );
            return self.abandon(&discoverer_id, DropReason::Incomplete);
        }

        debug!(
            discoverer = %discoverer_id,
            applications = working_set.len(),
            request_id = summary.request_id.as_deref().unwrap_or_default(),
            "Sweep complete"
        );
        Accepted::Closed(ClosedSweep {
            discoverer_id,
            time_stamp,
            working_set,
            summary,
        })
    }

    async fn reconcile_sweep(&self, sweep: ClosedSweep) -> RegistryResult<Disposition> {
        let ClosedSweep {
            discoverer_id,
            time_stamp,
            working_set,
            summary,
        } = sweep;
        match self
            .reconciler
            .reconcile(&discoverer_id, working_set, summary.register_only, time_stamp, &self.context)
            .await
        {
            Ok(report) => {
                self.metrics.sweeps_reconciled.fetch_add(1, Ordering::Relaxed);
                if let (Some(coordinator), Some(request_id)) = (&self.coordinator, &summary.request_id) {
                    coordinator.complete(request_id);
                }
                Ok(Disposition::Reconciled(report))
            }
            Err(e) => {
                self.metrics.sweeps_failed.fetch_add(1, Ordering::Relaxed);
                error!(discoverer = %discoverer_id, error = %e, "Sweep reconciliation failed");
                Err(e)
            }
        }
    }

    fn abandon(&self, discoverer_id: &DiscovererId, reason: DropReason) -> Accepted {
        self.metrics.sweeps_abandoned.fetch_add(1, Ordering::Relaxed);
        Accepted::Done(self.drop_result(discoverer_id, reason))
    }

    fn drop_result(&self, discoverer_id: &DiscovererId, reason: DropReason) -> Disposition {
        self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
        debug!(discoverer = %discoverer_id, reason = reason.name(), "Discovery result dropped");
        Disposition::Dropped(reason)
    }

    /// Consumes results from `subscriber` until shutdown or bus close.
    ///
    /// Closed sweeps are queued on their discoverer's lane. On return every
    /// queued sweep has been reconciled.
    pub async fn run(self: Arc<Self>, mut subscriber: BusSubscriber, mut shutdown: broadcast::Receiver<()>) {
        info!("Sweep processor started");
        let mut lanes: HashMap<DiscovererId, mpsc::UnboundedSender<ClosedSweep>> = HashMap::new();
        let mut workers = JoinSet::new();
        loop {
            let message = tokio::select! {
                _ = shutdown.recv() => {
                    info!("Sweep processor received shutdown signal");
                    break;
                }
                message = subscriber.recv() => message,
            };
            let message = match message {
                Ok(message) => message,
                Err(BusError::Closed) => {
                    info!("Discovery results topic closed");
                    break;
                }
                Err(BusError::Lagged { count }) => {
                    self.poison_open_sweeps(count);
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Discovery results receive failed");
                    continue;
                }
            };
            let result = match message.decode::<DiscoveryResult>() {
                Ok(result) => result,
                Err(e) => {
                    self.metrics.malformed.fetch_add(1, Ordering::Relaxed);
                    self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "Malformed discovery result dropped");
                    continue;
                }
            };
            let Accepted::Closed(sweep) = self.accept(result) else {
                continue;
            };
            let lane = lanes.entry(sweep.discoverer_id.clone()).or_insert_with(|| {
                let (sender, receiver) = mpsc::unbounded_channel();
                workers.spawn(Arc::clone(&self).drain_lane(receiver));
                sender
            });
            if let Err(mpsc::error::SendError(sweep)) = lane.send(sweep) {
                error!(discoverer = %sweep.discoverer_id, "Sweep lane closed, sweep dropped");
            }
        }

        drop(lanes);
        while workers.join_next().await.is_some() {}
        info!(pending = self.sweeps.len(), "Sweep processor stopped");
    }

    async fn drain_lane(self: Arc<Self>, mut sweeps: mpsc::UnboundedReceiver<ClosedSweep>) {
        while let Some(sweep) = sweeps.recv().await {
            // Reconciliation errors are already logged and counted.
            let _ = self.reconcile_sweep(sweep).await;
        }
    }
}

enum Accepted {
    Done(Disposition),
    Closed(ClosedSweep),
}

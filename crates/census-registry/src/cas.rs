// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Optimistic read-decide-write loop.
//!
//! Every mutation of a registry record goes through [`OptimisticWriter::write`]:
//!
//! ```text
//!        ┌──────────────────────────────────────────────────┐
//!        ▼                                                  │
//!   find(id) ──▶ decide(current) ──┬─ Keep ──▶ Unchanged    │
//!                                  ├─ Write ─┬─ None ─▶ add ──── Conflict ───┤
//!                                  │         └─ Some ─▶ replace ─ Stale ─────┤
//!                                  └─ Delete ───────▶ delete ── Stale ───────┘
//!                                                              (backoff, retry)
//! ```
//!
//! The loop has no attempt limit. Each iteration re-reads the record and
//! re-runs `decide` on fresh state, so a retry never replays an outdated
//! proposal. Errors returned by `decide` or by the store end the loop.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use census_core::error::RegistryResult;
use census_core::retry::{BackoffConfig, ConflictBackoff};
use census_store::{Collection, Versioned, WriteOutcome};

// =============================================================================
// Proposal / Outcome
// =============================================================================

/// What `decide` wants done with the record it was shown.
#[derive(Debug, Clone, PartialEq)]
pub enum Proposal<T> {
    /// Leave the record as it is.
    Keep,
    /// Store this state, creating the record if it does not exist.
    Write(T),
    /// Remove the record.
    Delete,
}

/// Result of a completed optimistic write.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome<T> {
    /// The record did not exist and was created.
    Created(T),
    /// The record was replaced.
    Updated {
        /// State the write was decided on.
        before: T,
        /// Stored state.
        after: T,
    },
    /// Nothing was written. Carries the record as read, if any.
    Unchanged(Option<T>),
    /// The record was removed. Carries its last state.
    Deleted(T),
}

impl<T> UpsertOutcome<T> {
    /// State before the write.
    pub fn before(&self) -> Option<&T> {
        match self {
            Self::Created(_) => None,
            Self::Updated { before, .. } => Some(before),
            Self::Unchanged(current) => current.as_ref(),
            Self::Deleted(removed) => Some(removed),
        }
    }

    /// State after the write.
    pub fn after(&self) -> Option<&T> {
        match self {
            Self::Created(after) | Self::Updated { after, .. } => Some(after),
            Self::Unchanged(current) => current.as_ref(),
            Self::Deleted(_) => None,
        }
    }

    /// Consumes the outcome, returning the state after the write.
    pub fn into_after(self) -> Option<T> {
        match self {
            Self::Created(after) | Self::Updated { after, .. } => Some(after),
            Self::Unchanged(current) => current,
            Self::Deleted(_) => None,
        }
    }

    /// Returns `true` if the store was modified.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Unchanged(_))
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated { .. } => "updated",
            Self::Unchanged(_) => "unchanged",
            Self::Deleted(_) => "deleted",
        }
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Counters of the optimistic write loop.
#[derive(Debug, Default)]
pub struct WriteMetrics {
    attempts: AtomicU64,
    created: AtomicU64,
    updated: AtomicU64,
    deleted: AtomicU64,
    unchanged: AtomicU64,
    conflicts: AtomicU64,
    stale_versions: AtomicU64,
    vanished: AtomicU64,
    retries: AtomicU64,
}

impl WriteMetrics {
    /// Creates zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_outcome<T>(&self, outcome: &UpsertOutcome<T>) {
        let counter = match outcome {
            UpsertOutcome::Created(_) => &self.created,
            UpsertOutcome::Updated { .. } => &self.updated,
            UpsertOutcome::Unchanged(_) => &self.unchanged,
            UpsertOutcome::Deleted(_) => &self.deleted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_lost_race<T>(&self, outcome: &WriteOutcome<T>) {
        let counter = match outcome {
            WriteOutcome::Conflict => &self.conflicts,
            WriteOutcome::StaleVersion => &self.stale_versions,
            WriteOutcome::NotFound | WriteOutcome::Written(_) => &self.vanished,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot.
    pub fn snapshot(&self) -> WriteMetricsSnapshot {
        WriteMetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            stale_versions: self.stale_versions.load(Ordering::Relaxed),
            vanished: self.vanished.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of write loop counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteMetricsSnapshot {
    /// Read-decide-write iterations.
    pub attempts: u64,
    /// Records created.
    pub created: u64,
    /// Records replaced.
    pub updated: u64,
    /// Records deleted.
    pub deleted: u64,
    /// Loops that decided not to write.
    pub unchanged: u64,
    /// Creates that raced another create.
    pub conflicts: u64,
    /// Writes rejected for an outdated generation.
    pub stale_versions: u64,
    /// Writes whose target disappeared between read and write.
    pub vanished: u64,
    /// Iterations repeated after a lost race.
    pub retries: u64,
}

// =============================================================================
// OptimisticWriter
// =============================================================================

/// Runs read-decide-write loops against typed collections.
pub struct OptimisticWriter {
    backoff: ConflictBackoff,
    metrics: WriteMetrics,
}

impl OptimisticWriter {
    /// Creates a writer.
    pub fn new(backoff: BackoffConfig) -> Self {
        Self {
            backoff: ConflictBackoff::new(backoff),
            metrics: WriteMetrics::new(),
        }
    }

    /// Returns the loop counters.
    pub fn metrics(&self) -> WriteMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Reads `id`, asks `decide` what to do with it and applies the answer.
    ///
    /// `decide` sees `None` when the record does not exist. When the write
    /// loses a race the loop backs off, re-reads and asks again. A
    /// [`Proposal::Delete`] of a missing record is reported as unchanged.
    pub async fn write<T, F>(
        &self,
        collection: &Collection<T>,
        id: &str,
        mut decide: F,
    ) -> RegistryResult<UpsertOutcome<T>>
    where
        T: Versioned,
        F: FnMut(Option<&T>) -> RegistryResult<Proposal<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                self.backoff.wait(attempt).await;
            }
            self.metrics.attempts.fetch_add(1, Ordering::Relaxed);

            let current = collection.find(id).await?;
            let lost = match (decide(current.as_ref())?, current) {
                (Proposal::Keep, current) | (Proposal::Delete, current @ None) => {
                    return Ok(self.finish(T::KIND, id, UpsertOutcome::Unchanged(current)));
                }
                (Proposal::Write(mut record), None) => {
                    record.set_generation(None);
                    match collection.add(&record).await? {
                        WriteOutcome::Written(stored) => {
                            return Ok(self.finish(T::KIND, id, UpsertOutcome::Created(stored)));
                        }
                        lost => lost,
                    }
                }
                (Proposal::Write(mut record), Some(before)) => {
                    record.set_generation(before.generation().cloned());
                    match collection.replace(&record).await? {
                        WriteOutcome::Written(after) => {
                            return Ok(self.finish(
                                T::KIND,
                                id,
                                UpsertOutcome::Updated { before, after },
                            ));
                        }
                        lost => lost,
                    }
                }
                (Proposal::Delete, Some(before)) => {
                    match collection.delete(id, before.generation()).await? {
                        WriteOutcome::Written(removed) => {
                            return Ok(self.finish(T::KIND, id, UpsertOutcome::Deleted(removed)));
                        }
                        lost => lost,
                    }
                }
            };

            self.metrics.record_lost_race(&lost);
            attempt = attempt.saturating_add(1);
            debug!(kind = T::KIND, id, attempt, outcome = lost.name(), "Lost write race, retrying");
        }
    }

    fn finish<T>(&self, kind: &str, id: &str, outcome: UpsertOutcome<T>) -> UpsertOutcome<T> {
        self.metrics.record_outcome(&outcome);
        trace!(kind, id, outcome = outcome.name(), "Write settled");
        outcome
    }
}

impl Default for OptimisticWriter {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl fmt::Debug for OptimisticWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticWriter")
            .field("backoff", self.backoff.config())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

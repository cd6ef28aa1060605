// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Discovery request coordination.
//!
//! Routes one-shot discovery requests and their cancellations to a
//! registered discoverer over the requests topic. Results come back through
//! the normal sweep path; a cancel is advisory and never rolls back results
//! that were already reconciled.
//!
//! A routed request stays pending until its sweep completes, it is
//! cancelled, or it outlives the pending TTL. Expired requests are evicted
//! whenever a new request is routed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use census_core::bus::{self, EventBus, DISCOVERY_REQUESTS_TOPIC};
use census_core::error::{RegistryError, RegistryResult};
use census_core::types::{DiscovererId, ModuleId, OperationContext};
use census_core::{DiscoveryCancel, DiscoveryCommand, DiscoveryRequest, ModuleKind};

use crate::modules::ModuleRegistry;

/// A routed request that has not completed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDiscovery {
    /// Request id.
    pub request_id: String,
    /// Discoverer the request was routed to.
    pub discoverer_id: DiscovererId,
    /// Routing time.
    pub requested_at: DateTime<Utc>,
    /// Requesting authority.
    pub authority_id: String,
}

/// Coordinator counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorMetricsSnapshot {
    /// Requests routed.
    pub requested: u64,
    /// Cancels routed.
    pub cancelled: u64,
    /// Requests completed by a sweep summary.
    pub completed: u64,
    /// Requests evicted after outliving the pending TTL.
    pub expired: u64,
}

#[derive(Debug, Default)]
struct CoordinatorMetrics {
    requested: AtomicU64,
    cancelled: AtomicU64,
    completed: AtomicU64,
    expired: AtomicU64,
}

/// Default time a routed request may stay pending.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(3600);

/// Routes discovery requests to discoverers.
pub struct DiscoveryCoordinator {
    modules: ModuleRegistry,
    bus: Arc<dyn EventBus>,
    topic: String,
    pending: DashMap<String, PendingDiscovery>,
    pending_ttl: Duration,
    metrics: CoordinatorMetrics,
}

impl DiscoveryCoordinator {
    /// Creates a coordinator publishing on the default requests topic.
    pub fn new(modules: ModuleRegistry, bus: Arc<dyn EventBus>) -> Self {
        Self {
            modules,
            bus,
            topic: DISCOVERY_REQUESTS_TOPIC.to_string(),
            pending: DashMap::new(),
            pending_ttl: DEFAULT_PENDING_TTL,
            metrics: CoordinatorMetrics::default(),
        }
    }

    /// Publishes on `topic` instead.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Evicts pending requests routed more than `ttl` ago.
    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    /// Routes a discovery request.
    ///
    /// Without an explicit target the request goes to a connected
    /// discoverer, or any registered one if none is connected. Returns the
    /// request as routed. Pending requests older than the TTL, measured
    /// at the context time, are evicted first.
    pub async fn discover(
        &self,
        mut request: DiscoveryRequest,
        context: &OperationContext,
    ) -> RegistryResult<DiscoveryRequest> {
        request.validate()?;
        self.evict_expired(context.time);
        let discoverer_id = match request.discoverer_id.clone() {
            Some(id) => {
                self.require_discoverer(&id).await?;
                id
            }
            None => self.pick_discoverer().await?,
        };
        request.discoverer_id = Some(discoverer_id.clone());
        request.context = Some(context.clone());

        self.publish(&DiscoveryCommand::Discover(request.clone())).await?;
        self.pending.insert(
            request.id.clone(),
            PendingDiscovery {
                request_id: request.id.clone(),
                discoverer_id: discoverer_id.clone(),
                requested_at: context.time,
                authority_id: context.authority_id.clone(),
            },
        );
        self.metrics.requested.fetch_add(1, Ordering::Relaxed);
        info!(request_id = %request.id, discoverer = %discoverer_id, mode = ?request.mode, "Discovery requested");
        Ok(request)
    }

    /// Routes an advisory cancel.
    ///
    /// Returns whether the request was still pending.
    pub async fn cancel(&self, mut cancel: DiscoveryCancel, context: &OperationContext) -> RegistryResult<bool> {
        if cancel.id.trim().is_empty() {
            return Err(RegistryError::invalid_argument("id", "cannot be empty"));
        }
        self.require_discoverer(&cancel.discoverer_id).await?;
        if let Some(pending) = self.pending.get(&cancel.id) {
            if pending.discoverer_id != cancel.discoverer_id {
                return Err(RegistryError::invalid_argument(
                    "discoverer_id",
                    format!("request {} was routed to {}", cancel.id, pending.discoverer_id),
                ));
            }
        }
        cancel.context = Some(context.clone());

        self.publish(&DiscoveryCommand::Cancel(cancel.clone())).await?;
        let was_pending = self.pending.remove(&cancel.id).is_some();
        self.metrics.cancelled.fetch_add(1, Ordering::Relaxed);
        info!(request_id = %cancel.id, discoverer = %cancel.discoverer_id, was_pending, "Discovery cancel requested");
        Ok(was_pending)
    }

    /// Marks a request complete once its sweep was reconciled.
    pub fn complete(&self, request_id: &str) -> Option<PendingDiscovery> {
        let completed = self.pending.remove(request_id).map(|(_, pending)| pending);
        if completed.is_some() {
            self.metrics.completed.fetch_add(1, Ordering::Relaxed);
            debug!(request_id, "Discovery request completed");
        }
        completed
    }

    /// Requests routed and not yet completed or cancelled.
    pub fn pending(&self) -> Vec<PendingDiscovery> {
        let mut pending: Vec<_> = self.pending.iter().map(|e| e.value().clone()).collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        pending
    }

    /// Returns the counters.
    pub fn metrics(&self) -> CoordinatorMetricsSnapshot {
        CoordinatorMetricsSnapshot {
            requested: self.metrics.requested.load(Ordering::Relaxed),
            cancelled: self.metrics.cancelled.load(Ordering::Relaxed),
            completed: self.metrics.completed.load(Ordering::Relaxed),
            expired: self.metrics.expired.load(Ordering::Relaxed),
        }
    }

    fn evict_expired(&self, now: DateTime<Utc>) {
        let Ok(ttl) = chrono::Duration::from_std(self.pending_ttl) else {
            return;
        };
        let Some(cutoff) = now.checked_sub_signed(ttl) else {
            return;
        };
        let before = self.pending.len();
        self.pending.retain(|request_id, pending| {
            let keep = pending.requested_at > cutoff;
            if !keep {
                warn!(request_id, discoverer = %pending.discoverer_id, "Pending discovery request expired");
            }
            keep
        });
        let evicted = before.saturating_sub(self.pending.len());
        if evicted > 0 {
            self.metrics.expired.fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }

    async fn require_discoverer(&self, id: &DiscovererId) -> RegistryResult<()> {
        let module_id = ModuleId::from(id.clone());
        if self.modules.exists(&module_id, ModuleKind::Discoverer).await? {
            Ok(())
        } else {
            Err(RegistryError::not_found("discoverer", id.as_str()))
        }
    }

    async fn pick_discoverer(&self) -> RegistryResult<DiscovererId> {
        let page = self.modules.list(Some(ModuleKind::Discoverer), None, None).await?;
        page.items
            .iter()
            .find(|m| m.connected)
            .or_else(|| page.items.first())
            .map(|m| DiscovererId::new(m.id.as_str()))
            .ok_or_else(|| RegistryError::not_found("discoverer", "any"))
    }

    async fn publish(&self, command: &DiscoveryCommand) -> RegistryResult<()> {
        let payload = bus::encode(command)?;
        if let Err(e) = self.bus.publish(&self.topic, payload).await {
            warn!(topic = %self.topic, error = %e, "Discovery command publish failed");
            return Err(e.into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for DiscoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryCoordinator")
            .field("bus", &self.bus.name())
            .field("topic", &self.topic)
            .field("pending", &self.pending.len())
            .field("pending_ttl", &self.pending_ttl)
            .finish()
    }
}

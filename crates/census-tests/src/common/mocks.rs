// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! Collaborators with injectable misbehaviour for exercising the registry.
//!
//! - [`ContendingStore`]: a document store that makes writes lose races
//! - [`RecordingListener`]: remembers every callback it received
//! - [`FailingListener`]: fails (or panics) on every callback
//! - [`FailingBus`]: an event bus whose publish always fails

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use census_core::types::GenerationId;
use census_core::{
    ApplicationInfo, ApplicationListener, BusError, BusResult, BusSubscriber, ChangeKind, EndpointInfo,
    EndpointListener, EventBus, GatewayListener, InMemoryEventBus, Listener, ListenerError, ModuleInfo,
    OperationContext, Page, PublisherListener, StoreResult, SupervisorListener, TwinInfo, TwinListener,
};
use census_core::ListenerResult;
use census_store::{Document, DocumentStore, MemoryDocumentStore, QueryFilter, StoreConfig, StoreStats, WriteOutcome};

// =============================================================================
// ContendingStore
// =============================================================================

/// A store that simulates a concurrent writer.
///
/// Before forwarding a `replace`, it rewrites the target document itself so
/// the caller's etag is outdated and the write fails with `StaleVersion`.
/// Likewise, a budgeted `add` is preceded by an add of the same id so the
/// caller sees `Conflict`. Each interference consumes one unit of budget.
#[derive(Debug)]
pub struct ContendingStore {
    inner: MemoryDocumentStore,
    stale_budget: AtomicU64,
    conflict_budget: AtomicU64,
    interferences: AtomicU64,
}

impl ContendingStore {
    /// Creates a store over an empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: MemoryDocumentStore::new(StoreConfig::for_testing()),
            stale_budget: AtomicU64::new(0),
            conflict_budget: AtomicU64::new(0),
            interferences: AtomicU64::new(0),
        }
    }

    /// Makes the next `count` replaces lose to a concurrent replace.
    pub fn with_stale_replaces(self, count: u64) -> Self {
        self.stale_budget.store(count, Ordering::SeqCst);
        self
    }

    /// Arms `count` more lost replaces on a store already in use.
    pub fn arm_stale_replaces(&self, count: u64) {
        self.stale_budget.fetch_add(count, Ordering::SeqCst);
    }

    /// Makes the next `count` adds lose to a concurrent add.
    pub fn with_conflicting_adds(self, count: u64) -> Self {
        self.conflict_budget.store(count, Ordering::SeqCst);
        self
    }

    /// Number of simulated concurrent writes performed.
    pub fn interferences(&self) -> u64 {
        self.interferences.load(Ordering::SeqCst)
    }

    fn take(budget: &AtomicU64) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for ContendingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for ContendingStore {
    async fn find(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.inner.find(collection, id).await
    }

    async fn add(&self, collection: &str, id: &str, value: Value) -> StoreResult<WriteOutcome> {
        if Self::take(&self.conflict_budget) {
            self.interferences.fetch_add(1, Ordering::SeqCst);
            self.inner.add(collection, id, value.clone()).await?;
        }
        self.inner.add(collection, id, value).await
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        etag: &GenerationId,
        value: Value,
    ) -> StoreResult<WriteOutcome> {
        if Self::take(&self.stale_budget) {
            if let Some(current) = self.inner.find(collection, id).await? {
                self.interferences.fetch_add(1, Ordering::SeqCst);
                self.inner
                    .replace(collection, id, &current.etag, current.value)
                    .await?;
            }
        }
        self.inner.replace(collection, id, etag, value).await
    }

    async fn delete(
        &self,
        collection: &str,
        id: &str,
        etag: Option<&GenerationId>,
    ) -> StoreResult<WriteOutcome> {
        self.inner.delete(collection, id, etag).await
    }

    async fn query(
        &self,
        collection: &str,
        filter: &QueryFilter,
        page_size: Option<usize>,
        continuation: Option<&str>,
    ) -> StoreResult<Page<Document>> {
        self.inner.query(collection, filter, page_size, continuation).await
    }

    fn stats(&self) -> StoreStats {
        self.inner.stats()
    }

    fn name(&self) -> &str {
        "contending"
    }
}

// =============================================================================
// RecordingListener
// =============================================================================

/// One callback received by a [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    /// Entity kind, e.g. `"application"`.
    pub entity: &'static str,
    /// Transition.
    pub change: ChangeKind,
    /// Entity id.
    pub id: String,
    /// Authority from the operation context.
    pub authority: String,
}

/// Listener recording every callback of every kind.
#[derive(Debug, Default)]
pub struct RecordingListener {
    calls: Mutex<Vec<Recorded>>,
}

impl RecordingListener {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All callbacks so far, in arrival order.
    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().clone()
    }

    /// Callbacks for one entity kind.
    pub fn calls_for(&self, entity: &str) -> Vec<Recorded> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.entity == entity)
            .cloned()
            .collect()
    }

    /// Number of callbacks with the given entity kind and transition.
    pub fn count(&self, entity: &str, change: ChangeKind) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.entity == entity && c.change == change)
            .count()
    }

    /// Forgets everything recorded.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, entity: &'static str, change: ChangeKind, id: &str, context: &OperationContext) -> ListenerResult {
        self.calls.lock().push(Recorded {
            entity,
            change,
            id: id.to_string(),
            authority: context.authority_id.clone(),
        });
        Ok(())
    }
}

impl Listener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }
}

#[async_trait]
impl ApplicationListener for RecordingListener {
    async fn on_application_new(&self, ctx: &OperationContext, app: &ApplicationInfo) -> ListenerResult {
        self.record("application", ChangeKind::New, app.application_id.as_str(), ctx)
    }

    async fn on_application_updated(&self, ctx: &OperationContext, app: &ApplicationInfo) -> ListenerResult {
        self.record("application", ChangeKind::Updated, app.application_id.as_str(), ctx)
    }

    async fn on_application_deleted(&self, ctx: &OperationContext, app: &ApplicationInfo) -> ListenerResult {
        self.record("application", ChangeKind::Deleted, app.application_id.as_str(), ctx)
    }

    async fn on_application_found(&self, ctx: &OperationContext, app: &ApplicationInfo) -> ListenerResult {
        self.record("application", ChangeKind::Found, app.application_id.as_str(), ctx)
    }

    async fn on_application_lost(&self, ctx: &OperationContext, app: &ApplicationInfo) -> ListenerResult {
        self.record("application", ChangeKind::Lost, app.application_id.as_str(), ctx)
    }
}

#[async_trait]
impl EndpointListener for RecordingListener {
    async fn on_endpoint_new(&self, ctx: &OperationContext, endpoint: &EndpointInfo) -> ListenerResult {
        self.record("endpoint", ChangeKind::New, endpoint.id.as_str(), ctx)
    }

    async fn on_endpoint_updated(&self, ctx: &OperationContext, endpoint: &EndpointInfo) -> ListenerResult {
        self.record("endpoint", ChangeKind::Updated, endpoint.id.as_str(), ctx)
    }

    async fn on_endpoint_deleted(&self, ctx: &OperationContext, endpoint: &EndpointInfo) -> ListenerResult {
        self.record("endpoint", ChangeKind::Deleted, endpoint.id.as_str(), ctx)
    }

    async fn on_endpoint_found(&self, ctx: &OperationContext, endpoint: &EndpointInfo) -> ListenerResult {
        self.record("endpoint", ChangeKind::Found, endpoint.id.as_str(), ctx)
    }

    async fn on_endpoint_lost(&self, ctx: &OperationContext, endpoint: &EndpointInfo) -> ListenerResult {
        self.record("endpoint", ChangeKind::Lost, endpoint.id.as_str(), ctx)
    }
}

#[async_trait]
impl TwinListener for RecordingListener {
    async fn on_twin_activated(&self, ctx: &OperationContext, twin: &TwinInfo) -> ListenerResult {
        self.record("twin", ChangeKind::Activated, twin.id.as_str(), ctx)
    }

    async fn on_twin_updated(&self, ctx: &OperationContext, twin: &TwinInfo) -> ListenerResult {
        self.record("twin", ChangeKind::Updated, twin.id.as_str(), ctx)
    }

    async fn on_twin_deactivated(&self, ctx: &OperationContext, twin: &TwinInfo) -> ListenerResult {
        self.record("twin", ChangeKind::Deactivated, twin.id.as_str(), ctx)
    }
}

#[async_trait]
impl SupervisorListener for RecordingListener {
    async fn on_supervisor_new(&self, ctx: &OperationContext, module: &ModuleInfo) -> ListenerResult {
        self.record("supervisor", ChangeKind::New, module.id.as_str(), ctx)
    }

    async fn on_supervisor_updated(&self, ctx: &OperationContext, module: &ModuleInfo) -> ListenerResult {
        self.record("supervisor", ChangeKind::Updated, module.id.as_str(), ctx)
    }

    async fn on_supervisor_deleted(&self, ctx: &OperationContext, module: &ModuleInfo) -> ListenerResult {
        self.record("supervisor", ChangeKind::Deleted, module.id.as_str(), ctx)
    }
}

#[async_trait]
impl PublisherListener for RecordingListener {
    async fn on_publisher_new(&self, ctx: &OperationContext, module: &ModuleInfo) -> ListenerResult {
        self.record("publisher", ChangeKind::New, module.id.as_str(), ctx)
    }
}

#[async_trait]
impl GatewayListener for RecordingListener {
    async fn on_gateway_new(&self, ctx: &OperationContext, module: &ModuleInfo) -> ListenerResult {
        self.record("gateway", ChangeKind::New, module.id.as_str(), ctx)
    }
}

// =============================================================================
// FailingListener
// =============================================================================

/// Listener that fails every application and endpoint callback.
#[derive(Debug, Default)]
pub struct FailingListener {
    panic: AtomicBool,
    calls: AtomicU64,
}

impl FailingListener {
    /// Returns errors from every callback.
    pub fn erroring() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Panics in every callback.
    pub fn panicking() -> Arc<Self> {
        let listener = Self::default();
        listener.panic.store(true, Ordering::SeqCst);
        Arc::new(listener)
    }

    /// Number of callbacks received.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) -> ListenerResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic.load(Ordering::SeqCst) {
            panic!("listener exploded");
        }
        Err(ListenerError::failed(self.name(), "injected failure"))
    }
}

impl Listener for FailingListener {
    fn name(&self) -> &str {
        "failing"
    }
}

#[async_trait]
impl ApplicationListener for FailingListener {
    async fn on_application_new(&self, _: &OperationContext, _: &ApplicationInfo) -> ListenerResult {
        self.fail()
    }

    async fn on_application_updated(&self, _: &OperationContext, _: &ApplicationInfo) -> ListenerResult {
        self.fail()
    }

    async fn on_application_lost(&self, _: &OperationContext, _: &ApplicationInfo) -> ListenerResult {
        self.fail()
    }
}

#[async_trait]
impl EndpointListener for FailingListener {
    async fn on_endpoint_new(&self, _: &OperationContext, _: &EndpointInfo) -> ListenerResult {
        self.fail()
    }
}

// =============================================================================
// FailingBus
// =============================================================================

/// Event bus whose publish always fails. Subscriptions work and never
/// receive anything.
#[derive(Default)]
pub struct FailingBus {
    inner: InMemoryEventBus,
    attempts: AtomicU64,
}

impl FailingBus {
    /// Creates a failing bus.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of publish attempts.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventBus for FailingBus {
    async fn publish(&self, topic: &str, _payload: Vec<u8>) -> BusResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(BusError::publish_failed(topic, "broker unreachable"))
    }

    fn subscribe(&self, topic: &str) -> BusResult<BusSubscriber> {
        self.inner.subscribe(topic)
    }

    fn name(&self) -> &str {
        "failing"
    }
}

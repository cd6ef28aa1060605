// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Change notification.
//!
//! The [`ChangeNotifier`] turns one classified change into:
//!
//! 1. a concurrent fan-out to the in-process listeners of the entity kind, and
//! 2. a [`RegistryEvent`] serialized and published on the registry events topic.
//!
//! Listener failures are logged and counted, never propagated. Publish
//! failures are returned to the caller through [`Notifications`], which lets
//! a reconciliation pass finish all of its writes before surfacing them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use census_core::bus::{EventBus, EventSerializer, JsonEventSerializer, REGISTRY_EVENTS_TOPIC};
use census_core::error::{BusError, RegistryError, RegistryResult};
use census_core::identity::ContentEq;
use census_core::listener::{
    fan_out, ApplicationListener, EndpointListener, FanOutReport, GatewayListener,
    ListenerRegistry, PublisherListener, SupervisorListener, TwinListener,
};
use census_core::staleness::Watermarked;
use census_core::types::OperationContext;
use census_core::{
    ApplicationInfo, ChangeKind, EndpointInfo, EventPayload, ModuleInfo, ModuleKind,
    RegistryEvent, TwinInfo,
};

// =============================================================================
// Classification
// =============================================================================

/// Classifies the transition of one discoverable record.
///
/// A watermark transition wins over a content change, so a pass reports at
/// most one change per record.
pub fn classify<T>(before: Option<&T>, after: Option<&T>) -> Option<ChangeKind>
where
    T: ContentEq + Watermarked,
{
    match (before, after) {
        (None, None) => None,
        (None, Some(_)) => Some(ChangeKind::New),
        (Some(_), None) => Some(ChangeKind::Deleted),
        (Some(before), Some(after)) => {
            match (before.not_seen_since().is_some(), after.not_seen_since().is_some()) {
                (true, false) => Some(ChangeKind::Found),
                (false, true) => Some(ChangeKind::Lost),
                _ if !before.content_eq(after) => Some(ChangeKind::Updated),
                _ => None,
            }
        }
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Counters of the change notifier.
#[derive(Debug, Default)]
pub struct NotifierMetrics {
    dispatched: AtomicU64,
    listener_calls: AtomicU64,
    listener_failures: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
}

impl NotifierMetrics {
    /// Returns a snapshot.
    pub fn snapshot(&self) -> NotifierMetricsSnapshot {
        NotifierMetricsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            listener_calls: self.listener_calls.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of notifier counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierMetricsSnapshot {
    /// Changes dispatched.
    pub dispatched: u64,
    /// Listener invocations.
    pub listener_calls: u64,
    /// Listener invocations that failed or panicked.
    pub listener_failures: u64,
    /// Events published on the bus.
    pub published: u64,
    /// Events that could not be serialized or published.
    pub publish_failures: u64,
}

// =============================================================================
// Notifications
// =============================================================================

/// Accumulates the delivery results of one operation.
#[derive(Debug, Default)]
pub struct Notifications {
    /// Changes dispatched, in order.
    pub changes: Vec<(ChangeKind, String)>,
    /// Listener failures.
    pub listener_failures: usize,
    /// Publish failures.
    pub publish_failures: Vec<BusError>,
}

impl Notifications {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, change: ChangeKind, entity_id: &str, delivery: Delivery) {
        self.changes.push((change, entity_id.to_string()));
        self.listener_failures += delivery.listeners.failures.len();
        if let Err(error) = delivery.published {
            self.publish_failures.push(error);
        }
    }

    /// Number of changes with the given kind.
    pub fn count(&self, change: ChangeKind) -> usize {
        self.changes.iter().filter(|(c, _)| *c == change).count()
    }

    /// Fails with the first publish failure, if any.
    pub fn into_result(self) -> RegistryResult<()> {
        match self.publish_failures.into_iter().next() {
            Some(error) => Err(RegistryError::Bus(error)),
            None => Ok(()),
        }
    }
}

/// Delivery result of one change.
#[derive(Debug)]
pub struct Delivery {
    /// In-process listener results.
    pub listeners: FanOutReport,
    /// Bus publication result.
    pub published: Result<(), BusError>,
}

// =============================================================================
// ChangeNotifier
// =============================================================================

/// Dispatches registry changes to listeners and the event bus.
pub struct ChangeNotifier {
    applications: ListenerRegistry<dyn ApplicationListener>,
    endpoints: ListenerRegistry<dyn EndpointListener>,
    twins: ListenerRegistry<dyn TwinListener>,
    supervisors: ListenerRegistry<dyn SupervisorListener>,
    publishers: ListenerRegistry<dyn PublisherListener>,
    gateways: ListenerRegistry<dyn GatewayListener>,
    bus: Option<Arc<dyn EventBus>>,
    serializer: Arc<dyn EventSerializer>,
    topic: String,
    metrics: NotifierMetrics,
}

impl ChangeNotifier {
    /// Creates a notifier without a bus.
    pub fn new() -> Self {
        Self {
            applications: ListenerRegistry::new(),
            endpoints: ListenerRegistry::new(),
            twins: ListenerRegistry::new(),
            supervisors: ListenerRegistry::new(),
            publishers: ListenerRegistry::new(),
            gateways: ListenerRegistry::new(),
            bus: None,
            serializer: Arc::new(JsonEventSerializer),
            topic: REGISTRY_EVENTS_TOPIC.to_string(),
            metrics: NotifierMetrics::default(),
        }
    }

    /// Publishes events on `bus`.
    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Sets the events topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Sets the event serializer.
    pub fn with_serializer(mut self, serializer: Arc<dyn EventSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Application listeners.
    pub fn applications(&self) -> &ListenerRegistry<dyn ApplicationListener> {
        &self.applications
    }

    /// Endpoint listeners.
    pub fn endpoints(&self) -> &ListenerRegistry<dyn EndpointListener> {
        &self.endpoints
    }

    /// Twin listeners.
    pub fn twins(&self) -> &ListenerRegistry<dyn TwinListener> {
        &self.twins
    }

    /// Supervisor listeners.
    pub fn supervisors(&self) -> &ListenerRegistry<dyn SupervisorListener> {
        &self.supervisors
    }

    /// Publisher listeners.
    pub fn publishers(&self) -> &ListenerRegistry<dyn PublisherListener> {
        &self.publishers
    }

    /// Gateway listeners.
    pub fn gateways(&self) -> &ListenerRegistry<dyn GatewayListener> {
        &self.gateways
    }

    /// Events topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns notifier counters.
    pub fn metrics(&self) -> NotifierMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Dispatches an application change and records it.
    pub async fn application(
        &self,
        change: ChangeKind,
        context: &OperationContext,
        application: &ApplicationInfo,
        into: &mut Notifications,
    ) {
        let listeners = self.applications.snapshot();
        let report = match change {
            ChangeKind::New => {
                fan_out(&listeners, "application_new", |l| l.on_application_new(context, application)).await
            }
            ChangeKind::Deleted => {
                fan_out(&listeners, "application_deleted", |l| {
                    l.on_application_deleted(context, application)
                })
                .await
            }
            ChangeKind::Found => {
                fan_out(&listeners, "application_found", |l| l.on_application_found(context, application))
                    .await
            }
            ChangeKind::Lost => {
                fan_out(&listeners, "application_lost", |l| l.on_application_lost(context, application)).await
            }
            _ => {
                fan_out(&listeners, "application_updated", |l| {
                    l.on_application_updated(context, application)
                })
                .await
            }
        };
        let payload = EventPayload::Application(application.clone());
        let delivery = self.finish(change, payload, context, report).await;
        into.record(change, application.application_id.as_str(), delivery);
    }

    /// Dispatches an endpoint change and records it.
    pub async fn endpoint(
        &self,
        change: ChangeKind,
        context: &OperationContext,
        endpoint: &EndpointInfo,
        into: &mut Notifications,
    ) {
        let listeners = self.endpoints.snapshot();
        let report = match change {
            ChangeKind::New => {
                fan_out(&listeners, "endpoint_new", |l| l.on_endpoint_new(context, endpoint)).await
            }
            ChangeKind::Deleted => {
                fan_out(&listeners, "endpoint_deleted", |l| l.on_endpoint_deleted(context, endpoint)).await
            }
            ChangeKind::Found => {
                fan_out(&listeners, "endpoint_found", |l| l.on_endpoint_found(context, endpoint)).await
            }
            ChangeKind::Lost => {
                fan_out(&listeners, "endpoint_lost", |l| l.on_endpoint_lost(context, endpoint)).await
            }
            _ => {
                fan_out(&listeners, "endpoint_updated", |l| l.on_endpoint_updated(context, endpoint)).await
            }
        };
        let payload = EventPayload::Endpoint(endpoint.clone());
        let delivery = self.finish(change, payload, context, report).await;
        into.record(change, endpoint.id.as_str(), delivery);
    }

    /// Dispatches a twin transition and records it.
    ///
    /// `change` is one of `Activated`, `Updated` or `Deactivated`.
    pub async fn twin(
        &self,
        change: ChangeKind,
        context: &OperationContext,
        twin: &TwinInfo,
        into: &mut Notifications,
    ) {
        let listeners = self.twins.snapshot();
        let report = match change {
            ChangeKind::Activated | ChangeKind::New => {
                fan_out(&listeners, "twin_activated", |l| l.on_twin_activated(context, twin)).await
            }
            ChangeKind::Deactivated | ChangeKind::Deleted => {
                fan_out(&listeners, "twin_deactivated", |l| l.on_twin_deactivated(context, twin)).await
            }
            _ => fan_out(&listeners, "twin_updated", |l| l.on_twin_updated(context, twin)).await,
        };
        let payload = EventPayload::Twin(twin.clone());
        let delivery = self.finish(change, payload, context, report).await;
        into.record(change, twin.id.as_str(), delivery);
    }

    /// Dispatches a module change and records it.
    ///
    /// Discoverer modules have no in-process listener kind; their changes
    /// are only published.
    pub async fn module(
        &self,
        change: ChangeKind,
        context: &OperationContext,
        module: &ModuleInfo,
        into: &mut Notifications,
    ) {
        let report = match module.kind {
            ModuleKind::Supervisor => {
                let listeners = self.supervisors.snapshot();
                match change {
                    ChangeKind::New => {
                        fan_out(&listeners, "supervisor_new", |l| l.on_supervisor_new(context, module)).await
                    }
                    ChangeKind::Deleted => {
                        fan_out(&listeners, "supervisor_deleted", |l| {
                            l.on_supervisor_deleted(context, module)
                        })
                        .await
                    }
                    _ => {
                        fan_out(&listeners, "supervisor_updated", |l| {
                            l.on_supervisor_updated(context, module)
                        })
                        .await
                    }
                }
            }
            ModuleKind::Publisher => {
                let listeners = self.publishers.snapshot();
                match change {
                    ChangeKind::New => {
                        fan_out(&listeners, "publisher_new", |l| l.on_publisher_new(context, module)).await
                    }
                    ChangeKind::Deleted => {
                        fan_out(&listeners, "publisher_deleted", |l| l.on_publisher_deleted(context, module))
                            .await
                    }
                    _ => {
                        fan_out(&listeners, "publisher_updated", |l| l.on_publisher_updated(context, module))
                            .await
                    }
                }
            }
            ModuleKind::Gateway => {
                let listeners = self.gateways.snapshot();
                match change {
                    ChangeKind::New => {
                        fan_out(&listeners, "gateway_new", |l| l.on_gateway_new(context, module)).await
                    }
                    ChangeKind::Deleted => {
                        fan_out(&listeners, "gateway_deleted", |l| l.on_gateway_deleted(context, module)).await
                    }
                    _ => {
                        fan_out(&listeners, "gateway_updated", |l| l.on_gateway_updated(context, module)).await
                    }
                }
            }
            ModuleKind::Discoverer => FanOutReport::default(),
        };
        let payload = EventPayload::Module(module.clone());
        let delivery = self.finish(change, payload, context, report).await;
        into.record(change, module.id.as_str(), delivery);
    }

    async fn finish(
        &self,
        change: ChangeKind,
        payload: EventPayload,
        context: &OperationContext,
        listeners: FanOutReport,
    ) -> Delivery {
        self.metrics.dispatched.fetch_add(1, Ordering::Relaxed);
        self.metrics.listener_calls.fetch_add(
            (listeners.delivered + listeners.failures.len()) as u64,
            Ordering::Relaxed,
        );
        self.metrics
            .listener_failures
            .fetch_add(listeners.failures.len() as u64, Ordering::Relaxed);

        let event = RegistryEvent::new(change, payload, context);
        let published = self.publish(&event).await;
        match &published {
            Ok(()) => {
                self.metrics.published.fetch_add(1, Ordering::Relaxed);
                trace!(
                    event_id = %event.event_id,
                    entity = %event.entity_kind(),
                    entity_id = event.entity_id(),
                    change = %change,
                    "Change dispatched"
                );
            }
            Err(e) => {
                self.metrics.publish_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    event_id = %event.event_id,
                    entity = %event.entity_kind(),
                    entity_id = event.entity_id(),
                    change = %change,
                    error = %e,
                    "Failed to publish registry event"
                );
            }
        }
        Delivery { listeners, published }
    }

    async fn publish(&self, event: &RegistryEvent) -> Result<(), BusError> {
        let Some(bus) = &self.bus else {
            return Ok(());
        };
        let payload = self.serializer.serialize(event)?;
        bus.publish(&self.topic, payload).await
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("applications", &self.applications.len())
            .field("endpoints", &self.endpoints.len())
            .field("twins", &self.twins.len())
            .field("topic", &self.topic)
            .field("bus", &self.bus.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use census_core::bus::InMemoryEventBus;
    use census_core::error::{BusResult, ListenerError, ListenerResult};
    use census_core::listener::Listener;
    use census_core::{ApplicationType, BusSubscriber};
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    fn app() -> ApplicationInfo {
        ApplicationInfo::new("urn:demo:server1", ApplicationType::Server)
    }

    #[test]
    fn test_classify_transitions() {
        let live = app();
        let mut stale = live.clone();
        stale.not_seen_since = Some(Utc::now());
        let changed = live.clone().with_capability("DA");

        assert_eq!(classify::<ApplicationInfo>(None, None), None);
        assert_eq!(classify(None, Some(&live)), Some(ChangeKind::New));
        assert_eq!(classify(Some(&live), None), Some(ChangeKind::Deleted));
        assert_eq!(classify(Some(&live), Some(&stale)), Some(ChangeKind::Lost));
        assert_eq!(classify(Some(&stale), Some(&changed)), Some(ChangeKind::Found));
        assert_eq!(classify(Some(&live), Some(&changed)), Some(ChangeKind::Updated));
        assert_eq!(classify(Some(&live), Some(&live.clone())), None);
    }

    struct Recorder {
        new: AtomicUsize,
        fail: bool,
    }

    impl Listener for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
    }

    #[async_trait]
    impl ApplicationListener for Recorder {
        async fn on_application_new(
            &self,
            _context: &OperationContext,
            _application: &ApplicationInfo,
        ) -> ListenerResult {
            self.new.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ListenerError::failed("recorder", "boom"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_block_others() {
        let notifier = ChangeNotifier::new();
        let ok = Arc::new(Recorder { new: AtomicUsize::new(0), fail: false });
        let bad = Arc::new(Recorder { new: AtomicUsize::new(0), fail: true });
        notifier.applications().register(bad.clone());
        notifier.applications().register(ok.clone());

        let mut notifications = Notifications::new();
        notifier
            .application(ChangeKind::New, &OperationContext::system(), &app(), &mut notifications)
            .await;

        assert_eq!(ok.new.load(Ordering::SeqCst), 1);
        assert_eq!(bad.new.load(Ordering::SeqCst), 1);
        assert_eq!(notifications.listener_failures, 1);
        assert!(notifications.into_result().is_ok());
        assert_eq!(notifier.metrics().listener_failures, 1);
    }

    #[tokio::test]
    async fn test_disposed_listener_not_called() {
        let notifier = ChangeNotifier::new();
        let recorder = Arc::new(Recorder { new: AtomicUsize::new(0), fail: false });
        let handle = notifier.applications().register(recorder.clone());
        assert!(handle.dispose());

        let mut notifications = Notifications::new();
        notifier
            .application(ChangeKind::New, &OperationContext::system(), &app(), &mut notifications)
            .await;
        assert_eq!(recorder.new.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_event_published_on_topic() {
        let bus = Arc::new(InMemoryEventBus::new(16));
        let mut subscriber: BusSubscriber = bus.subscribe(REGISTRY_EVENTS_TOPIC).unwrap();
        let notifier = ChangeNotifier::new().with_bus(bus);

        let mut notifications = Notifications::new();
        notifier
            .application(ChangeKind::New, &OperationContext::system(), &app(), &mut notifications)
            .await;

        let message = subscriber.try_recv().unwrap().unwrap();
        let event = JsonEventSerializer.deserialize(&message.payload).unwrap();
        assert_eq!(event.change, ChangeKind::New);
        assert_eq!(event.entity_id(), app().application_id.as_str());
    }

    struct BrokenBus;

    #[async_trait]
    impl EventBus for BrokenBus {
        async fn publish(&self, topic: &str, _payload: Vec<u8>) -> BusResult<()> {
            Err(BusError::publish_failed(topic, "down"))
        }

        fn subscribe(&self, _topic: &str) -> BusResult<BusSubscriber> {
            Err(BusError::Closed)
        }
    }

    #[tokio::test]
    async fn test_publish_failure_is_surfaced() {
        let notifier = ChangeNotifier::new().with_bus(Arc::new(BrokenBus));
        let mut notifications = Notifications::new();
        notifier
            .application(ChangeKind::Updated, &OperationContext::system(), &app(), &mut notifications)
            .await;
        notifier
            .application(ChangeKind::Lost, &OperationContext::system(), &app(), &mut notifications)
            .await;

        assert_eq!(notifications.changes.len(), 2);
        assert!(matches!(notifications.into_result(), Err(RegistryError::Bus(_))));
        assert_eq!(notifier.metrics().publish_failures, 2);
    }
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Event bus contract and the in-memory broadcast bus.
//!
//! The bus carries opaque byte payloads on named topics with at-least-once
//! semantics. Three topics are used:
//!
//! - **registry events**: serialized [`RegistryEvent`]s for cross-process subscribers
//! - **discovery results**: [`DiscoveryResult`](crate::discovery::DiscoveryResult)s from discoverers
//! - **discovery requests**: [`DiscoveryCommand`](crate::discovery::DiscoveryCommand)s to discoverers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   publish(topic, bytes)   ┌────────────────────────┐
//! │ ChangeNotifier│─────────────────────────▶│                        │
//! ├──────────────┤                           │   InMemoryEventBus     │
//! │ Coordinator  │─────────────────────────▶│   (tokio broadcast)    │
//! └──────────────┘                           │                        │
//!                                            └──────────┬─────────────┘
//!                                                       │ subscribe(topic)
//!                                        ┌──────────────┼──────────────┐
//!                                        ▼              ▼              ▼
//!                                  SweepProcessor   discoverers   subscribers
//! ```
//!
//! Transport-specific buses implement [`EventBus`] outside this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{BusError, BusResult};
use crate::events::RegistryEvent;

/// Default topic for registry change events.
pub const REGISTRY_EVENTS_TOPIC: &str = "registry.events";

/// Default topic for discovery results.
pub const DISCOVERY_RESULTS_TOPIC: &str = "discovery.results";

/// Default topic for discovery requests.
pub const DISCOVERY_REQUESTS_TOPIC: &str = "discovery.requests";

/// Opaque payload bytes shared between subscribers.
pub type Payload = Arc<[u8]>;

// =============================================================================
// Contract
// =============================================================================

/// A message on the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Opaque payload.
    pub payload: Payload,
}

impl BusMessage {
    /// Decodes the payload as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> BusResult<T> {
        decode(&self.payload)
    }
}

/// Publish/subscribe transport.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes `payload` on `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribes to `topic`.
    fn subscribe(&self, topic: &str) -> BusResult<BusSubscriber>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "bus"
    }
}

/// Turns registry events into bus payloads.
pub trait EventSerializer: Send + Sync {
    /// MIME type of the produced payloads.
    fn content_type(&self) -> &'static str;

    /// Serializes an event.
    fn serialize(&self, event: &RegistryEvent) -> BusResult<Vec<u8>>;

    /// Deserializes an event.
    fn deserialize(&self, payload: &[u8]) -> BusResult<RegistryEvent>;
}

/// JSON event serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventSerializer;

impl EventSerializer for JsonEventSerializer {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn serialize(&self, event: &RegistryEvent) -> BusResult<Vec<u8>> {
        encode(event)
    }

    fn deserialize(&self, payload: &[u8]) -> BusResult<RegistryEvent> {
        decode(payload)
    }
}

/// Encodes a value as a JSON payload.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> BusResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| BusError::serialization(e.to_string()))
}

/// Decodes a JSON payload.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> BusResult<T> {
    serde_json::from_slice(payload).map_err(|e| BusError::serialization(e.to_string()))
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics for a message bus.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BusStats {
    /// Total messages published.
    pub messages_published: u64,
    /// Messages dropped due to lag.
    pub messages_dropped: u64,
    /// Current number of subscribers.
    pub subscriber_count: u64,
    /// Publications nobody was subscribed to.
    pub unrouted: u64,
}

#[derive(Debug, Default)]
struct AtomicBusStats {
    messages_published: AtomicU64,
    messages_dropped: AtomicU64,
    unrouted: AtomicU64,
}

// =============================================================================
// InMemoryEventBus
// =============================================================================

/// Single-process bus with one `tokio::sync::broadcast` channel per topic.
///
/// Topics never share a channel, so a burst on one topic cannot push
/// unread messages of another out of its buffer. A subscriber that falls more
/// than `capacity` messages behind on its topic loses the oldest ones; the
/// loss is counted and reported to it as [`BusError::Lagged`].
pub struct InMemoryEventBus {
    topics: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,
    capacity: usize,
    stats: Arc<AtomicBusStats>,
}

impl InMemoryEventBus {
    /// Creates a bus buffering up to `capacity` messages per topic and subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            stats: Arc::new(AtomicBusStats::default()),
        }
    }

    /// Returns the current number of subscribers across all topics.
    pub fn subscriber_count(&self) -> usize {
        self.topics.read().values().map(|s| s.receiver_count()).sum()
    }

    /// Returns the channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns current statistics.
    pub fn stats(&self) -> BusStats {
        BusStats {
            messages_published: self.stats.messages_published.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            subscriber_count: self.subscriber_count() as u64,
            unrouted: self.stats.unrouted.load(Ordering::Relaxed),
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(16_384)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BusResult<()> {
        self.stats.messages_published.fetch_add(1, Ordering::Relaxed);
        let sender = self.topics.read().get(topic).cloned();
        let delivered = sender.is_some_and(|sender| {
            sender
                .send(BusMessage {
                    topic: topic.to_string(),
                    payload: payload.into(),
                })
                .is_ok()
        });
        if !delivered {
            // No subscribers. Not an error for pub/sub.
            self.stats.unrouted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> BusResult<BusSubscriber> {
        let receiver = self
            .topics
            .write()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        Ok(BusSubscriber {
            topic: topic.to_string(),
            receiver,
            stats: Arc::clone(&self.stats),
        })
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("capacity", &self.capacity)
            .field("topics", &self.topics.read().len())
            .field(
                "messages_published",
                &self.stats.messages_published.load(Ordering::Relaxed),
            )
            .finish()
    }
}

/// A subscription to one topic.
pub struct BusSubscriber {
    topic: String,
    receiver: broadcast::Receiver<BusMessage>,
    stats: Arc<AtomicBusStats>,
}

impl BusSubscriber {
    /// Subscribed topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receives the next message on the topic.
    ///
    /// Returns [`BusError::Lagged`] once after messages were lost; the next
    /// call continues with the oldest message still buffered. Returns
    /// [`BusError::Closed`] once the bus is dropped.
    pub async fn recv(&mut self) -> BusResult<BusMessage> {
        match self.receiver.recv().await {
            Ok(message) => Ok(message),
            Err(broadcast::error::RecvError::Closed) => Err(BusError::Closed),
            Err(broadcast::error::RecvError::Lagged(count)) => Err(self.lagged(count)),
        }
    }

    /// Receives a message without waiting.
    pub fn try_recv(&mut self) -> BusResult<Option<BusMessage>> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(BusError::Closed),
            Err(broadcast::error::TryRecvError::Lagged(count)) => Err(self.lagged(count)),
        }
    }

    fn lagged(&self, count: u64) -> BusError {
        self.stats.messages_dropped.fetch_add(count, Ordering::Relaxed);
        tracing::warn!(topic = %self.topic, count, "Bus subscriber lagged, messages dropped");
        BusError::lagged(count)
    }
}

impl std::fmt::Debug for BusSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusSubscriber").field("topic", &self.topic).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

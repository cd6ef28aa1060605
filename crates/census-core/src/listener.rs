// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-process change listeners.
//!
//! Listeners are plain trait objects kept in a [`ListenerRegistry`].
//! Registration returns a [`ListenerHandle`] that removes exactly that
//! listener when disposed. Dispatch goes through [`fan_out`], which runs every
//! listener concurrently, isolates failures and panics, and returns once all
//! of them have finished.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Audit;
//!
//! impl Listener for Audit {
//!     fn name(&self) -> &str { "audit" }
//! }
//!
//! #[async_trait]
//! impl ApplicationListener for Audit {
//!     async fn on_application_new(&self, ctx: &OperationContext, app: &ApplicationInfo) -> ListenerResult {
//!         tracing::info!(application_id = %app.application_id, "registered");
//!         Ok(())
//!     }
//! }
//!
//! let handle = notifier.applications().register(Arc::new(Audit));
//! // ...
//! handle.dispose();
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::warn;

use crate::application::ApplicationInfo;
use crate::endpoint::EndpointInfo;
use crate::error::{ListenerError, ListenerResult};
use crate::module::ModuleInfo;
use crate::twin::TwinInfo;
use crate::types::OperationContext;

// =============================================================================
// Listener traits
// =============================================================================

/// Common supertrait of all listeners.
pub trait Listener: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Receives application changes.
#[async_trait]
pub trait ApplicationListener: Listener {
    /// Application created.
    async fn on_application_new(
        &self,
        _context: &OperationContext,
        _application: &ApplicationInfo,
    ) -> ListenerResult {
        Ok(())
    }

    /// Application content changed.
    async fn on_application_updated(
        &self,
        _context: &OperationContext,
        _application: &ApplicationInfo,
    ) -> ListenerResult {
        Ok(())
    }

    /// Application explicitly removed.
    async fn on_application_deleted(
        &self,
        _context: &OperationContext,
        _application: &ApplicationInfo,
    ) -> ListenerResult {
        Ok(())
    }

    /// Stale application seen again.
    async fn on_application_found(
        &self,
        _context: &OperationContext,
        _application: &ApplicationInfo,
    ) -> ListenerResult {
        Ok(())
    }

    /// Application no longer seen by its owner.
    async fn on_application_lost(
        &self,
        _context: &OperationContext,
        _application: &ApplicationInfo,
    ) -> ListenerResult {
        Ok(())
    }
}

/// Receives endpoint changes.
#[async_trait]
pub trait EndpointListener: Listener {
    /// Endpoint created.
    async fn on_endpoint_new(
        &self,
        _context: &OperationContext,
        _endpoint: &EndpointInfo,
    ) -> ListenerResult {
        Ok(())
    }

    /// Endpoint content changed.
    async fn on_endpoint_updated(
        &self,
        _context: &OperationContext,
        _endpoint: &EndpointInfo,
    ) -> ListenerResult {
        Ok(())
    }

    /// Endpoint explicitly removed.
    async fn on_endpoint_deleted(
        &self,
        _context: &OperationContext,
        _endpoint: &EndpointInfo,
    ) -> ListenerResult {
        Ok(())
    }

    /// Stale endpoint seen again.
    async fn on_endpoint_found(
        &self,
        _context: &OperationContext,
        _endpoint: &EndpointInfo,
    ) -> ListenerResult {
        Ok(())
    }

    /// Endpoint no longer seen by its owner.
    async fn on_endpoint_lost(
        &self,
        _context: &OperationContext,
        _endpoint: &EndpointInfo,
    ) -> ListenerResult {
        Ok(())
    }
}

/// Receives twin lifecycle transitions.
#[async_trait]
pub trait TwinListener: Listener {
    /// Twin activated.
    async fn on_twin_activated(&self, _context: &OperationContext, _twin: &TwinInfo) -> ListenerResult {
        Ok(())
    }

    /// Activated twin updated.
    async fn on_twin_updated(&self, _context: &OperationContext, _twin: &TwinInfo) -> ListenerResult {
        Ok(())
    }

    /// Twin deactivated. Receives the last known state.
    async fn on_twin_deactivated(
        &self,
        _context: &OperationContext,
        _twin: &TwinInfo,
    ) -> ListenerResult {
        Ok(())
    }
}

macro_rules! module_listener {
    ($(#[$meta:meta])* $name:ident, $new:ident, $updated:ident, $deleted:ident) => {
        $(#[$meta])*
        #[async_trait]
        pub trait $name: Listener {
            /// Module registered.
            async fn $new(&self, _context: &OperationContext, _module: &ModuleInfo) -> ListenerResult {
                Ok(())
            }

            /// Module updated.
            async fn $updated(&self, _context: &OperationContext, _module: &ModuleInfo) -> ListenerResult {
                Ok(())
            }

            /// Module unregistered.
            async fn $deleted(&self, _context: &OperationContext, _module: &ModuleInfo) -> ListenerResult {
                Ok(())
            }
        }
    };
}

module_listener!(
    /// Receives supervisor module changes.
    SupervisorListener,
    on_supervisor_new,
    on_supervisor_updated,
    on_supervisor_deleted
);

module_listener!(
    /// Receives publisher module changes.
    PublisherListener,
    on_publisher_new,
    on_publisher_updated,
    on_publisher_deleted
);

module_listener!(
    /// Receives gateway module changes.
    GatewayListener,
    on_gateway_new,
    on_gateway_updated,
    on_gateway_deleted
);

// =============================================================================
// ListenerRegistry
// =============================================================================

type Entries<L> = RwLock<Vec<(u64, Arc<L>)>>;

/// Observer list of one listener kind.
pub struct ListenerRegistry<L: ?Sized> {
    entries: Arc<Entries<L>>,
    next_id: AtomicU64,
}

impl<L: ?Sized + Send + Sync + 'static> ListenerRegistry<L> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a listener.
    pub fn register(&self, listener: Arc<L>) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push((id, listener));

        let entries: Weak<Entries<L>> = Arc::downgrade(&self.entries);
        ListenerHandle {
            id,
            remove: Some(Box::new(move || match entries.upgrade() {
                Some(entries) => {
                    let mut entries = entries.write();
                    let before = entries.len();
                    entries.retain(|(entry, _)| *entry != id);
                    entries.len() != before
                }
                None => false,
            })),
        }
    }

    /// Returns the current listeners.
    ///
    /// Dispatch works on the snapshot so the lock is never held across an
    /// await point.
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.entries.read().iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<L: ?Sized + Send + Sync + 'static> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> std::fmt::Debug for ListenerRegistry<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.entries.read().len())
            .finish()
    }
}

/// Disposer returned by [`ListenerRegistry::register`].
///
/// Dropping the handle leaves the listener registered; call
/// [`dispose`](Self::dispose) to remove it.
pub struct ListenerHandle {
    id: u64,
    remove: Option<Box<dyn FnOnce() -> bool + Send + Sync>>,
}

impl ListenerHandle {
    /// Registration id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the listener. Returns `false` if it was already gone.
    pub fn dispose(mut self) -> bool {
        self.remove.take().is_some_and(|remove| remove())
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.id).finish()
    }
}

// =============================================================================
// Fan-out
// =============================================================================

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default)]
pub struct FanOutReport {
    /// Listeners that completed successfully.
    pub delivered: usize,
    /// Failures, one per failed listener.
    pub failures: Vec<ListenerError>,
}

impl FanOutReport {
    /// Returns `true` if every listener succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Invokes `call` on every listener concurrently.
///
/// Failures and panics are logged and collected; they never stop the other
/// listeners and never propagate to the caller.
pub async fn fan_out<'a, L, F, Fut>(listeners: &'a [Arc<L>], event: &'static str, call: F) -> FanOutReport
where
    L: Listener + ?Sized + 'a,
    F: Fn(&'a L) -> Fut,
    Fut: Future<Output = ListenerResult> + 'a,
{
    let calls = listeners.iter().map(|listener| {
        let listener: &'a L = listener;
        let fut = call(listener);
        async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(ListenerError::panicked(listener.name())),
            }
        }
    });

    let mut report = FanOutReport::default();
    for (listener, result) in listeners.iter().zip(join_all(calls).await) {
        match result {
            Ok(()) => report.delivered += 1,
            Err(error) => {
                warn!(listener = listener.name(), event, error = %error, "Listener failed");
                report.failures.push(error);
            }
        }
    }
    report
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApplicationType;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
        panic: bool,
    }

    impl Counting {
        fn new(fail: bool, panic: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
                panic,
            })
        }
    }

    impl Listener for Counting {
        fn name(&self) -> &str {
            "counting"
        }
    }

    #[async_trait]
    impl ApplicationListener for Counting {
        async fn on_application_new(
            &self,
            _context: &OperationContext,
            _application: &ApplicationInfo,
        ) -> ListenerResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("listener bug");
            }
            if self.fail {
                return Err(ListenerError::failed(self.name(), "boom"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let registry: ListenerRegistry<dyn ApplicationListener> = ListenerRegistry::new();
        let ok = Counting::new(false, false);
        let failing = Counting::new(true, false);
        let panicking = Counting::new(false, true);
        let _h1 = registry.register(ok.clone());
        let _h2 = registry.register(failing.clone());
        let _h3 = registry.register(panicking.clone());

        let ctx = OperationContext::system();
        let app = ApplicationInfo::new("urn:x", ApplicationType::Server);
        let listeners = registry.snapshot();
        let report = fan_out(&listeners, "application_new", |l| {
            l.on_application_new(&ctx, &app)
        })
        .await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(ok.calls.load(Ordering::SeqCst), 1);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(panicking.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispose_removes_exactly_one() {
        let registry: ListenerRegistry<dyn ApplicationListener> = ListenerRegistry::new();
        let shared = Counting::new(false, false);
        let h1 = registry.register(shared.clone());
        let h2 = registry.register(shared.clone());
        assert_eq!(registry.len(), 2);

        assert!(h1.dispose());
        assert_eq!(registry.len(), 1);
        assert!(h2.dispose());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dispose_after_registry_dropped() {
        let registry: ListenerRegistry<dyn ApplicationListener> = ListenerRegistry::new();
        let handle = registry.register(Counting::new(false, false));
        drop(registry);
        assert!(!handle.dispose());
    }
}

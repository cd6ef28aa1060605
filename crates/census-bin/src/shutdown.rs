// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Graceful shutdown coordination.
//!
//! Handles OS signals (SIGTERM, SIGINT, SIGQUIT on Unix, Ctrl+C elsewhere)
//! and fans the shutdown out to background tasks over a broadcast channel.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

// =============================================================================
// ShutdownCoordinator
// =============================================================================

/// Coordinates graceful shutdown across background tasks.
///
/// # Example
///
/// ```ignore
/// use census_bin::shutdown::ShutdownCoordinator;
///
/// let coordinator = ShutdownCoordinator::new();
/// let processor_task = tokio::spawn(processor.run(subscriber, coordinator.subscribe()));
///
/// coordinator.wait_for_shutdown().await;
/// drain(processor_task, Duration::from_secs(30)).await;
/// ```
#[derive(Clone)]
pub struct ShutdownCoordinator {
    sender: broadcast::Sender<()>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Creates a new shutdown coordinator.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribes to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Initiates shutdown. Idempotent.
    pub fn initiate_shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Shutdown initiated");
            let _ = self.sender.send(());
        }
    }

    /// Returns true if shutdown has been initiated.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Waits for an OS signal or a manual [`initiate_shutdown`](Self::initiate_shutdown),
    /// then notifies all subscribers.
    pub async fn wait_for_shutdown(&self) {
        if self.is_shutdown_initiated() {
            return;
        }
        let mut manual = self.subscribe();

        tokio::select! {
            _ = os_signal() => {}
            _ = manual.recv() => {}
        }

        self.initiate_shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("shutdown_initiated", &self.is_shutdown_initiated())
            .finish()
    }
}

/// Resolves on the first termination signal. Never resolves if no handler
/// could be registered.
#[cfg(unix)]
async fn os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (sigterm, sigint, sigquit) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::quit()),
    ) {
        (Ok(term), Ok(int), Ok(quit)) => (term, int, quit),
        _ => {
            warn!("Failed to register signal handlers, waiting for manual shutdown");
            return std::future::pending().await;
        }
    };
    let (mut sigterm, mut sigint, mut sigquit) = (sigterm, sigint, sigquit);

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
        _ = sigquit.recv() => info!("Received SIGQUIT"),
    }
}

#[cfg(not(unix))]
async fn os_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => {
            warn!(error = %e, "Failed to register Ctrl+C handler, waiting for manual shutdown");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// Draining
// =============================================================================

/// Waits for a background task to finish, giving up after `timeout`.
///
/// Returns `true` if the task finished in time.
pub async fn drain<T>(task: JoinHandle<T>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "Background task ended abnormally");
            true
        }
        Err(_) => {
            warn!(timeout = ?timeout, "Background task did not stop in time");
            false
        }
    }
}

/// Runs `future` until it completes or shutdown is initiated.
pub async fn run_until_shutdown<F, T>(coordinator: &ShutdownCoordinator, future: F) -> Option<T>
where
    F: Future<Output = T>,
{
    if coordinator.is_shutdown_initiated() {
        return None;
    }
    let mut shutdown = coordinator.subscribe();
    tokio::pin!(future);

    tokio::select! {
        result = &mut future => Some(result),
        _ = shutdown.recv() => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_coordinator() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        assert!(!coordinator.is_shutdown_initiated());
        coordinator.initiate_shutdown();

        assert!(coordinator.is_shutdown_initiated());
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_manual_shutdown_releases_waiter() {
        let coordinator = ShutdownCoordinator::new();
        let waiter = coordinator.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_shutdown().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        coordinator.initiate_shutdown();

        assert!(drain(handle, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx1 = coordinator.subscribe();
        let mut rx2 = coordinator.subscribe();

        coordinator.initiate_shutdown();
        coordinator.initiate_shutdown();

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(run_until_shutdown(&coordinator, async { 7 }).await, Some(7));

        coordinator.initiate_shutdown();
        assert_eq!(run_until_shutdown(&coordinator, std::future::pending::<u8>()).await, None);
    }

    #[tokio::test]
    async fn test_drain_times_out() {
        let handle = tokio::spawn(std::future::pending::<()>());
        assert!(!drain(handle, Duration::from_millis(10)).await);
    }
}

//! Graceful shutdown: drain subscribers, then stop the listener.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::websocket::broadcast::SubscriberHub;

/// Default timeout for graceful shutdown before giving up on stragglers.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates shutdown of the listener and every subscriber session.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Clone of the token the listener stops on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop accepting connections.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Shut down in order, all within `timeout`:
    ///
    /// 1. Close the hub so every session ends with `UpstreamExhausted`
    ///    after delivering what it already queued
    /// 2. Wait for the sessions to deregister
    /// 3. Cancel the token and wait for `handles` to finish
    pub async fn graceful_shutdown(
        &self,
        hub: &SubscriberHub,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        let deadline = Instant::now() + timeout;

        hub.close();
        info!(
            subscribers = hub.subscriber_count(),
            timeout_secs = timeout.as_secs(),
            "draining subscribers"
        );
        if tokio::time::timeout_at(deadline, hub.drained()).await.is_err() {
            warn!(
                remaining = hub.subscriber_count(),
                "subscribers still connected at shutdown deadline"
            );
        }

        self.shutdown();
        info!(task_count = handles.len(), "waiting for tasks to complete");
        let drain = futures::future::join_all(handles);
        if tokio::time::timeout_at(deadline, drain).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, some tasks may still be running");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn token_propagation() {
        let coord = ShutdownCoordinator::default();
        let token = coord.token();
        assert!(!token.is_cancelled());
        coord.shutdown();
        coord.shutdown();
        assert!(token.is_cancelled());
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn closes_hub_then_cancels_tasks() {
        let coord = ShutdownCoordinator::new();
        let hub = SubscriberHub::new(4);
        let token = coord.token();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });

        coord.graceful_shutdown(&hub, vec![handle], None).await;

        assert!(hub.is_closed());
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn waits_for_subscribers_to_leave() {
        let coord = ShutdownCoordinator::new();
        let hub = std::sync::Arc::new(SubscriberHub::new(4));
        let (id, mut rx) = hub.register();
        let session = {
            let hub = std::sync::Arc::clone(&hub);
            tokio::spawn(async move {
                while rx.recv().await.is_some() {}
                hub.remove(&id);
            })
        };

        coord
            .graceful_shutdown(&hub, Vec::new(), Some(Duration::from_secs(5)))
            .await;

        assert_eq!(hub.subscriber_count(), 0);
        session.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_deadline() {
        let coord = ShutdownCoordinator::new();
        let hub = SubscriberHub::new(4);
        // Registered but never removed.
        let (_id, _rx) = hub.register();
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        let started = Instant::now();
        coord
            .graceful_shutdown(&hub, vec![stuck], Some(Duration::from_millis(100)))
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(hub.subscriber_count(), 1);
        assert!(coord.is_shutting_down());
    }
}

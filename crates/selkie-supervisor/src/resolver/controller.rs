//! Event-driven reconcile loop.
//!
//! Watch plumbing notifies the loop whenever a FederationDomain changes or
//! an identity provider is created or deleted (identity provider updates
//! are ignored: only name and UID are consumed and both are immutable).
//! Events are debounced into single reconcile passes; one pass is
//! outstanding at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use super::reconciler::FederationDomainReconciler;

/// A change to a watched resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceChange {
    /// Any create, update, or delete of a FederationDomain.
    FederationDomain,
    /// A create or delete of an identity provider resource.
    IdentityProvider,
}

/// Broadcast channel feeding the reconcile loop.
pub struct ResourceChangeNotifier {
    sender: broadcast::Sender<ResourceChange>,
}

impl ResourceChangeNotifier {
    /// Create a notifier with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Announce a resource change. Dropped silently when the loop is not
    /// running; the loop reconciles once at startup anyway.
    pub fn notify(&self, change: ResourceChange) {
        let _ = self.sender.send(change);
    }

    /// Subscribe to change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceChange> {
        self.sender.subscribe()
    }
}

impl Default for ResourceChangeNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Configuration for the reconcile loop.
#[derive(Debug, Clone)]
pub struct ReconcileServiceConfig {
    /// Quiet period after an event before reconciling, to coalesce bursts
    /// of created resources into one pass.
    pub debounce: Duration,

    /// Delay before retrying after a failed pass.
    pub retry_delay: Duration,
}

impl Default for ReconcileServiceConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            retry_delay: Duration::from_secs(3),
        }
    }
}

/// Drives the reconciler from resource change events.
pub struct ReconcileService {
    reconciler: Arc<FederationDomainReconciler>,
    notifier: Arc<ResourceChangeNotifier>,
    config: ReconcileServiceConfig,
}

impl ReconcileService {
    /// Create the service.
    #[must_use]
    pub fn new(
        reconciler: Arc<FederationDomainReconciler>,
        notifier: Arc<ResourceChangeNotifier>,
        config: ReconcileServiceConfig,
    ) -> Self {
        Self {
            reconciler,
            notifier,
            config,
        }
    }

    /// Run until `shutdown` resolves.
    ///
    /// Reconciles once at startup so the registry is populated before the
    /// HTTP server starts accepting traffic, then once per debounced event
    /// burst. A failed pass schedules a retry without waiting for another
    /// event, so transient status-write conflicts heal on their own.
    pub async fn run(&self, shutdown: impl Future<Output = ()> + Send) {
        let mut events = self.notifier.subscribe();
        let mut needs_sync = true;
        tokio::pin!(shutdown);

        loop {
            if needs_sync {
                tokio::time::sleep(self.config.debounce).await;
                // Drain everything that arrived during the quiet period.
                while events.try_recv().is_ok() {}

                match self.reconciler.sync().await {
                    Ok(()) => {
                        needs_sync = false;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "reconcile failed, will retry");
                        tokio::select! {
                            () = &mut shutdown => return,
                            () = tokio::time::sleep(self.config.retry_delay) => {}
                        }
                    }
                }
                continue;
            }

            tokio::select! {
                () = &mut shutdown => return,
                event = events.recv() => {
                    match event {
                        Ok(change) => {
                            tracing::debug!(?change, "resource change observed");
                            needs_sync = true;
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::debug!(missed, "change events lagged, reconciling");
                            needs_sync = true;
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        }
    }
}

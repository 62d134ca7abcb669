//! Background refresh triggers.
//!
//! Two things re-run screens without the user asking: a completed login,
//! which invalidates everything fetched under the old session, and a fixed
//! interval while the app stays open.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use campus_portal_cache::{CacheStore, Namespace};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::SyncError;

/// A screen that can re-run its last load.
#[async_trait]
pub trait Refreshable: Send + Sync {
    /// Cache namespace the screen owns.
    fn namespace(&self) -> Namespace;

    async fn refresh(&self) -> Result<(), SyncError>;
}

/// Published after the host finishes a login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginCompleted;

/// Broadcasts [`LoginCompleted`] to every listener.
#[derive(Debug, Clone)]
pub struct LoginEvents {
    tx: broadcast::Sender<LoginCompleted>,
}

impl Default for LoginEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginEvents {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LoginCompleted> {
        self.tx.subscribe()
    }

    /// Announces a login. Returns how many listeners received it.
    pub fn notify(&self) -> usize {
        self.tx.send(LoginCompleted).unwrap_or(0)
    }
}

/// Drops the target's cached data and reloads it.
///
/// # Errors
///
/// Returns [`SyncError::Cache`] if the namespace cannot be cleared, or
/// whatever the reload returns.
pub async fn invalidate_and_refresh(
    cache: &CacheStore,
    target: &dyn Refreshable,
) -> Result<(), SyncError> {
    let namespace = target.namespace();
    let removed = cache.clear_namespace(namespace)?;
    log::debug!("Invalidated {removed} {namespace} entries");
    target.refresh().await
}

/// Invalidates and refreshes every target after each login until `cancel`
/// fires or the event channel closes.
#[must_use]
pub fn spawn_login_listener(
    events: &LoginEvents,
    cache: Arc<CacheStore>,
    targets: Vec<Arc<dyn Refreshable>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(LoginCompleted) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::debug!("Coalescing {missed} missed login events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }

            log::info!("Login completed; refreshing {} screens", targets.len());
            for target in &targets {
                if let Err(e) = invalidate_and_refresh(&cache, target.as_ref()).await {
                    log::warn!("Refreshing {} after login failed: {e}", target.namespace());
                }
            }
        }
        log::debug!("Login listener stopped");
    })
}

/// Refreshes every target each `period` until `cancel` fires. The first
/// refresh happens one period after the call.
#[must_use]
pub fn spawn_periodic_refresh(
    targets: Vec<Arc<dyn Refreshable>>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            log::debug!("Periodic refresh of {} screens", targets.len());
            for target in &targets {
                match target.refresh().await {
                    Ok(()) | Err(SyncError::Cancelled) => {}
                    Err(e) => log::warn!("Periodic refresh of {} failed: {e}", target.namespace()),
                }
            }
        }
        log::debug!("Periodic refresh stopped");
    })
}

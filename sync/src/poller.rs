//! Background polling.
//!
//! Every tick runs a non-forced pull (download only when the remote
//! changed, merge, persist; never upload). Ticks that find a sync already
//! running are skipped so cycles never interleave.

use crate::controller::SyncController;
use crate::remote::RemoteStore;
use crate::store::LocalStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A controller shared between the poller and manual triggers.
pub type SharedController<L, R> = Arc<Mutex<SyncController<L, R>>>;

/// Why the poller stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerExit {
    Shutdown,
    Unauthenticated,
}

/// Spawn the polling loop.
///
/// The loop ends when `shutdown` flips to `true` (or its sender is dropped),
/// or once the controller has no token, either after `logout` or after the
/// remote rejected it.
pub fn spawn_poller<L, R>(
    shared: SharedController<L, R>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<PollerExit>
where
    L: LocalStore + 'static,
    R: RemoteStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        tracing::info!(interval_secs = interval.as_secs(), "Poller started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Poller shutting down");
                        return PollerExit::Shutdown;
                    }
                    continue;
                }
            }

            let Ok(mut controller) = shared.try_lock() else {
                tracing::debug!("Sync in progress, skipping poll");
                continue;
            };

            if !controller.is_authenticated() {
                tracing::info!("Not authenticated, poller stopping");
                return PollerExit::Unauthenticated;
            }

            match controller.pull(false).await {
                Ok(Some(report)) => {
                    tracing::debug!(from_remote = report.from_remote, "Poll merged remote changes")
                }
                Ok(None) => tracing::debug!("Poll found nothing new"),
                Err(e) if e.is_auth() => {
                    tracing::warn!(error = %e, "Poller stopping after auth failure");
                    return PollerExit::Unauthenticated;
                }
                Err(e) => tracing::warn!(error = %e, "Poll failed"),
            }
        }
    })
}

//! Background task that slowly restores per-IP quota.

use crate::admission::AdmissionController;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Spawn the limit decay loop.
///
/// Every `period` the controller's counters decay by one. The task exits as
/// soon as `shutdown_rx` flips to `true` or its sender is dropped.
pub fn spawn_limit_decay(
    controller: Arc<dyn AdmissionController>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("Limit decay task started (interval: {:?})", period);

        // first tick completes immediately
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    controller.decay().await;
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Limit decay task stopped");
    })
}

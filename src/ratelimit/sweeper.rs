//! Background removal of expired windows.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use super::clock::Clock;
use super::limiter::AdmissionController;

/// Spawn a task that sweeps expired windows every `every`.
///
/// Without it the window map grows with every distinct identity ever seen.
/// The task runs until the returned handle is aborted.
pub fn spawn_sweeper(
    controller: Arc<AdmissionController>,
    clock: Arc<dyn Clock>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let removed = controller.sweep_expired(clock.now());
            if removed > 0 {
                debug!(
                    removed,
                    remaining = controller.tracked_identities(),
                    "Swept expired rate limit windows"
                );
            }
        }
    })
}

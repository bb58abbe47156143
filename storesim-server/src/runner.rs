//! The periodic snapshot loop.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::console;
use crate::state::ServiceState;

/// Interval between two snapshots, which is also the length of the per-second window.
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

/// Publishes a snapshot every second and prints one to the console every console interval.
///
/// The first snapshot is taken immediately. Runs until shutdown is requested.
pub async fn poll_snapshots(state: ServiceState) {
    let guard = elegant_departure::get_shutdown_guard();

    let mut ticker = tokio::time::interval(SNAPSHOT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut next_print = Instant::now();

    loop {
        tokio::select! {
            _ = guard.wait() => break,
            _ = ticker.tick() => (),
        }

        let snapshot = state.poll();
        tracing::trace!(ops_per_second = snapshot.ops_per_second, "published snapshot");

        let now = Instant::now();
        if now >= next_print {
            console::print(&snapshot);
            next_print = now + state.config.console_interval;
        }
    }

    tracing::debug!("snapshot poller stopped");
}

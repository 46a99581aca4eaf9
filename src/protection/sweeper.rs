use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::storage::response_cache::ResponseCache;

use super::behavioral::BehaviorMonitor;

/// Owns the background sweep task. Dropping the handle stops the task.
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Periodically prune expired behavior records, suspensions and cache
/// entries. Returns `None` (nothing spawned) when `every` is zero or both
/// subsystems are disabled.
///
/// Must be called inside a tokio runtime.
pub fn spawn_sweeper(
    behavior: Arc<BehaviorMonitor>,
    cache: Arc<ResponseCache>,
    every: Duration,
) -> Option<SweeperHandle> {
    if every.is_zero() || (!behavior.is_enabled() && !cache.is_enabled()) {
        debug!("Sweeper not started");
        return None;
    }

    info!(interval_secs = every.as_secs_f64(), "Sweeper started");
    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = behavior.sweep();
            let purged = cache.purge_expired();
            debug!(
                records_removed = report.records_removed,
                suspensions_removed = report.suspensions_removed,
                cache_purged = purged,
                tracked = behavior.tracked_clients(),
                suspended = behavior.suspended_clients(),
                cached = cache.len(),
                "Sweep complete"
            );
        }
    });

    Some(SweeperHandle { task })
}

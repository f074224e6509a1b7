//! Background sweep of expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::ExpiringCache;

/// Shortest period the sweeper runs at.
pub const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Owns the sweeper task. Dropping the handle aborts the task.
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Cache sweeper task failed: {}", e);
                }
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Start a task that sweeps every partition of `cache` each `period`.
///
/// The first sweep runs one full period after start. Periods shorter than
/// [`MIN_SWEEP_PERIOD`] are raised to it.
pub fn spawn_sweeper<V>(cache: Arc<ExpiringCache<V>>, period: Duration) -> SweeperHandle
where
    V: Clone + Send + 'static,
{
    if period < MIN_SWEEP_PERIOD {
        warn!(
            "Cache sweep period {:?} is below {:?}, using the minimum",
            period, MIN_SWEEP_PERIOD
        );
    }
    let period = period.max(MIN_SWEEP_PERIOD);
    let (tx, mut rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        info!("Cache sweeper started ({:?} interval)", period);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = cache.cleanup_all();
                    if removed > 0 {
                        debug!(removed, "Cache sweep removed expired entries");
                    }
                }
                _ = &mut rx => break,
            }
        }
        debug!("Cache sweeper stopped");
    });

    SweeperHandle {
        shutdown: Some(tx),
        task: Some(task),
    }
}

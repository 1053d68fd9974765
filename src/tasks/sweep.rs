//! Collection Sweep Task
//!
//! Background task that periodically delivers collection notifications:
//! entries whose value was dropped are purged, and callbacks registered with
//! `notify_on_collect` are run.

use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::store::{collect_garbage, CacheInner};

/// Spawns a background task that periodically drains the cache's
/// finalization registry.
///
/// The task only holds a weak reference to the cache state and stops on the
/// first tick after the cache is dropped. The cache also aborts it on drop.
///
/// # Arguments
/// * `cache` - Weak reference to the shared cache state
/// * `interval` - Time between sweeps
/// * `runtime` - Runtime the task is spawned on
pub(crate) fn spawn_sweep_task<V>(
    cache: Weak<Mutex<CacheInner<V>>>,
    interval: Duration,
    runtime: &Handle,
) -> JoinHandle<()>
where
    V: Send + Sync + 'static,
{
    runtime.spawn(async move {
        info!(?interval, "Starting collection sweep task");

        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let handled = match cache.upgrade() {
                Some(inner) => collect_garbage(&inner),
                None => {
                    debug!("Cache dropped, stopping collection sweep");
                    break;
                }
            };

            if handled > 0 {
                info!("Collection sweep: handled {} removals and notifications", handled);
            } else {
                debug!("Collection sweep: nothing collected");
            }
        }
    })
}

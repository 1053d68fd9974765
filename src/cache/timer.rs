//! TTL Scheduler Module
//!
//! Per-entry deferred removal timers running on a tokio runtime.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::error::{CacheError, Result};

// == Is Expired ==
/// Returns true once `now` has reached the expiry deadline.
pub fn is_expired(expires_at: Instant, now: Instant) -> bool {
    now >= expires_at
}

// == Timer Handle ==
/// A pending timer. Disarming is idempotent, and dropping the handle disarms
/// it as well.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
    deadline: Instant,
}

impl TimerHandle {
    /// Cancels the timer. Safe on a timer that already fired or was
    /// already cancelled.
    pub fn disarm(&self) {
        self.task.abort();
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// == TTL Scheduler ==
/// Arms timers on the runtime captured at construction.
#[derive(Debug, Clone)]
pub struct TtlScheduler {
    runtime: Handle,
}

impl TtlScheduler {
    // == Constructor ==
    /// Captures the current tokio runtime.
    ///
    /// Fails when called outside of a runtime context, since no timer could
    /// ever fire.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|err| {
            CacheError::Construction(format!("a tokio runtime with timers is required: {err}"))
        })?;
        Ok(Self { runtime })
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    // == Arm ==
    /// Schedules `on_fire` to run once `ttl` has elapsed.
    ///
    /// A zero `ttl` means "never expires": nothing is armed and `None` is
    /// returned. So does a `ttl` whose deadline is past the clock's range.
    pub fn arm<F>(&self, ttl: Duration, on_fire: F) -> Option<TimerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        if ttl.is_zero() {
            return None;
        }

        let deadline = Instant::now().checked_add(ttl)?;
        let task = self.runtime.spawn(async move {
            time::sleep_until(deadline).await;
            on_fire();
        });

        Some(TimerHandle { task, deadline })
    }
}

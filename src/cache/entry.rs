//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and liveness
//! support.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::liveness::{UnregisterToken, WeakHandle};
use crate::cache::timer::{self, TimerHandle};

// == Slot ==
/// How an entry holds its value.
#[derive(Debug)]
pub enum Slot<V> {
    /// Object-keyed entries only observe the value
    Weak(WeakHandle<V>),
    /// Plain and token keyed entries keep the value alive
    Strong(Arc<V>),
}

impl<V> Slot<V> {
    pub fn resolve(&self) -> Option<Arc<V>> {
        match self {
            Slot::Weak(handle) => handle.resolve(),
            Slot::Strong(value) => Some(value.clone()),
        }
    }

    pub fn is_dead(&self) -> bool {
        match self {
            Slot::Weak(handle) => handle.is_dead(),
            Slot::Strong(_) => false,
        }
    }
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug)]
pub struct CacheEntry<V> {
    /// The stored value, weak or strong depending on the key kind
    pub slot: Slot<V>,
    /// Last successful read or write
    pub last_access: Instant,
    /// Expiration deadline, None = no expiration
    pub expires_at: Option<Instant>,
    /// Pending eager-removal timer
    pub timer: Option<TimerHandle>,
    /// Token of this entry's registry registration
    pub registration: Option<UnregisterToken>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry without expiry, timer, or registration.
    pub fn new(slot: Slot<V>, now: Instant) -> Self {
        Self {
            slot,
            last_access: now,
            expires_at: None,
            timer: None,
            registration: None,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is expired once the current time reaches
    /// the expiration time, so a read exactly at `created + ttl` misses.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => timer::is_expired(expires, now),
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL, or None if no expiration is set.
    ///
    /// - `Some(Duration::ZERO)` if the entry has expired
    /// - `Some(remaining)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(now))
    }

    // == Arm ==
    /// Installs a new timer, disarming any previous one. `None` clears the
    /// expiry.
    pub fn arm(&mut self, timer: Option<TimerHandle>) {
        self.disarm();
        self.expires_at = timer.as_ref().map(TimerHandle::deadline);
        self.timer = timer;
    }

    // == Disarm ==
    /// Cancels the pending timer, if any. Keeps `expires_at` so a lazy check
    /// still sees the deadline.
    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.disarm();
        }
    }
}

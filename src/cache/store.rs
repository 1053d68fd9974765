//! Cache Store Module
//!
//! Main cache engine combining keyed storage with LRU tracking, TTL
//! expiration, and liveness-based reclamation.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::cache::entry::{CacheEntry, Slot};
use crate::cache::liveness::{FinalizationRegistry, UnregisterToken, WeakHandle};
use crate::cache::timer::{TimerHandle, TtlScheduler};
use crate::cache::{CacheKey, CacheStats, KeyKind, LruTracker};
use crate::config::Config;
use crate::error::Result;
use crate::tasks::spawn_sweep_task;

type Cleanup = Box<dyn FnOnce(CacheKey) + Send>;

// == Correlation ==
/// What a registry registration stands for.
pub(crate) enum Correlation {
    /// A stored object entry, matched back by its unregister token
    Entry { key: CacheKey, token: UnregisterToken },
    /// A caller-supplied notification, independent of storage
    Notify { key: CacheKey, cleanup: Cleanup },
}

// == Removal Cause ==
/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemovalCause {
    Deleted,
    Expired,
    Collected,
    Evicted,
    Replaced,
}

// == TTL Info ==
/// Remaining time-to-live of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TtlInfo {
    /// Time left before the entry expires
    pub remaining: Duration,
    /// Monotonic expiry deadline
    #[serde(skip)]
    pub deadline: Instant,
    /// Wall-clock expiry time
    pub expires_at: DateTime<Utc>,
}

// == Cache Inner ==
/// State shared between cache handles, timers, and the sweep task.
pub(crate) struct CacheInner<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    lru: LruTracker<CacheKey>,
    registry: FinalizationRegistry<Correlation>,
    scheduler: TtlScheduler,
    stats: CacheStats,
    max_size: Option<NonZeroUsize>,
    default_ttl: Option<Duration>,
    sweeper: Option<JoinHandle<()>>,
    this: Weak<Mutex<CacheInner<V>>>,
}

impl<V: Send + Sync + 'static> CacheInner<V> {
    // == Purge ==
    /// Removes an entry and releases its timer, registration, and ledger
    /// node. No-op when the key is absent.
    fn purge(&mut self, key: &CacheKey, cause: RemovalCause) -> Option<CacheEntry<V>> {
        let mut entry = self.entries.remove(key)?;
        entry.disarm();
        if let Some(token) = entry.registration.take() {
            if !self.registry.unregister(token) {
                debug!(?key, "Registration already consumed");
            }
        }
        self.lru.remove(key);

        match cause {
            RemovalCause::Expired => self.stats.record_expiration(),
            RemovalCause::Collected => self.stats.record_collection(),
            RemovalCause::Evicted => self.stats.record_eviction(),
            RemovalCause::Deleted | RemovalCause::Replaced => {}
        }
        self.stats.set_total_entries(self.entries.len());

        debug!(?key, ?cause, "Entry removed");
        Some(entry)
    }

    // == Resolve Live ==
    /// Returns the value if the entry is unexpired and its value is still
    /// alive; otherwise purges the entry.
    fn resolve_live(&mut self, key: &CacheKey, now: Instant) -> Option<Arc<V>> {
        let state = {
            let entry = self.entries.get(key)?;
            if entry.is_expired(now) {
                Err(RemovalCause::Expired)
            } else {
                entry.slot.resolve().ok_or(RemovalCause::Collected)
            }
        };

        match state {
            Ok(value) => Some(value),
            Err(cause) => {
                self.purge(key, cause);
                None
            }
        }
    }

    // == Purge Stale ==
    /// Full sweep removing every expired or collected entry.
    fn purge_stale(&mut self, now: Instant) -> usize {
        let stale: Vec<(CacheKey, RemovalCause)> = self
            .entries
            .iter()
            .filter_map(|(key, entry)| {
                if entry.is_expired(now) {
                    Some((key.clone(), RemovalCause::Expired))
                } else if entry.slot.is_dead() {
                    Some((key.clone(), RemovalCause::Collected))
                } else {
                    None
                }
            })
            .collect();

        let count = stale.len();
        for (key, cause) in stale {
            self.purge(&key, cause);
        }
        count
    }

    // == Insert ==
    fn insert(&mut self, key: CacheKey, value: Arc<V>, ttl: Option<Duration>) {
        let now = Instant::now();
        let effective_ttl = ttl.or(self.default_ttl).unwrap_or(Duration::ZERO);
        let timer = self.arm_timer(&key, effective_ttl);

        // An expired or collected predecessor is purged here and the key
        // counts as new for the capacity check.
        let is_overwrite = self.resolve_live(&key, now).is_some();
        if is_overwrite {
            self.purge(&key, RemovalCause::Replaced);
        } else if let Some(max_size) = self.max_size {
            // Capacity bounds live entries only.
            if self.entries.len() >= max_size.get() {
                self.purge_stale(now);
            }
            while self.entries.len() >= max_size.get() {
                let Some(victim) = self.lru.evict_oldest() else {
                    break;
                };
                self.purge(&victim, RemovalCause::Evicted);
            }
        }

        let mut entry = match key.kind() {
            KeyKind::Object => {
                let token = UnregisterToken::new();
                self.registry.register(
                    &value,
                    Correlation::Entry {
                        key: key.clone(),
                        token,
                    },
                    Some(token),
                );
                let mut entry = CacheEntry::new(Slot::Weak(WeakHandle::observe(&value)), now);
                entry.registration = Some(token);
                entry
            }
            KeyKind::Token | KeyKind::Plain => CacheEntry::new(Slot::Strong(value), now),
        };

        entry.arm(timer);

        debug!(?key, ?effective_ttl, is_overwrite, "Entry stored");
        self.entries.insert(key.clone(), entry);
        self.lru.touch(&key);
        self.stats.set_total_entries(self.entries.len());
    }

    // == Arm Timer ==
    fn arm_timer(&self, key: &CacheKey, ttl: Duration) -> Option<TimerHandle> {
        let cache = self.this.clone();
        let key = key.clone();
        self.scheduler.arm(ttl, move || {
            if let Some(inner) = cache.upgrade() {
                inner.lock().expire_if_due(&key);
            }
        })
    }

    /// Timer fire handler. The entry may be gone, replaced, or re-armed by
    /// the time this runs.
    fn expire_if_due(&mut self, key: &CacheKey) {
        let now = Instant::now();
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(now))
        {
            self.purge(key, RemovalCause::Expired);
        }
    }

    // == Clear ==
    fn clear(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        for (key, mut entry) in entries {
            entry.disarm();
            if let Some(token) = entry.registration.take() {
                if !self.registry.unregister(token) {
                    debug!(?key, "Registration already consumed");
                }
            }
        }
        self.lru.clear();
        self.stats.set_total_entries(0);
    }

    // == Drain Collected ==
    /// Purges entries whose values were reported collected, and hands back
    /// the caller callbacks to run once the lock is released.
    fn drain_collected(&mut self) -> (usize, Vec<(CacheKey, Cleanup)>) {
        let mut removed = 0;
        let mut callbacks = Vec::new();

        for correlation in self.registry.drain_collected() {
            match correlation {
                Correlation::Entry { key, token } => {
                    let Some(entry) = self.entries.get_mut(&key) else {
                        continue;
                    };
                    if entry.registration != Some(token) {
                        continue;
                    }
                    // The registry already dropped this registration.
                    entry.registration = None;
                    self.purge(&key, RemovalCause::Collected);
                    removed += 1;
                }
                Correlation::Notify { key, cleanup } => callbacks.push((key, cleanup)),
            }
        }

        (removed, callbacks)
    }
}

impl<V> Drop for CacheInner<V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

// == Collect Garbage ==
/// Drains the registry of `inner` and purges any remaining expired or
/// collected entries, then runs caller callbacks outside the lock. Returns
/// the number of entries removed plus notifications delivered.
pub(crate) fn collect_garbage<V: Send + Sync + 'static>(inner: &Mutex<CacheInner<V>>) -> usize {
    let (removed, callbacks) = {
        let mut inner = inner.lock();
        let (collected, callbacks) = inner.drain_collected();
        (collected + inner.purge_stale(Instant::now()), callbacks)
    };
    let delivered = callbacks.len();

    for (key, cleanup) in callbacks {
        let label = format!("{key:?}");
        if panic::catch_unwind(AssertUnwindSafe(move || cleanup(key))).is_err() {
            error!(key = %label, "Collection cleanup callback panicked");
        }
    }

    removed + delivered
}

// == Weak Cache ==
/// In-process cache whose entries disappear when their value is dropped,
/// their TTL elapses, or they are evicted as least recently used.
///
/// Object-keyed entries only hold a weak handle to their value: the cache
/// never keeps such a value alive. Plain and token keyed entries hold their
/// value until removed.
///
/// Handles are cheap to clone and share one cache.
pub struct WeakCache<V> {
    inner: Arc<Mutex<CacheInner<V>>>,
}

impl<V: Send + Sync + 'static> WeakCache<V> {
    // == Constructor ==
    /// Creates a new cache.
    ///
    /// Must be called within a tokio runtime, which drives TTL timers and
    /// the collection sweep task.
    pub fn new(config: Config) -> Result<Self> {
        let scheduler = TtlScheduler::new()?;

        let inner = Arc::new_cyclic(|this| {
            Mutex::new(CacheInner {
                entries: HashMap::new(),
                lru: LruTracker::new(),
                registry: FinalizationRegistry::new(),
                scheduler: scheduler.clone(),
                stats: CacheStats::new(),
                max_size: config.max_size,
                default_ttl: config.default_ttl,
                sweeper: None,
                this: this.clone(),
            })
        });

        if let Some(interval) = config.sweep_interval {
            let sweeper = spawn_sweep_task(Arc::downgrade(&inner), interval, scheduler.runtime());
            inner.lock().sweeper = Some(sweeper);
        }

        info!(
            max_size = ?config.max_size,
            default_ttl = ?config.default_ttl,
            sweep_interval = ?config.sweep_interval,
            "Cache initialized"
        );
        Ok(Self { inner })
    }

    /// Creates a cache with [`Config::default`].
    pub fn with_defaults() -> Result<Self> {
        Self::new(Config::default())
    }

    // == Set ==
    /// Stores a value under `key`.
    ///
    /// Any previous entry under the key is torn down first. If the key is
    /// new and the cache is at capacity, the least recently used entry is
    /// evicted.
    ///
    /// `ttl` overrides the default TTL for this entry; `Some(Duration::ZERO)`
    /// means the entry never expires.
    pub fn set(&self, key: impl Into<CacheKey>, value: Arc<V>, ttl: Option<Duration>) -> Result<()> {
        let key = key.into();
        key.validate()?;
        self.inner.lock().insert(key, value, ttl);
        Ok(())
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired and collected entries are purged and count as misses. A hit
    /// marks the key as most recently used.
    pub fn get(&self, key: impl Into<CacheKey>) -> Option<Arc<V>> {
        let key = key.into();
        let now = Instant::now();
        let mut inner = self.inner.lock();

        match inner.resolve_live(&key, now) {
            Some(value) => {
                inner.stats.record_hit();
                inner.lru.touch(&key);
                if let Some(entry) = inner.entries.get_mut(&key) {
                    entry.last_access = now;
                }
                Some(value)
            }
            None => {
                inner.stats.record_miss();
                None
            }
        }
    }

    // == Has ==
    /// Checks whether a live entry exists, without touching recency.
    pub fn has(&self, key: impl Into<CacheKey>) -> bool {
        let key = key.into();
        self.inner
            .lock()
            .resolve_live(&key, Instant::now())
            .is_some()
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether an entry was stored.
    pub fn delete(&self, key: impl Into<CacheKey>) -> bool {
        let key = key.into();
        self.inner
            .lock()
            .purge(&key, RemovalCause::Deleted)
            .is_some()
    }

    // == Clear ==
    /// Removes every entry, cancelling all timers and registrations.
    ///
    /// Notifications registered with [`Self::notify_on_collect`] are kept.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    // == Keys ==
    /// Returns the live keys, least recently used first.
    ///
    /// Sweeps every entry first, so this is O(n).
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut inner = self.inner.lock();
        inner.purge_stale(Instant::now());
        inner.lru.iter().cloned().collect()
    }

    // == Length ==
    /// Returns the number of live entries.
    ///
    /// Sweeps every entry first, so this is O(n).
    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.purge_stale(Instant::now());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Get TTL ==
    /// Returns the remaining TTL, or None if the key is unknown or never
    /// expires.
    pub fn get_ttl(&self, key: impl Into<CacheKey>) -> Option<TtlInfo> {
        let key = key.into();
        let now = Instant::now();
        let mut inner = self.inner.lock();

        inner.resolve_live(&key, now)?;
        let entry = inner.entries.get(&key)?;
        let deadline = entry.expires_at?;
        let remaining = entry.ttl_remaining(now)?;
        // Deadlines past chrono's range clamp to its maximum.
        let expires_at = chrono::Duration::from_std(remaining)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Some(TtlInfo {
            remaining,
            deadline,
            expires_at,
        })
    }

    // == Update TTL ==
    /// Re-arms the TTL of an existing entry. A zero `ttl` removes the
    /// expiry. Returns false if the key is not live.
    pub fn update_ttl(&self, key: impl Into<CacheKey>, ttl: Duration) -> bool {
        let key = key.into();
        let mut inner = self.inner.lock();

        if inner.resolve_live(&key, Instant::now()).is_none() {
            return false;
        }
        let timer = inner.arm_timer(&key, ttl);
        match inner.entries.get_mut(&key) {
            Some(entry) => {
                entry.arm(timer);
                debug!(?key, ?ttl, "Entry TTL updated");
                true
            }
            None => false,
        }
    }

    // == Notify On Collect ==
    /// Runs `cleanup(key)` once `value` has been dropped everywhere.
    ///
    /// Independent of storage: `value` need not be cached, and `key` is only
    /// handed back to `cleanup`. Delivery happens on the next collection
    /// sweep. A panicking `cleanup` is logged and swallowed.
    pub fn notify_on_collect<T, F>(
        &self,
        key: impl Into<CacheKey>,
        value: &Arc<T>,
        cleanup: F,
        unregister_token: Option<UnregisterToken>,
    ) -> Result<()>
    where
        T: Send + Sync + 'static,
        F: FnOnce(CacheKey) + Send + 'static,
    {
        let key = key.into();
        key.validate()?;
        self.inner.lock().registry.register(
            value,
            Correlation::Notify {
                key,
                cleanup: Box::new(cleanup),
            },
            unregister_token,
        );
        Ok(())
    }

    /// Cancels notifications registered with `token`. Returns false if none
    /// were pending.
    pub fn unregister_notification(&self, token: UnregisterToken) -> bool {
        self.inner.lock().registry.unregister(token)
    }

    // == Process Collections ==
    /// Handles every pending collection notification now, instead of
    /// waiting for the sweep task. Returns the number handled.
    pub fn process_collections(&self) -> usize {
        collect_garbage(&self.inner)
    }

    // == Stats ==
    /// Returns current cache statistics. Does not sweep.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();
        stats.set_total_entries(inner.entries.len());
        stats
    }
}

impl<V> Clone for WeakCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> fmt::Debug for WeakCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("WeakCache")
            .field("entries", &inner.entries.len())
            .field("max_size", &inner.max_size)
            .field("default_ttl", &inner.default_ttl)
            .finish_non_exhaustive()
    }
}

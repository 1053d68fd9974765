//! Liveness Tracking Module
//!
//! Observes values without extending their lifetime, and records which
//! registrations have lost their last strong handle.
//!
//! Nothing here fires on its own: [`FinalizationRegistry::drain_collected`]
//! is polled by the cache, either from the background sweep task or on
//! demand. Readers must still call [`WeakHandle::resolve`] on access, since a
//! value can die long before the next drain.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_UNREGISTER_TOKEN: AtomicU64 = AtomicU64::new(1);

// == Weak Handle ==
/// Non-owning observation handle to a value.
///
/// Once `resolve` returns `None` it returns `None` forever.
pub struct WeakHandle<V> {
    inner: Weak<V>,
}

impl<V> WeakHandle<V> {
    /// Starts observing `value`.
    pub fn observe(value: &Arc<V>) -> Self {
        Self {
            inner: Arc::downgrade(value),
        }
    }

    /// Returns the value while any strong handle to it is still alive.
    pub fn resolve(&self) -> Option<Arc<V>> {
        self.inner.upgrade()
    }

    pub fn is_dead(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

impl<V> Clone for WeakHandle<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> fmt::Debug for WeakHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("dead", &self.is_dead())
            .finish()
    }
}

// == Unregister Token ==
/// Disposal token used to cancel a pending registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnregisterToken(u64);

impl UnregisterToken {
    /// Creates a token that no other call has returned.
    pub fn new() -> Self {
        Self(NEXT_UNREGISTER_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for UnregisterToken {
    fn default() -> Self {
        Self::new()
    }
}

// == Registration ==
struct Registration<H> {
    target: Weak<dyn Any + Send + Sync>,
    held: H,
    token: Option<UnregisterToken>,
}

// == Finalization Registry ==
/// Shared registry of (target, held value, unregister token) triples.
///
/// One registry serves many registrations: `held` tells the caller which
/// registration a collected target belonged to, the token cancels it.
pub struct FinalizationRegistry<H> {
    next_id: u64,
    registrations: HashMap<u64, Registration<H>>,
    by_token: HashMap<UnregisterToken, Vec<u64>>,
}

impl<H> FinalizationRegistry<H> {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            next_id: 0,
            registrations: HashMap::new(),
            by_token: HashMap::new(),
        }
    }

    // == Register ==
    /// Watches `target`; once it has no strong handle left, `held` is
    /// returned by the next [`Self::drain_collected`].
    pub fn register<T>(&mut self, target: &Arc<T>, held: H, token: Option<UnregisterToken>)
    where
        T: Send + Sync + 'static,
    {
        let erased: Arc<dyn Any + Send + Sync> = target.clone();
        let id = self.next_id;
        self.next_id += 1;

        if let Some(token) = token {
            self.by_token.entry(token).or_default().push(id);
        }
        self.registrations.insert(
            id,
            Registration {
                target: Arc::downgrade(&erased),
                held,
                token,
            },
        );
    }

    // == Unregister ==
    /// Cancels every pending registration made with `token`.
    ///
    /// Returns `false` if the token is unknown, already unregistered, or
    /// already consumed by a drain.
    pub fn unregister(&mut self, token: UnregisterToken) -> bool {
        match self.by_token.remove(&token) {
            Some(ids) => {
                for id in ids {
                    self.registrations.remove(&id);
                }
                true
            }
            None => false,
        }
    }

    // == Drain Collected ==
    /// Removes and returns the held values of all registrations whose target
    /// has been dropped.
    pub fn drain_collected(&mut self) -> Vec<H> {
        let dead: Vec<u64> = self
            .registrations
            .iter()
            .filter(|(_, registration)| registration.target.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut collected = Vec::with_capacity(dead.len());
        for id in dead {
            if let Some(registration) = self.registrations.remove(&id) {
                if let Some(token) = registration.token {
                    self.forget_token(token, id);
                }
                collected.push(registration.held);
            }
        }
        collected
    }

    // == Length ==
    /// Returns the number of pending registrations.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    fn forget_token(&mut self, token: UnregisterToken, id: u64) {
        if let Some(ids) = self.by_token.get_mut(&token) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_token.remove(&token);
            }
        }
    }
}

impl<H> Default for FinalizationRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for FinalizationRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalizationRegistry")
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weak_handle_resolves_while_alive() {
        let value = Arc::new("payload".to_string());
        let handle = WeakHandle::observe(&value);

        assert_eq!(handle.resolve().as_deref(), Some(&"payload".to_string()));
        assert!(!handle.is_dead());
        // Observation must not add a strong reference.
        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn test_weak_handle_never_resurrects() {
        let value = Arc::new(42u32);
        let handle = WeakHandle::observe(&value);
        drop(value);

        assert!(handle.is_dead());
        assert!(handle.resolve().is_none());
        assert!(handle.clone().resolve().is_none());
    }

    #[test]
    fn test_unregister_tokens_are_unique() {
        assert_ne!(UnregisterToken::new(), UnregisterToken::new());
    }

    #[test]
    fn test_drain_returns_only_dead_targets() {
        let mut registry = FinalizationRegistry::new();
        let alive = Arc::new(1u8);
        let dead = Arc::new(2u8);

        registry.register(&alive, "alive", None);
        registry.register(&dead, "dead", None);
        drop(dead);

        assert_eq!(registry.drain_collected(), vec!["dead"]);
        assert_eq!(registry.len(), 1);
        // A drained registration is gone for good.
        assert!(registry.drain_collected().is_empty());
    }

    #[test]
    fn test_unregister_cancels_pending_notification() {
        let mut registry = FinalizationRegistry::new();
        let value = Arc::new(());
        let token = UnregisterToken::new();

        registry.register(&value, "entry", Some(token));
        assert!(registry.unregister(token));
        drop(value);

        assert!(registry.drain_collected().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_twice_or_after_drain_is_harmless() {
        let mut registry = FinalizationRegistry::new();
        let value = Arc::new(());
        let token = UnregisterToken::new();

        registry.register(&value, 7, Some(token));
        drop(value);
        assert_eq!(registry.drain_collected(), vec![7]);

        assert!(!registry.unregister(token));
        assert!(!registry.unregister(token));
        assert!(!registry.unregister(UnregisterToken::new()));
    }

    #[test]
    fn test_shared_token_cancels_all_its_registrations() {
        let mut registry = FinalizationRegistry::new();
        let a = Arc::new(1);
        let b = Arc::new(2);
        let token = UnregisterToken::new();

        registry.register(&a, 'a', Some(token));
        registry.register(&b, 'b', Some(token));
        assert_eq!(registry.len(), 2);

        assert!(registry.unregister(token));
        assert!(registry.is_empty());
    }
}

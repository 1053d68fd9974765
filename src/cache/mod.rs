//! Cache Module
//!
//! Provides in-memory caching with liveness-based reclamation, TTL
//! expiration, and LRU eviction.

mod entry;
mod key;
mod liveness;
mod lru;
mod stats;
pub(crate) mod store;
mod timer;


// Re-export public types
pub use entry::{CacheEntry, Slot};
pub use key::{CacheKey, KeyKind, ObjectKey, Token};
pub use liveness::{FinalizationRegistry, UnregisterToken, WeakHandle};
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::{TtlInfo, WeakCache};
pub use timer::{is_expired, TimerHandle, TtlScheduler};

// == Public Constants ==
/// Maximum allowed plain key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

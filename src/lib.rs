//! Weak Cache - An in-process cache that forgets what nobody else remembers
//!
//! Entries are reclaimed when their value is dropped by every other owner,
//! when their TTL elapses, or when LRU eviction makes room under a size bound.

pub mod cache;
pub mod config;
pub mod error;
mod tasks;

pub use cache::{CacheKey, CacheStats, KeyKind, ObjectKey, Token, TtlInfo, UnregisterToken, WeakCache};
pub use config::Config;
pub use error::{CacheError, Result};

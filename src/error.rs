//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Only construction and validation failures are surfaced to callers.
/// Failures inside timer or collection callbacks have no caller to return
/// to; they are logged and swallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The host cannot provide timers or background tasks
    #[error("Construction failed: {0}")]
    Construction(String),

    /// Key rejected by validation
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

//! Configuration Module
//!
//! Handles constructor-time cache options, optionally loaded from environment
//! variables.

use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

/// Default interval between background collection sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

// == Config ==
/// Cache configuration parameters.
///
/// Every option is optional: without `max_size` nothing is ever evicted,
/// without `default_ttl` entries only expire when given a per-entry TTL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TTL applied when `set` is called without one
    pub default_ttl: Option<Duration>,
    /// Maximum number of live entries before LRU eviction kicks in
    pub max_size: Option<NonZeroUsize>,
    /// Interval of the background collection sweep, `None` disables the task
    pub sweep_interval: Option<Duration>,
}

impl Config {
    // == Builders ==
    /// Sets the default TTL. A zero duration means entries never expire.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = non_zero_duration(ttl);
        self
    }

    /// Sets the capacity bound. Zero disables eviction.
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = NonZeroUsize::new(max_size);
        self
    }

    /// Sets the sweep interval. Zero disables the background sweep.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = non_zero_duration(interval);
        self
    }

    // == From Env ==
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `WEAK_CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: none)
    /// - `WEAK_CACHE_MAX_SIZE` - Maximum live entries (default: unbounded)
    /// - `WEAK_CACHE_SWEEP_INTERVAL_MS` - Sweep interval in milliseconds (default: 1000)
    ///
    /// A value of `0` disables the corresponding feature. Unparsable values
    /// fall back to the default.
    pub fn from_env() -> Self {
        let default_ttl = env_u64("WEAK_CACHE_DEFAULT_TTL_MS")
            .and_then(|ms| non_zero_duration(Duration::from_millis(ms)));
        let max_size = env_u64("WEAK_CACHE_MAX_SIZE")
            .and_then(|n| usize::try_from(n).ok())
            .and_then(NonZeroUsize::new);
        let sweep_interval = match env_u64("WEAK_CACHE_SWEEP_INTERVAL_MS") {
            Some(ms) => non_zero_duration(Duration::from_millis(ms)),
            None => Some(DEFAULT_SWEEP_INTERVAL),
        };

        Self {
            default_ttl,
            max_size,
            sweep_interval,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl: None,
            max_size: None,
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn non_zero_duration(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

//! Configuration for the request coordinator.

use std::time::Duration;

/// Default lifetime of a cached result.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Default window used to coalesce near-simultaneous callers.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Default maximum number of cached keys before LRU eviction.
pub const DEFAULT_MAX_ENTRIES: usize = 256;

/// Configuration for [`RequestCoordinator`](crate::RequestCoordinator).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a successful result is served from memory.
    pub ttl: Duration,

    /// Delay between registering a request and invoking its producer.
    pub debounce: Duration,

    /// Maximum number of cached keys.
    pub max_entries: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            debounce: DEFAULT_DEBOUNCE,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CoordinatorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the debounce window. `Duration::ZERO` disables it.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the maximum number of cached keys.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }
}

//! Single-flight request coordinator with TTL-bounded result cache.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};

/// Outcome of an in-flight request, shared by every caller that joined it.
type Pending<V> = Shared<BoxFuture<'static, Result<V>>>;

/// A cached result.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Cached data.
    pub data: V,

    /// When the producer call that created this entry settled.
    pub stored_at: Instant,

    /// Instant after which the entry must not be served.
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(data: V, ttl: std::time::Duration) -> Self {
        let stored_at = Instant::now();
        Self {
            data,
            stored_at,
            expires_at: stored_at + ttl,
        }
    }

    /// Whether the entry may still be served at `now`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// State shared between the coordinator handle and its producer tasks.
struct CoordinatorInner<V> {
    /// Settled results, keyed by logical request key.
    entries: LruCache<String, CacheEntry<V>>,

    /// Requests that have been registered but not yet settled.
    in_flight: HashMap<String, Pending<V>>,
}

/// Deduplicates concurrent reads and serves recent results from memory.
///
/// For a given key, callers observe either a fresh cached value or the
/// outcome of the single producer call currently in flight; two producer
/// invocations for the same key never overlap.
///
/// Each producer runs on its own task, so the in-flight handle is removed
/// and the cache updated even if every caller stops waiting.
pub struct RequestCoordinator<V> {
    inner: Arc<Mutex<CoordinatorInner<V>>>,
    config: CoordinatorConfig,
}

impl<V> RequestCoordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new coordinator.
    pub fn new(config: CoordinatorConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);

        let inner = CoordinatorInner {
            entries: LruCache::new(cap),
            in_flight: HashMap::new(),
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
            config,
        }
    }

    /// Get the coordinator configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run `producer` for `key`, unless a fresh result or an in-flight call
    /// for the same key can be reused.
    ///
    /// A failed producer call is reported to every caller that joined it and
    /// is never cached; the next call for the key starts a fresh attempt.
    pub async fn execute<F, Fut, E>(&self, key: &str, producer: F) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let pending = {
            let mut inner = self.inner.lock();
            let now = Instant::now();

            let cached = inner
                .entries
                .get(key)
                .map(|entry| entry.is_fresh(now).then(|| entry.data.clone()));
            match cached {
                Some(Some(data)) => {
                    trace!(key = %key, "Serving cached result");
                    return Ok(data);
                }
                Some(None) => {
                    debug!(key = %key, "Cached result expired");
                    inner.entries.pop(key);
                }
                None => {}
            }

            if let Some(pending) = inner.in_flight.get(key) {
                debug!(key = %key, "Joining in-flight request");
                pending.clone()
            } else {
                debug!(key = %key, "Cache miss, starting request");
                let pending = self.spawn_request(key.to_string(), producer);
                inner.in_flight.insert(key.to_string(), pending.clone());
                pending
            }
        };

        pending.await
    }

    /// Register the producer task for `key`.
    ///
    /// Called with the state lock held, so the task cannot settle before its
    /// handle is visible in `in_flight`.
    fn spawn_request<F, Fut, E>(&self, key: String, producer: F) -> Pending<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let debounce = self.config.debounce;
        let ttl = self.config.ttl;
        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            key: Some(key),
        };

        let handle = tokio::spawn(async move {
            if !debounce.is_zero() {
                tokio::time::sleep(debounce).await;
            }

            let result = producer().await.map_err(Error::producer);
            guard.settle(&result, ttl);

            result
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(Error::Aborted(e.to_string())))
        }
        .boxed()
        .shared()
    }

    /// Remove one cached entry, or the whole cache when `key` is `None`.
    ///
    /// In-flight requests are unaffected.
    pub fn clear(&self, key: Option<&str>) {
        let mut inner = self.inner.lock();
        match key {
            Some(key) => {
                if inner.entries.pop(key).is_some() {
                    debug!(key = %key, "Cache entry cleared");
                }
            }
            None => {
                let count = inner.entries.len();
                inner.entries.clear();
                debug!(count = count, "Cache cleared");
            }
        }
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.entries.pop(key);
        }

        if !expired.is_empty() {
            debug!(count = expired.len(), "Purged expired cache entries");
        }
        expired.len()
    }

    /// Whether a fresh entry exists for `key`. Does not update LRU order.
    pub fn contains(&self, key: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .entries
            .peek(key)
            .is_some_and(|entry| entry.is_fresh(Instant::now()))
    }

    /// Get coordinator statistics.
    pub fn stats(&self) -> CoordinatorStats {
        let inner = self.inner.lock();
        CoordinatorStats {
            entries: inner.entries.len(),
            capacity: self.config.max_entries,
            in_flight: inner.in_flight.len(),
        }
    }
}

impl<V> Clone for RequestCoordinator<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
        }
    }
}

/// Removes the in-flight handle if the producer task unwinds or is cancelled
/// before settling normally.
struct InFlightGuard<V> {
    inner: Arc<Mutex<CoordinatorInner<V>>>,
    /// `None` once settled.
    key: Option<String>,
}

impl<V: Clone> InFlightGuard<V> {
    /// Release the key and cache a successful result under the same lock.
    fn settle(mut self, result: &Result<V>, ttl: std::time::Duration) {
        let Some(key) = self.key.take() else {
            return;
        };

        let mut inner = self.inner.lock();
        inner.in_flight.remove(&key);
        match result {
            Ok(data) => {
                inner.entries.put(key.clone(), CacheEntry::new(data.clone(), ttl));
                trace!(key = %key, cache_size = inner.entries.len(), "Result cached");
            }
            Err(e) => {
                debug!(key = %key, error = %e, "Request failed, not caching");
            }
        }
    }
}

impl<V> Drop for InFlightGuard<V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.inner.lock().in_flight.remove(&key);
        }
    }
}

/// Coordinator statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Number of cached entries (fresh or not yet purged).
    pub entries: usize,

    /// Maximum number of cached entries.
    pub capacity: usize,

    /// Number of requests currently in flight.
    pub in_flight: usize,
}

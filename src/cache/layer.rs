//! Cache layer that applies TTL expiry on top of a storage backend.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::storage::{CacheStorage, CachedEntry};
use super::traits::{CacheResult, Clock, SystemClock};

/// Cache layer that manages expiry and upstream fetching.
///
/// Expiry is lazy: an entry older than the TTL is treated as absent and evicted
/// the next time it is looked up. There is no background sweep.
pub struct CacheLayer<V> {
  storage: Arc<dyn CacheStorage<V>>,
  clock: Arc<dyn Clock>,
  /// How long before cached data is considered expired
  ttl: Duration,
  /// Bumped by `clear`; fetches started before a clear do not store
  generation: Arc<AtomicU64>,
}

impl<V: Clone + Send + Sync + 'static> CacheLayer<V> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: impl CacheStorage<V> + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
      clock: Arc::new(SystemClock),
      ttl: Duration::from_secs(3),
      generation: Arc::new(AtomicU64::new(0)),
    }
  }

  /// Set the time-to-live for cached data. A zero TTL disables caching.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  /// Replace the clock used for expiry checks.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  fn is_enabled(&self) -> bool {
    !self.ttl.is_zero()
  }

  fn is_expired(&self, cached_at: Instant) -> bool {
    self.clock.now().saturating_duration_since(cached_at) > self.ttl
  }

  /// Look up a fresh entry. Expired entries are evicted and reported absent.
  pub fn get(&self, key: &str) -> Option<CachedEntry<V>> {
    if !self.is_enabled() {
      return None;
    }

    let entry = match self.storage.get(key) {
      Ok(entry) => entry?,
      Err(e) => {
        warn!(key, error = %e, "cache read failed");
        return None;
      }
    };

    if self.is_expired(entry.cached_at) {
      debug!(key, "cache entry expired");
      if let Err(e) = self.storage.remove(key) {
        warn!(key, error = %e, "cache eviction failed");
      }
      return None;
    }

    Some(entry)
  }

  /// Store a value, replacing any previous entry for `key`.
  pub fn set(&self, key: &str, value: V) {
    if !self.is_enabled() {
      return;
    }

    let entry = CachedEntry {
      value,
      cached_at: self.clock.now(),
    };
    if let Err(e) = self.storage.store(key, entry) {
      warn!(key, error = %e, "cache write failed");
    }
  }

  /// Drop every entry.
  pub fn clear(&self) {
    self.generation.fetch_add(1, Ordering::SeqCst);
    if let Err(e) = self.storage.clear() {
      warn!(error = %e, "cache clear failed");
    }
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. If expired/missing, call the fetcher
  /// 3. Store whatever the fetcher produced, failures included
  ///
  /// No lock is held while the fetcher runs, so two callers racing on the same
  /// key may both reach the upstream service. A result whose fetch overlapped
  /// a `clear` is returned but not stored.
  pub async fn fetch<F, Fut>(&self, key: &str, fetcher: F) -> CacheResult<V>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = V>,
  {
    if let Some(cached) = self.get(key) {
      return CacheResult::from_cache(cached.value, cached.cached_at);
    }

    let generation = self.generation.load(Ordering::SeqCst);
    let data = fetcher().await;
    if self.generation.load(Ordering::SeqCst) == generation {
      self.set(key, data.clone());
    } else {
      debug!(key, "cache cleared during fetch, result not stored");
    }
    CacheResult::from_network(data)
  }
}

impl<V> Clone for CacheLayer<V> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      clock: Arc::clone(&self.clock),
      ttl: self.ttl,
      generation: Arc::clone(&self.generation),
    }
  }
}

//! Cache storage trait and in-memory implementation.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// A single cached value.
#[derive(Debug, Clone)]
pub struct CachedEntry<V> {
  /// The cached value
  pub value: V,
  /// When the value was captured
  pub cached_at: Instant,
}

/// Trait for cache storage backends.
///
/// Storage knows nothing about expiry; the cache layer decides what is fresh.
pub trait CacheStorage<V>: Send + Sync {
  /// Get the entry stored under `key`, fresh or not.
  fn get(&self, key: &str) -> Result<Option<CachedEntry<V>>>;

  /// Store an entry, replacing whatever was there.
  fn store(&self, key: &str, entry: CachedEntry<V>) -> Result<()>;

  /// Remove a single entry.
  fn remove(&self, key: &str) -> Result<()>;

  /// Remove every entry.
  fn clear(&self) -> Result<()>;

  /// Number of entries currently held.
  fn len(&self) -> Result<usize>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl<V> CacheStorage<V> for NoopStorage {
  fn get(&self, _key: &str) -> Result<Option<CachedEntry<V>>> {
    Ok(None) // Always miss
  }

  fn store(&self, _key: &str, _entry: CachedEntry<V>) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }

  fn len(&self) -> Result<usize> {
    Ok(0)
  }
}

/// In-memory storage behind a mutex.
///
/// With a capacity set, storing a new key into a full map evicts the oldest entry.
pub struct MemoryStorage<V> {
  entries: Mutex<HashMap<String, CachedEntry<V>>>,
  max_entries: Option<usize>,
}

impl<V> MemoryStorage<V> {
  /// Create an unbounded storage.
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      max_entries: None,
    }
  }

  /// Bound the number of entries. Zero means unbounded.
  pub fn with_capacity_limit(mut self, max_entries: usize) -> Self {
    self.max_entries = (max_entries > 0).then_some(max_entries);
    self
  }
}

impl<V> Default for MemoryStorage<V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V: Clone + Send> CacheStorage<V> for MemoryStorage<V> {
  fn get(&self, key: &str) -> Result<Option<CachedEntry<V>>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(entries.get(key).cloned())
  }

  fn store(&self, key: &str, entry: CachedEntry<V>) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if let Some(max) = self.max_entries {
      if entries.len() >= max && !entries.contains_key(key) {
        let oldest = entries
          .iter()
          .min_by_key(|(_, e)| e.cached_at)
          .map(|(k, _)| k.clone());
        if let Some(oldest) = oldest {
          entries.remove(&oldest);
        }
      }
    }

    entries.insert(key.to_string(), entry);
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .remove(key);
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .clear();
    Ok(())
  }

  fn len(&self) -> Result<usize> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.len())
  }
}

//! Cache layer that orchestrates caching logic with network fetching.

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::Store;
use super::traits::{CacheResult, TransportFailure};
use super::ttl::ResourceType;

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between a client and its remote API, providing
/// transparent caching with offline support.
#[derive(Clone)]
pub struct CacheLayer {
  store: Arc<Store>,
}

impl CacheLayer {
  /// Create a new cache layer over the given store.
  pub fn new(store: Arc<Store>) -> Self {
    Self { store }
  }

  /// The underlying store.
  pub fn store(&self) -> &Store {
    &self.store
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Fresh cache entry: return it without calling `fetcher`
  /// 2. Otherwise call `fetcher` and write the result back
  /// 3. If `fetcher` could not reach the server, serve the stale entry
  /// 4. Any other error, or no stale entry, is returned as-is
  ///
  /// Store failures never fail the read; they are logged and treated as a
  /// miss (on read) or skipped (on write).
  pub fn fetch<T, E, F>(&self, resource: ResourceType, key: &str, fetcher: F) -> Result<CacheResult<T>, E>
  where
    T: Serialize + DeserializeOwned,
    E: TransportFailure,
    F: FnOnce() -> Result<T, E>,
  {
    match self.store.get::<T>(resource, key) {
      Ok(Some(cached)) => {
        debug!(%resource, key, "Cache hit");
        return Ok(CacheResult::from_cache(cached.value, cached.cached_at));
      }
      Ok(None) => debug!(%resource, key, "Cache miss"),
      Err(e) => warn!(%resource, key, "Ignoring unreadable cache entry: {}", e),
    }

    match fetcher() {
      Ok(data) => {
        self.fill(resource, key, &data);
        Ok(CacheResult::from_network(data))
      }
      Err(err) if err.is_transport_failure() => match self.store.get_stale::<T>(resource, key) {
        Ok(Some(stale)) => {
          warn!(
            %resource,
            key,
            cached_at = %stale.cached_at,
            "Network unavailable, serving cached data"
          );
          Ok(CacheResult::offline(stale.value, stale.cached_at))
        }
        _ => Err(err),
      },
      Err(err) => Err(err),
    }
  }

  /// Write a value into the cache, logging instead of failing.
  pub fn fill<T: Serialize + ?Sized>(&self, resource: ResourceType, key: &str, value: &T) {
    if let Err(e) = self.store.set(resource, key, value) {
      warn!(%resource, key, "Failed to update cache: {}", e);
    }
  }

  /// Drop buckets after a mutation, logging instead of failing.
  pub fn invalidate(&self, resources: &[ResourceType]) {
    if let Err(e) = self.store.invalidate_type(resources) {
      warn!(?resources, "Failed to invalidate cache: {}", e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::Cell;

  #[derive(Debug, PartialEq)]
  enum FakeError {
    Offline,
    Rejected,
  }

  impl TransportFailure for FakeError {
    fn is_transport_failure(&self) -> bool {
      *self == FakeError::Offline
    }
  }

  fn layer() -> (tempfile::TempDir, CacheLayer) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("cache.json")).unwrap();
    (dir, CacheLayer::new(Arc::new(store)))
  }

  #[test]
  fn test_second_fetch_served_from_cache() {
    let (_dir, layer) = layer();
    let calls = Cell::new(0);
    let fetch = || {
      calls.set(calls.get() + 1);
      Ok::<_, FakeError>(vec![1, 2, 3])
    };

    let first = layer.fetch(ResourceType::Projects, "all", fetch).unwrap();
    let second = layer.fetch(ResourceType::Projects, "all", fetch).unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(first.source, crate::cache::CacheSource::Network);
    assert_eq!(second.source, crate::cache::CacheSource::CacheFresh);
    assert_eq!(second.data, vec![1, 2, 3]);
  }

  #[test]
  fn test_transport_failure_serves_stale() {
    let (_dir, layer) = layer();
    layer
      .fetch(ResourceType::Entries, "all", || Ok::<_, FakeError>(vec![7]))
      .unwrap();
    layer.store().backdate(ResourceType::Entries, "all", 3_600);

    let result = layer
      .fetch(ResourceType::Entries, "all", || Err::<Vec<i32>, _>(FakeError::Offline))
      .unwrap();

    assert!(result.is_stale());
    assert_eq!(result.data, vec![7]);
  }

  #[test]
  fn test_server_error_is_not_masked() {
    let (_dir, layer) = layer();
    layer
      .fetch(ResourceType::Entries, "all", || Ok::<_, FakeError>(vec![7]))
      .unwrap();
    layer.store().backdate(ResourceType::Entries, "all", 3_600);

    let err = layer
      .fetch(ResourceType::Entries, "all", || Err::<Vec<i32>, _>(FakeError::Rejected))
      .unwrap_err();

    assert_eq!(err, FakeError::Rejected);
  }

  #[test]
  fn test_transport_failure_without_cache_propagates() {
    let (_dir, layer) = layer();
    let err = layer
      .fetch(ResourceType::Tasks, "all", || Err::<Vec<i32>, _>(FakeError::Offline))
      .unwrap_err();
    assert_eq!(err, FakeError::Offline);
  }
}

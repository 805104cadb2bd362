//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};

/// Errors that can tell a server-side failure apart from a failed round trip.
///
/// Only transport failures make a read eligible for the stale fallback; an
/// error the server actually answered with is always propagated.
pub trait TransportFailure {
  /// True when the request never reached the server (connection refused,
  /// DNS failure, unreachable network, timeout).
  fn is_transport_failure(&self) -> bool;
}

/// Entities that can be resolved by name from already-cached data.
pub trait Named {
  /// Entity id.
  fn id(&self) -> u64;

  /// Display name, matched case-insensitively by substring.
  fn name(&self) -> &str;

  /// Parent id the lookup must match exactly (0 for top-level entities).
  fn parent_id(&self) -> u64 {
    0
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from fresh cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  /// True when the data was served past its TTL.
  pub fn is_stale(&self) -> bool {
    self.source == CacheSource::Offline
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still within its TTL
  CacheFresh,
  /// Network unreachable, serving cached data regardless of age
  Offline,
}

//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};

/// Conversion between a typed query result and the stored value type `V`.
///
/// The cache stores one value type for every query so it can be inspected
/// and rewritten in place; each query result type knows how to get in and
/// out of it.
pub trait Cacheable<V>: Sized + Send + 'static {
  fn into_cached(self) -> V;

  /// Returns None if the stored value holds a different type.
  fn from_cached(value: &V) -> Option<Self>;
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

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
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
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache past its freshness window, refresh running in background
  CacheStale,
  /// Network unavailable, serving the last value fetched before the failure
  Offline,
}

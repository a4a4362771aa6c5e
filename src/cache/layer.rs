//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

use super::entry::{Entry, EntryState, SharedFetch};
use super::key::{QueryKey, QueryKind};
use super::retry::RetryPolicy;
use super::traits::{CacheResult, Cacheable};
use crate::api::error::{ApiError, ErrorKind};

/// How a read treats a value past its freshness window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadMode {
  /// Serve the stale value now and refresh it in the background
  #[default]
  StaleWhileRevalidate,
  /// Wait for a refetch
  Strict,
}

/// A mutable view of one cached value, handed out by [`QueryCache::with_values`].
pub struct Slot<'a, K, V> {
  pub key: &'a QueryKey<K>,
  pub value: &'a mut V,
  pub version: u64,
}

/// One local rewrite of an entry, recorded so [`QueryCache::undo`] can
/// reverse exactly that change and nothing else.
#[derive(Debug, Clone)]
pub struct Rewrite<K, C> {
  pub key: QueryKey<K>,
  /// Server version of the entry when it was rewritten
  pub version: u64,
  pub change: C,
}

struct CacheInner<K, V> {
  entries: HashMap<QueryKey<K>, Entry<V>>,
  /// Bumped by `clear`; fetches from an older epoch are discarded
  epoch: u64,
}

/// In-memory query cache keyed by (kind, params).
///
/// Reads are served from cache inside the kind's freshness window, concurrent
/// reads of one key share a single in-flight fetch, and failed fetches are
/// retried according to the layer's [`RetryPolicy`]. The store lock is never
/// held across an await point.
pub struct QueryCache<K: QueryKind, V> {
  inner: Arc<Mutex<CacheInner<K, V>>>,
  retry: RetryPolicy,
}

enum Plan<V> {
  Serve {
    value: V,
    cached_at: DateTime<Utc>,
    stale: bool,
  },
  Await {
    handle: SharedFetch<V>,
    previous: Option<(V, DateTime<Utc>)>,
  },
}

impl<K, V> QueryCache<K, V>
where
  K: QueryKind,
  V: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Mutex::new(CacheInner {
        entries: HashMap::new(),
        epoch: 0,
      })),
      retry: RetryPolicy::queries(),
    }
  }

  /// Set the retry policy used for fetches.
  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  fn lock(&self) -> MutexGuard<'_, CacheInner<K, V>> {
    // Every critical section leaves the map consistent, so a panic in one
    // does not invalidate the data.
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Read through the cache.
  ///
  /// 1. Fresh value: returned without a network call
  /// 2. Time-stale value in `StaleWhileRevalidate` mode: returned, and a
  ///    background refresh is started
  /// 3. Fetch already in flight: the caller attaches to it
  /// 4. Otherwise (empty, errored, invalidated, strict): fetch and wait
  ///
  /// A transport failure in `StaleWhileRevalidate` mode falls back to the
  /// previous value (offline mode).
  pub async fn fetch<T, F, Fut>(
    &self,
    key: QueryKey<K>,
    mode: ReadMode,
    fetcher: F,
  ) -> Result<CacheResult<T>, ApiError>
  where
    T: Cacheable<V>,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let plan = {
      let mut inner = self.lock();
      let epoch = inner.epoch;
      let entry = inner
        .entries
        .entry(key.clone())
        .or_insert_with(|| Entry::new(key.kind.stale_time()));
      let previous = entry.value.clone().zip(entry.cached_at);
      let servable = mode == ReadMode::StaleWhileRevalidate && !entry.invalidated;

      match (entry.state(Instant::now()), previous) {
        (EntryState::Fresh, Some((value, cached_at))) => {
          tracing::debug!(key = %key.description(), "cache hit");
          Plan::Serve {
            value,
            cached_at,
            stale: false,
          }
        }
        (EntryState::Stale, Some((value, cached_at))) if servable => {
          tracing::debug!(key = %key.description(), "serving stale, refreshing");
          self.start_fetch(epoch, &key, entry, fetcher);
          Plan::Serve {
            value,
            cached_at,
            stale: true,
          }
        }
        (EntryState::Fetching, Some((value, cached_at))) if servable => Plan::Serve {
          value,
          cached_at,
          stale: true,
        },
        (EntryState::Fetching, previous) => {
          tracing::debug!(key = %key.description(), "joining in-flight fetch");
          match entry.in_flight.clone() {
            Some(handle) => Plan::Await { handle, previous },
            None => Plan::Await {
              handle: self.start_fetch(epoch, &key, entry, fetcher),
              previous,
            },
          }
        }
        (_, previous) => {
          tracing::debug!(key = %key.description(), "cache miss");
          Plan::Await {
            handle: self.start_fetch(epoch, &key, entry, fetcher),
            previous,
          }
        }
      }
    };

    match plan {
      Plan::Serve {
        value,
        cached_at,
        stale,
      } => T::from_cached(&value)
        .map(|data| CacheResult::from_cache(data, cached_at, stale))
        .ok_or_else(|| type_mismatch(&key)),
      Plan::Await { handle, previous } => match handle.await {
        Ok(value) => T::from_cached(&value)
          .map(CacheResult::from_network)
          .ok_or_else(|| type_mismatch(&key)),
        Err(err) => {
          if mode == ReadMode::StaleWhileRevalidate && err.kind == ErrorKind::Transport {
            if let Some(data) = previous
              .as_ref()
              .and_then(|(value, cached_at)| T::from_cached(value).map(|d| (d, *cached_at)))
            {
              tracing::warn!(key = %key.description(), error = %err, "offline, serving cached value");
              return Ok(CacheResult::offline(data.0, data.1));
            }
          }
          Err(err)
        }
      },
    }
  }

  /// Spawn the fetch for `key` and register it as the entry's in-flight
  /// handle. The task runs to completion and writes the cache even if every
  /// reader stops waiting for it.
  fn start_fetch<T, F, Fut>(
    &self,
    epoch: u64,
    key: &QueryKey<K>,
    entry: &mut Entry<V>,
    fetcher: F,
  ) -> SharedFetch<V>
  where
    T: Cacheable<V>,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let cache = self.clone();
    let task_key = key.clone();
    let retry = self.retry;

    let task = tokio::spawn(async move {
      let context = task_key.description();
      let result = retry.run(&context, &fetcher).await.map(T::into_cached);
      cache.settle(&task_key, epoch, &result);
      result
    });

    let handle = async move {
      task
        .await
        .unwrap_or_else(|e| Err(ApiError::unknown(format!("fetch task failed: {e}"))))
    }
    .boxed()
    .shared();

    entry.begin_fetch(handle.clone());
    handle
  }

  fn settle(&self, key: &QueryKey<K>, epoch: u64, result: &Result<V, ApiError>) {
    let mut inner = self.lock();
    if inner.epoch != epoch {
      tracing::debug!(key = %key.description(), "discarding result fetched before clear");
      return;
    }
    if let Some(entry) = inner.entries.get_mut(key) {
      entry.settle(result);
    }
  }

  /// Current lifecycle state of `key`.
  pub fn state(&self, key: &QueryKey<K>) -> EntryState {
    let inner = self.lock();
    inner
      .entries
      .get(key)
      .map(|entry| entry.state(Instant::now()))
      .unwrap_or(EntryState::Empty)
  }

  /// Last known value of `key`, regardless of freshness or error state.
  pub fn peek<T: Cacheable<V>>(&self, key: &QueryKey<K>) -> Option<T> {
    let inner = self.lock();
    inner
      .entries
      .get(key)
      .and_then(|entry| entry.value.as_ref())
      .and_then(T::from_cached)
  }

  /// Write a value for `key` as if it had just been fetched.
  pub fn set<T: Cacheable<V>>(&self, key: QueryKey<K>, data: T) {
    let mut inner = self.lock();
    let stale_time = key.kind.stale_time();
    let entry = inner
      .entries
      .entry(key)
      .or_insert_with(|| Entry::new(stale_time));
    entry.value = Some(data.into_cached());
    entry.fetched_at = Some(Instant::now());
    entry.cached_at = Some(Utc::now());
    entry.error = None;
    entry.invalidated = false;
    entry.version += 1;
  }

  /// Mark `key` stale so the next read refetches it.
  pub fn invalidate(&self, key: &QueryKey<K>) {
    let mut inner = self.lock();
    if let Some(entry) = inner.entries.get_mut(key) {
      entry.invalidate();
    }
  }

  /// Mark every entry of `resource` stale. Returns how many were marked.
  pub fn invalidate_resource(&self, resource: &str) -> usize {
    let mut inner = self.lock();
    let mut count = 0;
    for (key, entry) in inner.entries.iter_mut() {
      if key.resource() == resource {
        entry.invalidate();
        count += 1;
      }
    }
    tracing::debug!(resource, count, "invalidated");
    count
  }

  /// Drop every entry. Fetches still in flight will not write back.
  pub fn clear(&self) {
    let mut inner = self.lock();
    inner.entries.clear();
    inner.epoch += 1;
    tracing::debug!(epoch = inner.epoch, "cache cleared");
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Run `f` over every stored value while holding the store lock, so a
  /// group of rewrites is applied atomically. `f` also receives the current
  /// epoch, for pairing with [`QueryCache::undo`].
  pub fn with_values<R>(&self, f: impl FnOnce(u64, Vec<Slot<'_, K, V>>) -> R) -> R {
    let mut inner = self.lock();
    let inner = &mut *inner;
    let slots = inner
      .entries
      .iter_mut()
      .filter_map(|(key, entry)| {
        let version = entry.version;
        entry.value.as_mut().map(|value| Slot {
          key,
          value,
          version,
        })
      })
      .collect();
    f(inner.epoch, slots)
  }

  /// Reverse local rewrites with `revert`, skipping entries that were
  /// cleared or have received a server response since. Other rewrites made
  /// to the same entries in the meantime are left in place. Returns how many
  /// entries were reverted.
  pub fn undo<C>(
    &self,
    epoch: u64,
    rewrites: Vec<Rewrite<K, C>>,
    mut revert: impl FnMut(&mut V, C),
  ) -> usize {
    let mut inner = self.lock();
    if inner.epoch != epoch {
      return 0;
    }
    let mut reverted = 0;
    for rewrite in rewrites {
      let Some(entry) = inner.entries.get_mut(&rewrite.key) else {
        continue;
      };
      if entry.version != rewrite.version {
        continue;
      }
      if let Some(value) = entry.value.as_mut() {
        revert(value, rewrite.change);
        reverted += 1;
      }
    }
    reverted
  }
}

impl<K, V> Default for QueryCache<K, V>
where
  K: QueryKind,
  V: Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<K: QueryKind, V> Clone for QueryCache<K, V> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
      retry: self.retry,
    }
  }
}

fn type_mismatch<K: QueryKind>(key: &QueryKey<K>) -> ApiError {
  ApiError::unknown(format!(
    "cached value for {} has an unexpected type",
    key.description()
  ))
}

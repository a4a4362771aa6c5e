//! Per-key cache entry and its lifecycle state.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use std::time::Duration;
use tokio::time::Instant;

use crate::api::error::ApiError;

/// Handle every reader of a key awaits while its fetch is in flight.
pub type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, ApiError>>>;

/// Lifecycle of an entry: `Empty → Fetching → Fresh → Stale → Fetching → Fresh | Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
  Empty,
  Fetching,
  Fresh,
  Stale,
  Error,
}

pub struct Entry<V> {
  pub value: Option<V>,
  pub fetched_at: Option<Instant>,
  pub cached_at: Option<DateTime<Utc>>,
  pub stale_time: Duration,
  /// The held value is known to be outdated and must not be served
  pub invalidated: bool,
  /// Invalidated while the current fetch was in flight
  pub invalidated_in_flight: bool,
  pub in_flight: Option<SharedFetch<V>>,
  pub error: Option<ApiError>,
  /// Bumped on every value written from a server response
  pub version: u64,
}

impl<V: Clone> Entry<V> {
  pub fn new(stale_time: Duration) -> Self {
    Self {
      value: None,
      fetched_at: None,
      cached_at: None,
      stale_time,
      invalidated: false,
      invalidated_in_flight: false,
      in_flight: None,
      error: None,
      version: 0,
    }
  }

  pub fn state(&self, now: Instant) -> EntryState {
    if self.in_flight.is_some() {
      EntryState::Fetching
    } else if self.error.is_some() {
      EntryState::Error
    } else if self.value.is_none() {
      EntryState::Empty
    } else if self.is_stale(now) {
      EntryState::Stale
    } else {
      EntryState::Fresh
    }
  }

  pub fn is_stale(&self, now: Instant) -> bool {
    if self.invalidated {
      return true;
    }
    match self.fetched_at {
      Some(at) => now.duration_since(at) >= self.stale_time,
      None => true,
    }
  }

  pub fn invalidate(&mut self) {
    self.invalidated = true;
    if self.in_flight.is_some() {
      self.invalidated_in_flight = true;
    }
  }

  pub fn begin_fetch(&mut self, handle: SharedFetch<V>) {
    self.in_flight = Some(handle);
    self.invalidated_in_flight = false;
  }

  /// Record a server response.
  pub fn settle(&mut self, result: &Result<V, ApiError>) {
    self.in_flight = None;
    match result {
      Ok(value) => {
        self.value = Some(value.clone());
        self.fetched_at = Some(Instant::now());
        self.cached_at = Some(Utc::now());
        self.error = None;
        self.invalidated = self.invalidated_in_flight;
        self.version += 1;
      }
      Err(err) => {
        self.error = Some(err.clone());
      }
    }
    self.invalidated_in_flight = false;
  }
}

//! Generic query cache used between callers and the gateway services.
//!
//! This module provides a resource-agnostic caching mechanism that:
//! - Keys results by (kind, normalized params)
//! - Serves values inside a per-kind freshness window
//! - Shares one in-flight fetch between concurrent readers of a key
//! - Retries failed fetches with backoff, never retrying client errors
//! - Supports invalidation, clearing and atomic in-place rewrites for
//!   optimistic updates

mod entry;
mod key;
mod layer;
mod retry;
mod traits;

pub use entry::EntryState;
pub use key::{Params, QueryKey, QueryKind};
pub use layer::{QueryCache, ReadMode, Rewrite, Slot};
pub use retry::{Backoff, RetryPolicy};
pub use traits::{CacheResult, CacheSource, Cacheable};

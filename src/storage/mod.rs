//! Client-side persisted key/value storage.
//!
//! Holds the session blob, the local moderation record and the last fetched
//! review list. Two backends: SQLite for real use and an in-memory map for
//! tests and ephemeral runs.

mod archive;
mod moderation;
mod sqlite;

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

pub use archive::{ArchivedReviews, ReviewArchive};
pub use moderation::{ApprovalRecord, LocalStatus, ModerationLog};
pub use sqlite::SqliteStore;

/// Trait for persisted storage backends.
pub trait LocalStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;

  fn set(&self, key: &str, value: &str) -> Result<()>;

  fn remove(&self, key: &str) -> Result<()>;
}

/// Storage that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStore {
  values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl LocalStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(values.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut values = self
      .values
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    values.remove(key);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_memory_store() {
    let store = MemoryStore::new();
    assert_eq!(store.get("k").unwrap(), None);
    store.set("k", "v").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    store.remove("k").unwrap();
    assert_eq!(store.get("k").unwrap(), None);
  }
}

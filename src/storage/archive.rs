//! Last review list fetched from the gateway, kept for reading offline.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::LocalStore;
use crate::api::types::Review;

const REVIEWS_KEY: &str = "cached_reviews";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedReviews {
  pub reviews: Vec<Review>,
  pub last_updated: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ReviewArchive {
  store: Arc<dyn LocalStore>,
}

impl ReviewArchive {
  pub fn new(store: Arc<dyn LocalStore>) -> Self {
    Self { store }
  }

  /// Replace the archive with `reviews`.
  pub fn save(&self, reviews: &[Review]) -> Result<()> {
    let archived = ArchivedReviews {
      reviews: reviews.to_vec(),
      last_updated: Utc::now(),
    };
    let data = serde_json::to_string(&archived)
      .map_err(|e| eyre!("Failed to serialize review archive: {}", e))?;
    self.store.set(REVIEWS_KEY, &data)
  }

  pub fn load(&self) -> Result<Option<ArchivedReviews>> {
    match self.store.get(REVIEWS_KEY)? {
      Some(data) => serde_json::from_str(&data)
        .map(Some)
        .map_err(|e| eyre!("Failed to parse review archive: {}", e)),
      None => Ok(None),
    }
  }

  /// Archived reviews; empty when nothing was saved or the archive is
  /// unreadable.
  pub fn reviews(&self) -> Vec<Review> {
    match self.load() {
      Ok(archived) => archived.map(|a| a.reviews).unwrap_or_default(),
      Err(e) => {
        tracing::warn!(error = %e, "could not read review archive");
        Vec::new()
      }
    }
  }

  pub fn clear(&self) -> Result<()> {
    self.store.remove(REVIEWS_KEY)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::fixtures::review;
  use crate::api::types::ReviewStatus;
  use crate::storage::MemoryStore;

  #[test]
  fn test_save_replaces_previous_list() {
    let archive = ReviewArchive::new(Arc::new(MemoryStore::new()));
    assert!(archive.reviews().is_empty());

    archive.save(&[review(1, "p1", ReviewStatus::Pending)]).unwrap();
    archive
      .save(&[
        review(2, "p1", ReviewStatus::Published),
        review(3, "p2", ReviewStatus::Pending),
      ])
      .unwrap();

    let ids: Vec<u64> = archive.reviews().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 3]);

    archive.clear().unwrap();
    assert!(archive.load().unwrap().is_none());
  }

  #[test]
  fn test_stored_format_and_unreadable_archive() {
    let store = Arc::new(MemoryStore::new());
    let archive = ReviewArchive::new(store.clone());
    archive.save(&[review(42, "p1", ReviewStatus::Pending)]).unwrap();

    let raw: serde_json::Value =
      serde_json::from_str(&store.get(REVIEWS_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(raw["reviews"][0]["id"], 42);
    assert!(raw["lastUpdated"].is_string());

    store.set(REVIEWS_KEY, "not json").unwrap();
    assert!(archive.load().is_err());
    assert!(archive.reviews().is_empty());
  }
}

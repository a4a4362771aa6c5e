//! Local record of moderation decisions, kept independently of the server.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::LocalStore;

const APPROVAL_KEY: &str = "review_approvals";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalStatus {
  Approved,
  Rejected,
  #[default]
  Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
  pub id: u64,
  pub status: LocalStatus,
  pub last_updated: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ModerationLog {
  store: Arc<dyn LocalStore>,
}

impl ModerationLog {
  pub fn new(store: Arc<dyn LocalStore>) -> Self {
    Self { store }
  }

  pub fn records(&self) -> Result<Vec<ApprovalRecord>> {
    match self.store.get(APPROVAL_KEY)? {
      Some(data) => serde_json::from_str(&data)
        .map_err(|e| eyre!("Failed to parse moderation record: {}", e)),
      None => Ok(Vec::new()),
    }
  }

  fn save(&self, records: &[ApprovalRecord]) -> Result<()> {
    let data = serde_json::to_string(records)
      .map_err(|e| eyre!("Failed to serialize moderation record: {}", e))?;
    self.store.set(APPROVAL_KEY, &data)
  }

  /// Local status of a review; pending when nothing was recorded.
  pub fn status_of(&self, review_id: u64) -> LocalStatus {
    match self.records() {
      Ok(records) => records
        .iter()
        .find(|r| r.id == review_id)
        .map(|r| r.status)
        .unwrap_or_default(),
      Err(e) => {
        tracing::warn!(review_id, error = %e, "could not read moderation record");
        LocalStatus::Pending
      }
    }
  }

  /// Insert or replace the record for `review_id`.
  pub fn record(&self, review_id: u64, status: LocalStatus) -> Result<()> {
    let mut records = self.records()?;
    let record = ApprovalRecord {
      id: review_id,
      status,
      last_updated: Utc::now(),
    };
    match records.iter_mut().find(|r| r.id == review_id) {
      Some(existing) => *existing = record,
      None => records.push(record),
    }
    self.save(&records)
  }

  pub fn forget(&self, review_id: u64) -> Result<()> {
    let mut records = self.records()?;
    records.retain(|r| r.id != review_id);
    self.save(&records)
  }

  pub fn approved_ids(&self) -> Result<Vec<u64>> {
    Ok(
      self
        .records()?
        .into_iter()
        .filter(|r| r.status == LocalStatus::Approved)
        .map(|r| r.id)
        .collect(),
    )
  }

  pub fn clear(&self) -> Result<()> {
    self.store.remove(APPROVAL_KEY)
  }
}

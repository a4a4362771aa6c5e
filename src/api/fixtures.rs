//! Sample gateway data for tests.

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::types::{Channel, Manager, Review, ReviewStatus, ReviewType, Role};

pub fn review(id: u64, property_id: &str, status: ReviewStatus) -> Review {
  Review {
    id,
    review_type: ReviewType::GuestToHost,
    status,
    overall_rating: 9.0,
    public_review: format!("Review number {}", id),
    categories: BTreeMap::from([("cleanliness".to_string(), 10)]),
    submitted_at: Utc.with_ymd_and_hms(2024, 8, 21, 22, 45, 14).unwrap(),
    guest_name: format!("Guest {}", id),
    listing_name: format!("Listing {}", property_id),
    channel: Channel::Hostaway,
    is_approved: status == ReviewStatus::Published,
    property_id: property_id.to_string(),
  }
}

pub fn review_json(id: u64, property_id: &str, status: ReviewStatus) -> Value {
  serde_json::to_value(review(id, property_id, status)).unwrap()
}

pub fn admin() -> Manager {
  Manager {
    id: "m1".to_string(),
    email: "admin@flexliving.com".to_string(),
    name: "Admin".to_string(),
    role: Role::Admin,
    created_at: None,
  }
}

/// Wrap `data` in a successful envelope.
pub fn ok(data: Value) -> Value {
  json!({ "success": true, "data": data })
}

pub fn stats_json(recent: Vec<Value>) -> Value {
  json!({
    "totalReviews": 10,
    "averageRating": 8.7,
    "approvedReviews": 6,
    "pendingReviews": 4,
    "propertiesCount": 3,
    "recentReviews": recent,
    "topPerformingProperties": [],
    "ratingDistribution": {"9": 4, "10": 6}
  })
}

//! Domain types exchanged with the review gateway (camelCase on the wire).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Moderation state of a review
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
  Published,
  #[default]
  Pending,
  Rejected,
}

impl ReviewStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      ReviewStatus::Published => "published",
      ReviewStatus::Pending => "pending",
      ReviewStatus::Rejected => "rejected",
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
  #[default]
  Hostaway,
  Google,
  Airbnb,
  Booking,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewType {
  HostToGuest,
  #[default]
  GuestToHost,
}

/// A guest review as normalized by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
  pub id: u64,
  #[serde(rename = "type", default)]
  pub review_type: ReviewType,
  pub status: ReviewStatus,
  #[serde(default)]
  pub overall_rating: f64,
  #[serde(default)]
  pub public_review: String,
  /// Category name to 0-10 rating
  #[serde(default)]
  pub categories: BTreeMap<String, u8>,
  pub submitted_at: DateTime<Utc>,
  #[serde(default)]
  pub guest_name: String,
  #[serde(default)]
  pub listing_name: String,
  #[serde(default)]
  pub channel: Channel,
  #[serde(default)]
  pub is_approved: bool,
  #[serde(default)]
  pub property_id: String,
}

impl Review {
  /// Set the moderation status, keeping `is_approved` consistent with it.
  pub fn set_status(&mut self, status: ReviewStatus) {
    self.status = status;
    self.is_approved = status == ReviewStatus::Published;
  }

  pub fn with_status(mut self, status: ReviewStatus) -> Self {
    self.set_status(status);
    self
  }

  pub fn is_consistent(&self) -> bool {
    self.is_approved == (self.status == ReviewStatus::Published)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
  pub per_night: f64,
  pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub address: String,
  #[serde(default)]
  pub city: String,
  #[serde(default)]
  pub country: String,
  #[serde(default)]
  pub images: Vec<String>,
  pub description: Option<String>,
  pub house_rules: Option<Vec<String>>,
  pub price: Option<Price>,
  #[serde(default)]
  pub average_rating: f64,
  #[serde(default)]
  pub total_reviews: u64,
  #[serde(default)]
  pub approved_reviews: u64,
}

/// Per-property figures derived from the property list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyStats {
  pub property_id: String,
  pub total_reviews: u64,
  pub average_rating: f64,
  pub approved_reviews: u64,
  pub pending_reviews: u64,
}

impl From<&Property> for PropertyStats {
  fn from(property: &Property) -> Self {
    Self {
      property_id: property.id.clone(),
      total_reviews: property.total_reviews,
      average_rating: property.average_rating,
      approved_reviews: property.approved_reviews,
      pending_reviews: property
        .total_reviews
        .saturating_sub(property.approved_reviews),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Admin,
  #[default]
  Manager,
}

/// The authenticated principal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manager {
  pub id: String,
  pub email: String,
  pub name: String,
  #[serde(default)]
  pub role: Role,
  pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
  #[serde(default)]
  pub total_reviews: u64,
  #[serde(default)]
  pub average_rating: f64,
  #[serde(default)]
  pub approved_reviews: u64,
  #[serde(default)]
  pub pending_reviews: u64,
  #[serde(default)]
  pub properties_count: u64,
  #[serde(default)]
  pub recent_reviews: Vec<Review>,
  #[serde(default)]
  pub top_performing_properties: Vec<Property>,
  /// Rating value to number of reviews
  #[serde(default)]
  pub rating_distribution: BTreeMap<u32, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
  pub total: u64,
  pub page: u64,
  pub limit: u64,
  pub total_pages: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
  pub data: Vec<T>,
  pub meta: PageMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  Asc,
  Desc,
}

/// Filters and paging accepted by the review listing endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueryParams {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub property_id: Option<String>,
  /// Rating floor
  #[serde(skip_serializing_if = "Option::is_none")]
  pub rating: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub channel: Option<Channel>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<ReviewStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_approved: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date_from: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date_to: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub page: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub limit: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sort: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub order: Option<SortOrder>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyQueryParams {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub city: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub country: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub min_rating: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_rating: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
}

// Google Places passes through the gateway with its own snake_case names.

/// Location used when a property review search names none
pub const DEFAULT_GOOGLE_LOCATION: &str = "London, UK";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GooglePlaceSearchParams {
  pub query: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
  /// Metres around `location`
  #[serde(skip_serializing_if = "Option::is_none")]
  pub radius: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
  pub lat: f64,
  pub lng: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
  pub location: LatLng,
}

/// A review as Google returns it, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleReview {
  pub author_name: String,
  pub author_url: Option<String>,
  pub profile_photo_url: Option<String>,
  #[serde(default)]
  pub rating: f64,
  #[serde(default)]
  pub relative_time_description: String,
  #[serde(default)]
  pub text: String,
  /// Unix seconds
  #[serde(default)]
  pub time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GooglePlace {
  pub place_id: String,
  pub name: String,
  #[serde(default)]
  pub rating: f64,
  #[serde(default)]
  pub user_ratings_total: u64,
  #[serde(default)]
  pub reviews: Vec<GoogleReview>,
  #[serde(default)]
  pub formatted_address: String,
  #[serde(default)]
  pub geometry: Geometry,
}

/// One item of a bulk moderation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewApproval {
  pub review_id: u64,
  pub approved: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkUpdateResult {
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub processed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
  pub token: String,
  pub user: Manager,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
  pub token: String,
}

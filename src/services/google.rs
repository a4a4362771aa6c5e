//! Google Places lookups proxied by the gateway.

use crate::api::client::ApiClient;
use crate::api::envelope::ApiResponse;
use crate::api::error::ApiError;
use crate::api::types::{GooglePlace, GooglePlaceSearchParams, Review, DEFAULT_GOOGLE_LOCATION};
use crate::cache::Params;

#[derive(Clone)]
pub struct GoogleReviewsService {
  client: ApiClient,
}

impl GoogleReviewsService {
  pub fn new(client: ApiClient) -> Self {
    Self { client }
  }

  pub async fn search_places(
    &self,
    params: &GooglePlaceSearchParams,
  ) -> Result<ApiResponse<Vec<GooglePlace>>, ApiError> {
    self
      .client
      .get("/google/places/search", &Params::from_serialize(params))
      .await
  }

  pub async fn place_details(&self, place_id: &str) -> Result<ApiResponse<GooglePlace>, ApiError> {
    self
      .client
      .get(&format!("/google/places/{}", place_id), &Params::new())
      .await
  }

  /// Reviews of a place, normalized to the gateway's review shape
  pub async fn place_reviews(&self, place_id: &str) -> Result<ApiResponse<Vec<Review>>, ApiError> {
    self
      .client
      .get(&format!("/google/places/{}/reviews", place_id), &Params::new())
      .await
  }

  /// Google reviews of a property found by name near `location`
  /// (London, UK when not given).
  pub async fn search_by_property(
    &self,
    property_name: &str,
    location: Option<&str>,
  ) -> Result<ApiResponse<Vec<Review>>, ApiError> {
    let params = Params::new()
      .with("propertyName", property_name)
      .with("location", location.unwrap_or(DEFAULT_GOOGLE_LOCATION));
    self.client.get("/google/reviews/search", &params).await
  }
}

/// Refuse a lookup whose required input is blank, before any call is made.
pub fn require(field: &str, value: &str) -> Result<(), ApiError> {
  if value.trim().is_empty() {
    return Err(ApiError::validation(
      "MISSING_PARAMETER",
      format!("{} must not be empty", field),
    ));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::MockTransport;
  use crate::storage::MemoryStore;
  use reqwest::Method;
  use serde_json::json;
  use std::sync::Arc;

  fn service(transport: &Arc<MockTransport>) -> GoogleReviewsService {
    GoogleReviewsService::new(ApiClient::new(transport.clone(), Arc::new(MemoryStore::new())))
  }

  #[tokio::test]
  async fn test_property_search_defaults_location() {
    let transport = Arc::new(MockTransport::new());
    transport.on(
      Method::GET,
      "/google/reviews/search",
      Ok(json!({"success": true, "data": []})),
    );

    let svc = service(&transport);
    svc.search_by_property("Shoreditch Loft", None).await.unwrap();
    svc
      .search_by_property("Marais Studio", Some("Paris, FR"))
      .await
      .unwrap();

    let requests = transport.requests();
    assert_eq!(
      requests[0].query,
      vec![
        ("location".to_string(), "London, UK".to_string()),
        ("propertyName".to_string(), "Shoreditch Loft".to_string())
      ]
    );
    assert!(requests[1]
      .query
      .contains(&("location".to_string(), "Paris, FR".to_string())));
  }

  #[tokio::test]
  async fn test_place_paths() {
    let transport = Arc::new(MockTransport::new());
    transport.on(
      Method::GET,
      "/google/places/ChIJ1/reviews",
      Ok(json!({"success": true})),
    );

    let reviews = service(&transport)
      .place_reviews("ChIJ1")
      .await
      .unwrap()
      .into_data_or_default()
      .unwrap();
    assert!(reviews.is_empty());
    assert_eq!(transport.requests()[0].path, "/google/places/ChIJ1/reviews");
  }

  #[test]
  fn test_require_rejects_blank_input() {
    assert!(require("query", "loft").is_ok());
    let err = require("placeId", "  ").unwrap_err();
    assert_eq!(err.code, "MISSING_PARAMETER");
    assert!(!err.is_retryable());
  }
}

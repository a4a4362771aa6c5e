//! Property endpoints and figures derived from the property list.

use crate::api::client::ApiClient;
use crate::api::envelope::ApiResponse;
use crate::api::error::ApiError;
use crate::api::types::{Property, PropertyQueryParams, PropertyStats};
use crate::cache::Params;

#[derive(Clone)]
pub struct PropertiesService {
  client: ApiClient,
}

impl PropertiesService {
  pub fn new(client: ApiClient) -> Self {
    Self { client }
  }

  pub async fn list(
    &self,
    params: &PropertyQueryParams,
  ) -> Result<ApiResponse<Vec<Property>>, ApiError> {
    self
      .client
      .get("/reviews/properties", &Params::from_serialize(params))
      .await
  }
}

/// Find one property in a list result.
pub fn find(properties: &[Property], property_id: &str) -> Result<Property, ApiError> {
  properties
    .iter()
    .find(|p| p.id == property_id)
    .cloned()
    .ok_or_else(|| {
      ApiError::validation(
        "PROPERTY_NOT_FOUND",
        format!("Property with ID {} not found", property_id),
      )
    })
}

/// Review figures for one property, derived from a list result.
pub fn stats_for(properties: &[Property], property_id: &str) -> Result<PropertyStats, ApiError> {
  find(properties, property_id).map(|p| PropertyStats::from(&p))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::MockTransport;
  use crate::storage::MemoryStore;
  use reqwest::Method;
  use serde_json::json;
  use std::sync::Arc;

  fn properties() -> Vec<Property> {
    serde_json::from_value(json!([
      {"id": "p1", "name": "Shoreditch Loft", "city": "London", "averageRating": 4.8,
       "totalReviews": 12, "approvedReviews": 9},
      {"id": "p2", "name": "Marais Studio", "city": "Paris", "averageRating": 4.1,
       "totalReviews": 3, "approvedReviews": 3}
    ]))
    .unwrap()
  }

  #[test]
  fn test_find() {
    assert_eq!(find(&properties(), "p2").unwrap().name, "Marais Studio");
    let err = find(&properties(), "p3").unwrap_err();
    assert_eq!(err.message, "Property with ID p3 not found");
  }

  #[test]
  fn test_stats_for() {
    let stats = stats_for(&properties(), "p1").unwrap();
    assert_eq!(stats.total_reviews, 12);
    assert_eq!(stats.pending_reviews, 3);
    assert_eq!(stats.average_rating, 4.8);
  }

  #[tokio::test]
  async fn test_list_sends_filters() {
    let transport = Arc::new(MockTransport::new());
    transport.on(
      Method::GET,
      "/reviews/properties",
      Ok(json!({"success": true, "data": []})),
    );
    let service = PropertiesService::new(ApiClient::new(
      transport.clone(),
      Arc::new(MemoryStore::new()),
    ));

    let params = PropertyQueryParams {
      city: Some("London".to_string()),
      min_rating: Some(4.5),
      ..Default::default()
    };
    service.list(&params).await.unwrap();

    assert_eq!(
      transport.requests()[0].query,
      vec![
        ("city".to_string(), "London".to_string()),
        ("minRating".to_string(), "4.5".to_string())
      ]
    );
  }
}

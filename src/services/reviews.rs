//! Review endpoints.

use serde_json::{json, Value};

use crate::api::client::ApiClient;
use crate::api::envelope::{Acknowledgement, ApiResponse};
use crate::api::error::ApiError;
use crate::api::types::{
  BulkUpdateResult, DashboardStats, Paginated, Review, ReviewApproval, ReviewQueryParams,
};
use crate::cache::Params;

#[derive(Clone)]
pub struct ReviewsService {
  client: ApiClient,
}

impl ReviewsService {
  pub fn new(client: ApiClient) -> Self {
    Self { client }
  }

  /// Get reviews with optional filtering
  pub async fn list(&self, params: &ReviewQueryParams) -> Result<ApiResponse<Vec<Review>>, ApiError> {
    self
      .client
      .get("/reviews", &Params::from_serialize(params))
      .await
  }

  /// Get one page of reviews
  pub async fn list_paginated(
    &self,
    params: &ReviewQueryParams,
  ) -> Result<ApiResponse<Paginated<Review>>, ApiError> {
    self
      .client
      .get("/reviews/paginated", &Params::from_serialize(params))
      .await
  }

  /// Get approved reviews, optionally for one property
  pub async fn list_approved(
    &self,
    property_id: Option<&str>,
  ) -> Result<ApiResponse<Vec<Review>>, ApiError> {
    let params = match property_id {
      Some(id) => Params::new().with("propertyId", id),
      None => Params::new(),
    };
    self.client.get("/reviews/approved", &params).await
  }

  pub async fn list_pending(&self) -> Result<ApiResponse<Vec<Review>>, ApiError> {
    self.client.get("/reviews/pending", &Params::new()).await
  }

  pub async fn get(&self, review_id: u64) -> Result<ApiResponse<Review>, ApiError> {
    self
      .client
      .get(&format!("/reviews/{}", review_id), &Params::new())
      .await
  }

  /// Get reviews for a property. A `property_id` inside `params` is ignored.
  pub async fn list_for_property(
    &self,
    property_id: &str,
    params: &ReviewQueryParams,
  ) -> Result<ApiResponse<Vec<Review>>, ApiError> {
    let params = ReviewQueryParams {
      property_id: None,
      ..params.clone()
    };
    self
      .client
      .get(
        &format!("/reviews/property/{}", property_id),
        &Params::from_serialize(&params),
      )
      .await
  }

  pub async fn approve(
    &self,
    review_id: u64,
    reason: Option<&str>,
  ) -> Result<ApiResponse<Acknowledgement>, ApiError> {
    self
      .client
      .patch(
        &format!("/reviews/{}/approve", review_id),
        Some(reason_body(reason)),
      )
      .await
  }

  pub async fn reject(
    &self,
    review_id: u64,
    reason: Option<&str>,
  ) -> Result<ApiResponse<Acknowledgement>, ApiError> {
    self
      .client
      .patch(
        &format!("/reviews/{}/reject", review_id),
        Some(reason_body(reason)),
      )
      .await
  }

  /// Approve or reject several reviews in one call
  pub async fn bulk_update(
    &self,
    updates: &[ReviewApproval],
  ) -> Result<ApiResponse<BulkUpdateResult>, ApiError> {
    self
      .client
      .patch("/reviews/bulk-update", Some(json!({ "updates": updates })))
      .await
  }

  pub async fn dashboard_stats(&self) -> Result<ApiResponse<DashboardStats>, ApiError> {
    self
      .client
      .get("/reviews/dashboard-stats", &Params::new())
      .await
  }
}

/// Moderation body; the reason is left out when none is given.
fn reason_body(reason: Option<&str>) -> Value {
  match reason {
    Some(reason) => json!({ "reason": reason }),
    None => json!({}),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::mock::MockTransport;
  use crate::api::types::ReviewStatus;
  use crate::storage::MemoryStore;
  use reqwest::Method;
  use std::sync::Arc;

  fn service(transport: &Arc<MockTransport>) -> ReviewsService {
    ReviewsService::new(ApiClient::new(transport.clone(), Arc::new(MemoryStore::new())))
  }

  #[tokio::test]
  async fn test_list_sends_filters() {
    let transport = Arc::new(MockTransport::new());
    transport.on(Method::GET, "/reviews", Ok(json!({"success": true, "data": []})));

    let params = ReviewQueryParams {
      status: Some(ReviewStatus::Pending),
      is_approved: Some(false),
      rating: Some(4.0),
      ..Default::default()
    };
    let reviews = service(&transport).list(&params).await.unwrap().into_data().unwrap();
    assert!(reviews.is_empty());

    let query = &transport.requests()[0].query;
    assert!(query.contains(&("status".to_string(), "pending".to_string())));
    assert!(query.contains(&("isApproved".to_string(), "false".to_string())));
    assert!(query.contains(&("rating".to_string(), "4.0".to_string())));
  }

  #[tokio::test]
  async fn test_approve_sends_reason() {
    let transport = Arc::new(MockTransport::new());
    transport.on(
      Method::PATCH,
      "/reviews/42/approve",
      Ok(json!({"success": true, "data": {"message": "Review approved"}})),
    );

    let ack = service(&transport)
      .approve(42, Some("great stay"))
      .await
      .unwrap()
      .into_data()
      .unwrap();
    assert_eq!(ack.message, "Review approved");
    assert_eq!(
      transport.requests()[0].body,
      Some(json!({"reason": "great stay"}))
    );
  }

  #[tokio::test]
  async fn test_reject_without_reason_sends_empty_body() {
    let transport = Arc::new(MockTransport::new());
    transport.on(
      Method::PATCH,
      "/reviews/42/reject",
      Ok(json!({"success": true, "message": "Review rejected"})),
    );

    let ack = service(&transport)
      .reject(42, None)
      .await
      .unwrap()
      .into_ack()
      .unwrap();
    assert_eq!(ack.message, "Review rejected");
    assert_eq!(transport.requests()[0].body, Some(json!({})));
  }

  #[tokio::test]
  async fn test_bulk_update_body() {
    let transport = Arc::new(MockTransport::new());
    transport.on(
      Method::PATCH,
      "/reviews/bulk-update",
      Ok(json!({"success": true, "data": {"message": "ok", "processed": 2}})),
    );

    let updates = vec![
      ReviewApproval {
        review_id: 1,
        approved: true,
        reason: None,
      },
      ReviewApproval {
        review_id: 2,
        approved: false,
        reason: Some("spam".to_string()),
      },
    ];
    let result = service(&transport)
      .bulk_update(&updates)
      .await
      .unwrap()
      .into_data()
      .unwrap();
    assert_eq!(result.processed, 2);
    assert_eq!(
      transport.requests()[0].body,
      Some(json!({"updates": [
        {"reviewId": 1, "approved": true},
        {"reviewId": 2, "approved": false, "reason": "spam"}
      ]}))
    );
  }

  #[tokio::test]
  async fn test_approved_scoped_to_property() {
    let transport = Arc::new(MockTransport::new());
    transport.on(Method::GET, "/reviews/approved", Ok(json!({"success": true, "data": []})));

    let svc = service(&transport);
    svc.list_approved(Some("p1")).await.unwrap();
    svc.list_approved(None).await.unwrap();

    let requests = transport.requests();
    assert_eq!(
      requests[0].query,
      vec![("propertyId".to_string(), "p1".to_string())]
    );
    assert!(requests[1].query.is_empty());
  }

  #[tokio::test]
  async fn test_property_path_wins_over_param() {
    let transport = Arc::new(MockTransport::new());
    transport.on(
      Method::GET,
      "/reviews/property/p9",
      Ok(json!({"success": true, "data": []})),
    );

    let params = ReviewQueryParams {
      property_id: Some("other".to_string()),
      limit: Some(5),
      ..Default::default()
    };
    service(&transport).list_for_property("p9", &params).await.unwrap();

    assert_eq!(
      transport.requests()[0].query,
      vec![("limit".to_string(), "5".to_string())]
    );
  }

  #[tokio::test]
  async fn test_errors_propagate() {
    let transport = Arc::new(MockTransport::new());
    transport.on(
      Method::GET,
      "/reviews/7",
      Err(ApiError::http(404, "Review not found", None)),
    );

    let err = service(&transport).get(7).await.unwrap_err();
    assert_eq!(err.status, 404);
    assert_eq!(err.message, "Review not found");
  }
}

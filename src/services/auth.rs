//! Authentication endpoints.

use serde::Serialize;
use serde_json::json;

use crate::api::client::ApiClient;
use crate::api::envelope::{Acknowledgement, ApiResponse};
use crate::api::error::ApiError;
use crate::api::types::{AuthResponse, Manager, Role, TokenResponse};
use crate::cache::Params;

#[derive(Debug, Clone, Serialize)]
pub struct RegisterData {
  pub email: String,
  pub password: String,
  pub name: String,
  pub role: Role,
}

#[derive(Clone)]
pub struct AuthService {
  client: ApiClient,
}

impl AuthService {
  pub fn new(client: ApiClient) -> Self {
    Self { client }
  }

  /// Exchange credentials for a session token
  pub async fn login(
    &self,
    email: &str,
    password: &str,
  ) -> Result<ApiResponse<AuthResponse>, ApiError> {
    self
      .client
      .post(
        "/auth/login",
        Some(json!({ "email": email, "password": password })),
      )
      .await
  }

  pub async fn register(&self, data: &RegisterData) -> Result<ApiResponse<AuthResponse>, ApiError> {
    let body = serde_json::to_value(data)
      .map_err(|e| ApiError::unknown(format!("Failed to encode registration: {}", e)))?;
    self.client.post("/auth/register", Some(body)).await
  }

  pub async fn profile(&self) -> Result<ApiResponse<Manager>, ApiError> {
    self.client.get("/auth/profile", &Params::new()).await
  }

  pub async fn refresh_token(&self) -> Result<ApiResponse<TokenResponse>, ApiError> {
    self.client.post("/auth/refresh", None).await
  }

  /// Invalidate the session on the server
  pub async fn logout(&self) -> Result<ApiResponse<Acknowledgement>, ApiError> {
    self.client.post("/auth/logout", None).await
  }
}

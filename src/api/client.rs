use futures::future::BoxFuture;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::envelope::ApiResponse;
use super::error::ApiError;
use crate::cache::Params;
use crate::session;
use crate::storage::LocalStore;

/// Default bound on a single call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One outbound call, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  /// Path relative to the API base, e.g. `/reviews/42/approve`
  pub path: String,
  pub query: Vec<(String, String)>,
  pub body: Option<Value>,
  pub bearer: Option<String>,
}

/// The wire. Implementations send a request and map every failure into an
/// [`ApiError`]; a successful call yields the decoded JSON body.
pub trait Transport: Send + Sync {
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<Value, ApiError>>;
}

/// Single chokepoint for calls to the review gateway.
///
/// Attaches the persisted bearer token, bounds every call with a timeout and
/// decodes the response envelope.
#[derive(Clone)]
pub struct ApiClient {
  transport: Arc<dyn Transport>,
  store: Arc<dyn LocalStore>,
  timeout: Duration,
}

impl ApiClient {
  pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn LocalStore>) -> Self {
    Self {
      transport,
      store,
      timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub async fn request<T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: Option<Value>,
    params: &Params,
  ) -> Result<ApiResponse<T>, ApiError> {
    let request = ApiRequest {
      method,
      path: path.to_string(),
      query: params.to_pairs(),
      body,
      bearer: session::persisted_token(self.store.as_ref()),
    };
    tracing::debug!(
      method = %request.method,
      path,
      authenticated = request.bearer.is_some(),
      "api request"
    );

    let value = tokio::time::timeout(self.timeout, self.transport.send(request))
      .await
      .map_err(|_| ApiError::timeout(self.timeout))??;

    serde_json::from_value(value).map_err(|e| {
      ApiError::transport(
        "DECODE_ERROR",
        format!("Failed to decode response from {}: {}", path, e),
      )
    })
  }

  pub async fn get<T: DeserializeOwned>(
    &self,
    path: &str,
    params: &Params,
  ) -> Result<ApiResponse<T>, ApiError> {
    self.request(Method::GET, path, None, params).await
  }

  pub async fn post<T: DeserializeOwned>(
    &self,
    path: &str,
    body: Option<Value>,
  ) -> Result<ApiResponse<T>, ApiError> {
    self.request(Method::POST, path, body, &Params::new()).await
  }

  pub async fn put<T: DeserializeOwned>(
    &self,
    path: &str,
    body: Option<Value>,
  ) -> Result<ApiResponse<T>, ApiError> {
    self.request(Method::PUT, path, body, &Params::new()).await
  }

  pub async fn patch<T: DeserializeOwned>(
    &self,
    path: &str,
    body: Option<Value>,
  ) -> Result<ApiResponse<T>, ApiError> {
    self.request(Method::PATCH, path, body, &Params::new()).await
  }

  pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, ApiError> {
    self.request(Method::DELETE, path, None, &Params::new()).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::error::ErrorKind;
  use crate::api::mock::MockTransport;
  use crate::storage::MemoryStore;
  use serde_json::json;

  #[tokio::test]
  async fn test_attaches_persisted_token() {
    let transport = Arc::new(MockTransport::new());
    transport.on(Method::GET, "/auth/profile", Ok(json!({"success": true, "data": 1})));
    let store = Arc::new(MemoryStore::new());
    let client = ApiClient::new(transport.clone(), store.clone());

    let _: ApiResponse<u32> = client.get("/auth/profile", &Params::new()).await.unwrap();
    assert_eq!(transport.requests()[0].bearer, None);

    store
      .set(session::SESSION_KEY, r#"{"state": {"token": "abc"}, "version": 0}"#)
      .unwrap();
    let _: ApiResponse<u32> = client.get("/auth/profile", &Params::new()).await.unwrap();
    assert_eq!(transport.requests()[1].bearer.as_deref(), Some("abc"));
  }

  #[tokio::test]
  async fn test_passes_query_params() {
    let transport = Arc::new(MockTransport::new());
    transport.on(Method::GET, "/reviews", Ok(json!({"success": true, "data": []})));
    let client = ApiClient::new(transport.clone(), Arc::new(MemoryStore::new()));

    let params = Params::from_pairs([("status", "pending"), ("channel", "airbnb")]);
    let _: ApiResponse<Vec<u32>> = client.get("/reviews", &params).await.unwrap();

    assert_eq!(
      transport.requests()[0].query,
      vec![
        ("channel".to_string(), "airbnb".to_string()),
        ("status".to_string(), "pending".to_string())
      ]
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_times_out() {
    let transport = Arc::new(MockTransport::new());
    transport.on_delayed(
      Method::GET,
      "/reviews",
      Duration::from_secs(60),
      Ok(json!({"success": true, "data": []})),
    );
    let client = ApiClient::new(transport, Arc::new(MemoryStore::new()));

    let err = client
      .get::<Vec<u32>>("/reviews", &Params::new())
      .await
      .unwrap_err();
    assert_eq!(err.status, 0);
    assert_eq!(err.code, "ECONNABORTED");
    assert_eq!(err.kind, ErrorKind::Transport);
  }

  #[tokio::test]
  async fn test_undecodable_body() {
    let transport = Arc::new(MockTransport::new());
    transport.on(Method::GET, "/reviews", Ok(json!("<html>")));
    let client = ApiClient::new(transport, Arc::new(MemoryStore::new()));

    let err = client
      .get::<Vec<u32>>("/reviews", &Params::new())
      .await
      .unwrap_err();
    assert_eq!(err.code, "DECODE_ERROR");
    assert_eq!(err.status, 0);
  }
}

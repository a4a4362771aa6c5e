//! reqwest-backed [`Transport`].

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::client::{ApiRequest, Transport, DEFAULT_TIMEOUT};
use super::error::ApiError;

/// Error body the gateway sends with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
  message: Option<String>,
  details: Option<Value>,
}

#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(base_url: &str) -> Result<Self> {
    Self::with_timeout(base_url, DEFAULT_TIMEOUT)
  }

  pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
    // Url::join treats a base without trailing slash as a file and drops
    // its last segment.
    let normalized = format!("{}/", base_url.trim_end_matches('/'));
    let base_url =
      Url::parse(&normalized).map_err(|e| eyre!("Invalid API URL {}: {}", base_url, e))?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn url_for(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| ApiError::unknown(format!("Invalid request path {}: {}", path, e)))
  }
}

impl Transport for HttpTransport {
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<Value, ApiError>> {
    let client = self.client.clone();
    let url = self.url_for(&request.path);

    async move {
      let url = url?;
      let mut builder = client.request(request.method, url);
      if !request.query.is_empty() {
        builder = builder.query(&request.query);
      }
      if let Some(token) = &request.bearer {
        builder = builder.bearer_auth(token);
      }
      if let Some(body) = &request.body {
        builder = builder.json(body);
      }

      let response = builder.send().await.map_err(map_reqwest_error)?;
      let status = response.status();

      if status.is_success() {
        response.json::<Value>().await.map_err(map_reqwest_error)
      } else {
        let text = response.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = body
          .message
          .or_else(|| status.canonical_reason().map(String::from))
          .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));
        let details = body.details.map(|d| match d {
          Value::String(s) => s,
          other => other.to_string(),
        });
        Err(ApiError::http(status.as_u16(), message, details))
      }
    }
    .boxed()
  }
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
  if err.is_timeout() {
    ApiError::transport("ECONNABORTED", err.to_string())
  } else if err.is_connect() || err.is_request() {
    ApiError::network(err.to_string())
  } else if err.is_decode() {
    ApiError::transport("DECODE_ERROR", err.to_string())
  } else {
    ApiError::unknown(err.to_string())
  }
}

//! Scripted in-memory transport for tests.

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Method;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::client::{ApiRequest, Transport};
use super::error::ApiError;

struct Route {
  delay: Duration,
  /// Served in order; the last one repeats
  responses: VecDeque<Result<Value, ApiError>>,
}

/// Transport double that records every request and answers from a script
/// keyed by (method, path). Unscripted routes answer 404.
#[derive(Default)]
pub struct MockTransport {
  routes: Mutex<HashMap<(Method, String), Route>>,
  requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn on(&self, method: Method, path: &str, response: Result<Value, ApiError>) {
    self.on_delayed(method, path, Duration::ZERO, response);
  }

  /// Queue `response` for (method, path), answered after `delay`.
  pub fn on_delayed(
    &self,
    method: Method,
    path: &str,
    delay: Duration,
    response: Result<Value, ApiError>,
  ) {
    let mut routes = self.routes.lock().unwrap();
    let route = routes
      .entry((method, path.to_string()))
      .or_insert_with(|| Route {
        delay,
        responses: VecDeque::new(),
      });
    route.delay = delay;
    route.responses.push_back(response);
  }

  /// Replace whatever is scripted for (method, path).
  pub fn reset(&self, method: Method, path: &str, response: Result<Value, ApiError>) {
    self.routes.lock().unwrap().remove(&(method.clone(), path.to_string()));
    self.on(method, path, response);
  }

  pub fn requests(&self) -> Vec<ApiRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn calls(&self, method: Method, path: &str) -> usize {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.method == method && r.path == path)
      .count()
  }
}

impl Transport for MockTransport {
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<Value, ApiError>> {
    let key = (request.method.clone(), request.path.clone());
    self.requests.lock().unwrap().push(request);

    let (delay, response) = {
      let mut routes = self.routes.lock().unwrap();
      match routes.get_mut(&key) {
        Some(route) => {
          let response = if route.responses.len() > 1 {
            route.responses.pop_front()
          } else {
            route.responses.front().cloned()
          };
          (
            route.delay,
            response.unwrap_or_else(|| Err(ApiError::http(404, "Not Found", None))),
          )
        }
        None => (
          Duration::ZERO,
          Err(ApiError::http(404, format!("no route for {} {}", key.0, key.1), None)),
        ),
      }
    };

    async move {
      if !delay.is_zero() {
        tokio::time::sleep(delay).await;
      }
      response
    }
    .boxed()
  }
}

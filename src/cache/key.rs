//! Cache keys: a kind tag plus a normalized parameter object.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

/// Tag identifying what a cached query returns.
pub trait QueryKind: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
  /// Resource family used for bulk invalidation (e.g. "reviews")
  fn resource(&self) -> &'static str;

  /// How long a fetched value is served without a network call
  fn stale_time(&self) -> Duration;
}

/// Query parameters in the form they take on the wire.
///
/// Values are kept as their query-string rendering in a sorted map, so two
/// parameter objects with the same pairs produce the same key no matter how
/// they were built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Params(BTreeMap<String, String>);

impl Params {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_pairs<K, V, I>(pairs: I) -> Self
  where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
  {
    Self(
      pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    )
  }

  /// Build from a JSON object. Nulls are dropped; non-object values yield
  /// empty params.
  pub fn from_json(value: &Value) -> Self {
    let mut params = BTreeMap::new();
    if let Value::Object(map) = value {
      for (key, value) in map {
        if let Some(rendered) = render(value) {
          params.insert(key.clone(), rendered);
        }
      }
    }
    Self(params)
  }

  /// Build from any serializable filter struct.
  pub fn from_serialize<T: Serialize>(value: &T) -> Self {
    serde_json::to_value(value)
      .map(|v| Self::from_json(&v))
      .unwrap_or_default()
  }

  pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.0.insert(key.into(), value.into());
    self
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(key).map(String::as_str)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn to_pairs(&self) -> Vec<(String, String)> {
    self
      .0
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }
}

fn render(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) => Some(s.clone()),
    Value::Bool(b) => Some(b.to_string()),
    Value::Number(n) => Some(n.to_string()),
    // Nested structures are not expected in query strings; keep them
    // distinguishable anyway.
    other => Some(other.to_string()),
  }
}

/// The ordered pair (kind, params) identifying one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey<K> {
  pub kind: K,
  pub params: Params,
}

impl<K: QueryKind> QueryKey<K> {
  pub fn new(kind: K, params: Params) -> Self {
    Self { kind, params }
  }

  pub fn resource(&self) -> &'static str {
    self.kind.resource()
  }

  /// Human readable form for logs.
  pub fn description(&self) -> String {
    if self.params.is_empty() {
      format!("{:?}", self.kind)
    } else {
      let params: Vec<String> = self.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
      format!("{:?}?{}", self.kind, params.join("&"))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[derive(Debug, Clone, PartialEq, Eq, Hash)]
  struct Kind;

  impl QueryKind for Kind {
    fn resource(&self) -> &'static str {
      "things"
    }

    fn stale_time(&self) -> Duration {
      Duration::from_secs(60)
    }
  }

  #[test]
  fn test_insertion_order_does_not_matter() {
    let a = Params::from_pairs([("status", "pending"), ("propertyId", "p1")]);
    let b = Params::from_pairs([("propertyId", "p1"), ("status", "pending")]);
    assert_eq!(QueryKey::new(Kind, a), QueryKey::new(Kind, b));
  }

  #[test]
  fn test_json_objects_with_different_order_are_equal() {
    let a: Value = serde_json::from_str(r#"{"rating": 4, "channel": "airbnb", "isApproved": true}"#)
      .unwrap();
    let b: Value = serde_json::from_str(r#"{"isApproved": true, "channel": "airbnb", "rating": 4}"#)
      .unwrap();
    assert_eq!(Params::from_json(&a), Params::from_json(&b));
  }

  #[test]
  fn test_nulls_are_dropped() {
    let params = Params::from_json(&json!({"status": null, "page": 2}));
    assert_eq!(params, Params::from_pairs([("page", "2")]));
  }

  #[test]
  fn test_different_values_are_different_keys() {
    let a = Params::from_pairs([("status", "pending")]);
    let b = Params::from_pairs([("status", "published")]);
    assert_ne!(QueryKey::new(Kind, a), QueryKey::new(Kind, b));
  }

  #[test]
  fn test_description() {
    let key = QueryKey::new(Kind, Params::new().with("b", "2").with("a", "1"));
    assert_eq!(key.description(), "Kind?a=1&b=2");
    assert_eq!(key.resource(), "things");
  }
}

//! Pagination bounds and response-shape normalization.
//!
//! The upstream service answers list requests in several shapes: a bare
//! array, an object carrying an `items` array, or a lone scalar/object. All of
//! them are folded into a [`ListEnvelope`] here.

use serde_json::{Map, Value};

use crate::config::PagingConfig;

use super::error::UpstreamError;
use super::types::ListEnvelope;

/// Caller-supplied paging, before clamping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
  pub offset: Option<i64>,
  pub limit: Option<i64>,
}

impl PageRequest {
  pub fn new(offset: i64, limit: i64) -> Self {
    Self {
      offset: Some(offset),
      limit: Some(limit),
    }
  }
}

/// Clamped paging: `offset >= 0`, `1 <= limit <= max_limit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
  pub offset: u64,
  pub limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingPolicy {
  default_limit: u64,
  max_limit: u64,
}

impl PagingPolicy {
  pub fn new(default_limit: u64, max_limit: u64) -> Self {
    let max_limit = max_limit.max(1);
    Self {
      default_limit: default_limit.clamp(1, max_limit),
      max_limit,
    }
  }

  pub fn from_config(config: &PagingConfig) -> Self {
    Self::new(config.default_limit, config.max_limit)
  }

  /// Clamp caller paging into range. Out-of-range input is never rejected.
  pub fn clamp(&self, page: PageRequest) -> PageBounds {
    let offset = page.offset.unwrap_or(0).max(0) as u64;
    let limit = match page.limit {
      Some(limit) => (limit.max(1) as u64).min(self.max_limit),
      None => self.default_limit,
    };
    PageBounds { offset, limit }
  }
}

impl Default for PagingPolicy {
  fn default() -> Self {
    Self::new(100, 1000)
  }
}

/// Shape of a successful upstream payload
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
  /// `{"items": [...], "hasMore": bool}`
  Paged { items: Vec<Value>, has_more: bool },
  /// Bare array; continuation has to be guessed
  Listed(Vec<Value>),
  /// Object with an `error` field and no items
  Failed(String),
  /// Anything else
  Single(Value),
}

impl Shape {
  pub fn classify(payload: Value) -> Self {
    match payload {
      Value::Array(items) => Shape::Listed(items),
      Value::Object(mut map) => {
        if matches!(map.get("items"), Some(Value::Array(_))) {
          let has_more = map.get("hasMore").is_some_and(truthy);
          let items = match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
          };
          return Shape::Paged { items, has_more };
        }
        match explicit_error(&map) {
          Some(message) => Shape::Failed(message),
          None => Shape::Single(Value::Object(map)),
        }
      }
      other => Shape::Single(other),
    }
  }

  /// Fold into an envelope. `limit` drives the bare-array continuation guess.
  ///
  /// A bare array as long as the limit reports `hasMore`, so an exact-boundary
  /// result set costs the caller one extra, empty page.
  pub fn into_envelope(self, limit: u64) -> ListEnvelope {
    match self {
      Shape::Paged { items, has_more } => ListEnvelope::success(items, has_more),
      Shape::Listed(items) => {
        let has_more = items.len() as u64 >= limit;
        ListEnvelope::success(items, has_more)
      }
      Shape::Failed(message) => ListEnvelope::failure(message),
      Shape::Single(value) => ListEnvelope::success(vec![value], false),
    }
  }
}

/// Loose truthiness for flags sent by services that do not always emit
/// booleans: `0`, `""`, `[]`, `{}` and `null` are false.
fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(items) => !items.is_empty(),
    Value::Object(map) => !map.is_empty(),
  }
}

/// Error message of an object payload that carries a non-null `error` field.
pub fn explicit_error(map: &Map<String, Value>) -> Option<String> {
  match map.get("error")? {
    Value::Null | Value::Bool(false) => None,
    Value::String(message) => Some(message.clone()),
    other => Some(other.to_string()),
  }
}

/// Build the envelope for one executed list request.
pub fn normalize(result: Result<Value, UpstreamError>, bounds: PageBounds) -> ListEnvelope {
  match result {
    Ok(payload) => Shape::classify(payload).into_envelope(bounds.limit),
    Err(error) => ListEnvelope::failure(error.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn bounds(limit: u64) -> PageBounds {
    PageBounds { offset: 0, limit }
  }

  #[test]
  fn test_clamp_keeps_bounds_for_any_input() {
    let policy = PagingPolicy::default();
    let inputs = [
      (i64::MIN, i64::MIN),
      (-5, 0),
      (-1, -1),
      (0, 1),
      (10, 50),
      (3, 1000),
      (7, 1001),
      (i64::MAX, i64::MAX),
    ];
    for (offset, limit) in inputs {
      let b = policy.clamp(PageRequest::new(offset, limit));
      assert!(b.limit >= 1 && b.limit <= 1000, "limit {} out of range", b.limit);
      if offset >= 0 {
        assert_eq!(b.offset, offset as u64);
      } else {
        assert_eq!(b.offset, 0);
      }
    }
  }

  #[test]
  fn test_clamp_defaults() {
    let policy = PagingPolicy::new(100, 1000);
    assert_eq!(
      policy.clamp(PageRequest::default()),
      PageBounds {
        offset: 0,
        limit: 100
      }
    );
    assert_eq!(policy.clamp(PageRequest::new(0, 0)).limit, 1);
    assert_eq!(policy.clamp(PageRequest::new(0, 5000)).limit, 1000);
  }

  #[test]
  fn test_policy_keeps_default_within_max() {
    let policy = PagingPolicy::new(500, 200);
    assert_eq!(policy.clamp(PageRequest::default()).limit, 200);
  }

  #[test]
  fn test_full_bare_list_has_more() {
    let envelope = normalize(Ok(json!(["a", "b", "c"])), bounds(3));
    assert!(envelope.is_ok());
    assert!(envelope.has_more());
  }

  #[test]
  fn test_short_bare_list_has_no_more() {
    let envelope = normalize(Ok(json!(["a", "b"])), bounds(3));
    assert_eq!(envelope.items().len(), 2);
    assert!(!envelope.has_more());
  }

  #[test]
  fn test_items_object_uses_own_flag() {
    let envelope = normalize(
      Ok(json!({"items": [1, 2], "hasMore": true, "total": 9})),
      bounds(100),
    );
    assert_eq!(envelope.items(), &[json!(1), json!(2)]);
    assert!(envelope.has_more());

    let envelope = normalize(Ok(json!({"items": [1, 2, 3]})), bounds(3));
    assert!(!envelope.has_more());
  }

  #[test]
  fn test_has_more_flag_is_truthy() {
    for (flag, expected) in [
      (json!(1), true),
      (json!("true"), true),
      (json!(0), false),
      (json!(""), false),
      (Value::Null, false),
    ] {
      let envelope = normalize(Ok(json!({"items": [1], "hasMore": flag})), bounds(100));
      assert_eq!(envelope.has_more(), expected);
    }
  }

  #[test]
  fn test_scalar_is_wrapped() {
    let envelope = normalize(Ok(json!("only")), bounds(1));
    assert_eq!(envelope.items(), &[json!("only")]);
    assert!(!envelope.has_more());

    let envelope = normalize(Ok(json!({"name": "seg"})), bounds(1));
    assert_eq!(envelope.items(), &[json!({"name": "seg"})]);
    assert!(!envelope.has_more());
  }

  #[test]
  fn test_non_array_items_key_is_single() {
    let payload = json!({"items": "nope"});
    assert_eq!(Shape::classify(payload.clone()), Shape::Single(payload));
  }

  #[test]
  fn test_error_field_fails_envelope() {
    let envelope = normalize(Ok(json!({"error": "No binary loaded"})), bounds(10));
    assert!(!envelope.is_ok());
    assert_eq!(envelope.error(), Some("No binary loaded"));
    assert!(envelope.items().is_empty());
  }

  #[test]
  fn test_upstream_error_fails_envelope() {
    let envelope = normalize(
      Err(UpstreamError::Transport("connection refused".into())),
      bounds(10),
    );
    assert!(!envelope.is_ok());
    assert!(!envelope.has_more());
    assert_eq!(envelope.error(), Some("connection refused"));
  }
}

//! Request descriptors: one logical call against the upstream service.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Method::Get => f.write_str("GET"),
      Method::Post => f.write_str("POST"),
    }
  }
}

/// Scalar query parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
  Str(String),
  Int(i64),
  Bool(bool),
}

impl fmt::Display for ParamValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ParamValue::Str(s) => f.write_str(s),
      ParamValue::Int(i) => write!(f, "{}", i),
      ParamValue::Bool(b) => write!(f, "{}", b),
    }
  }
}

impl From<&str> for ParamValue {
  fn from(value: &str) -> Self {
    ParamValue::Str(value.to_string())
  }
}

impl From<String> for ParamValue {
  fn from(value: String) -> Self {
    ParamValue::Str(value)
  }
}

impl From<i64> for ParamValue {
  fn from(value: i64) -> Self {
    ParamValue::Int(value)
  }
}

impl From<u64> for ParamValue {
  fn from(value: u64) -> Self {
    ParamValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
  }
}

impl From<bool> for ParamValue {
  fn from(value: bool) -> Self {
    ParamValue::Bool(value)
  }
}

/// POST payload. Upstream endpoints disagree on encoding, so each operation
/// picks the one its endpoint expects.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
  Json(Value),
  Text(String),
  Form(Vec<(String, String)>),
}

/// Immutable description of one logical upstream call.
///
/// Parameters live in a sorted map, so iteration order is canonical and two
/// descriptors built in different orders compare equal.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
  method: Method,
  endpoint: String,
  params: BTreeMap<String, ParamValue>,
  body: Option<Body>,
}

impl RequestDescriptor {
  pub fn get(endpoint: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      endpoint: endpoint.into(),
      params: BTreeMap::new(),
      body: None,
    }
  }

  pub fn post(endpoint: impl Into<String>, body: Body) -> Self {
    Self {
      method: Method::Post,
      endpoint: endpoint.into(),
      params: BTreeMap::new(),
      body: Some(body),
    }
  }

  /// Add a query parameter, replacing an existing one with the same name.
  pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
    self.params.insert(name.into(), value.into());
    self
  }

  pub fn method(&self) -> Method {
    self.method
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  pub fn params(&self) -> &BTreeMap<String, ParamValue> {
    &self.params
  }

  pub fn body(&self) -> Option<&Body> {
    self.body.as_ref()
  }

  /// Query parameters as string pairs, in key order.
  pub fn query_pairs(&self) -> Vec<(String, String)> {
    self
      .params
      .iter()
      .map(|(k, v)| (k.clone(), v.to_string()))
      .collect()
  }

  /// `endpoint?k1=v1&k2=v2` with keys sorted and values percent-encoded.
  pub fn canonical(&self) -> String {
    if self.params.is_empty() {
      return self.endpoint.clone();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
      .extend_pairs(self.query_pairs())
      .finish();
    format!("{}?{}", self.endpoint, query)
  }
}

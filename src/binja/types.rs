use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::error::{UpstreamError, ValidationError};

/// Uniform result of every list operation.
///
/// When `ok` is false, `items` is empty and `has_more` is false; when `ok` is
/// true, there is no error. The constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEnvelope {
  ok: bool,
  items: Vec<Value>,
  #[serde(rename = "hasMore")]
  has_more: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  error: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  reason: Option<String>,
}

impl ListEnvelope {
  pub fn success(items: Vec<Value>, has_more: bool) -> Self {
    Self {
      ok: true,
      items,
      has_more,
      error: None,
      reason: None,
    }
  }

  pub fn failure(error: impl Into<String>) -> Self {
    Self {
      ok: false,
      items: Vec::new(),
      has_more: false,
      error: Some(error.into()),
      reason: None,
    }
  }

  pub fn invalid(error: &ValidationError) -> Self {
    Self {
      reason: Some(error.reason().to_string()),
      ..Self::failure(error.to_string())
    }
  }

  pub fn is_ok(&self) -> bool {
    self.ok
  }

  pub fn items(&self) -> &[Value] {
    &self.items
  }

  pub fn has_more(&self) -> bool {
    self.has_more
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn reason(&self) -> Option<&str> {
    self.reason.as_deref()
  }

  pub fn into_items(self) -> Vec<Value> {
    self.items
  }

  /// Transform each item, leaving the flags alone.
  pub fn map_items(mut self, f: impl FnMut(Value) -> Value) -> Self {
    self.items = self.items.into_iter().map(f).collect();
    self
  }

  pub fn into_value(self) -> Value {
    serde_json::to_value(self)
      .unwrap_or_else(|e| json!({ "ok": false, "items": [], "hasMore": false, "error": e.to_string() }))
  }
}

/// Flat `{ok, ...fields, error?}` result of a non-list operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailRecord {
  ok: bool,
  #[serde(flatten)]
  fields: Map<String, Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  error: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  reason: Option<String>,
}

const RESERVED_FIELDS: [&str; 3] = ["ok", "error", "reason"];

impl DetailRecord {
  /// Successful record. Reserved keys in `fields` are dropped so the flat
  /// object never carries them twice.
  pub fn success(mut fields: Map<String, Value>) -> Self {
    for key in RESERVED_FIELDS {
      fields.remove(key);
    }
    Self {
      ok: true,
      fields,
      error: None,
      reason: None,
    }
  }

  pub fn empty() -> Self {
    Self::success(Map::new())
  }

  pub fn failure(error: impl Into<String>) -> Self {
    Self {
      ok: false,
      fields: Map::new(),
      error: Some(error.into()),
      reason: None,
    }
  }

  pub fn invalid(error: &ValidationError) -> Self {
    Self {
      reason: Some(error.reason().to_string()),
      ..Self::failure(error.to_string())
    }
  }

  pub fn upstream(error: &UpstreamError) -> Self {
    Self::failure(error.to_string())
  }

  pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
    if !RESERVED_FIELDS.contains(&key) {
      self.fields.insert(key.to_string(), value.into());
    }
    self
  }

  pub fn is_ok(&self) -> bool {
    self.ok
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.fields.get(key)
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn reason(&self) -> Option<&str> {
    self.reason.as_deref()
  }

  pub fn into_value(self) -> Value {
    serde_json::to_value(self).unwrap_or_else(|e| json!({ "ok": false, "error": e.to_string() }))
  }
}

/// Entity collections reachable through `list_entities`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
  Methods,
  Classes,
  Segments,
  Imports,
  Exports,
  Data,
  Namespaces,
}

impl EntityKind {
  pub const ALL: [&'static str; 7] = [
    "methods",
    "classes",
    "segments",
    "imports",
    "exports",
    "data",
    "namespaces",
  ];

  /// Upstream endpoint listing this kind
  pub fn endpoint(&self) -> &'static str {
    match self {
      EntityKind::Methods => "methods",
      EntityKind::Classes => "classes",
      EntityKind::Segments => "segments",
      EntityKind::Imports => "imports",
      EntityKind::Exports => "exports",
      EntityKind::Data => "data",
      EntityKind::Namespaces => "namespaces",
    }
  }
}

impl FromStr for EntityKind {
  type Err = ValidationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "methods" => Ok(EntityKind::Methods),
      "classes" => Ok(EntityKind::Classes),
      "segments" => Ok(EntityKind::Segments),
      "imports" => Ok(EntityKind::Imports),
      "exports" => Ok(EntityKind::Exports),
      "data" => Ok(EntityKind::Data),
      "namespaces" => Ok(EntityKind::Namespaces),
      _ => Err(ValidationError::InvalidValue {
        field: "kind".to_string(),
        allowed: Self::ALL.to_vec(),
      }),
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.endpoint())
  }
}

/// Output encoding for `read_memory`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryFormat {
  #[default]
  Hex,
  Bytes,
  Ascii,
  Hexdump,
}

impl MemoryFormat {
  pub const ALL: [&'static str; 4] = ["hex", "bytes", "ascii", "hexdump"];

  pub fn as_str(&self) -> &'static str {
    match self {
      MemoryFormat::Hex => "hex",
      MemoryFormat::Bytes => "bytes",
      MemoryFormat::Ascii => "ascii",
      MemoryFormat::Hexdump => "hexdump",
    }
  }

  /// Formats whose payload is text rather than structured data
  pub fn is_textual(&self) -> bool {
    !matches!(self, MemoryFormat::Bytes)
  }
}

impl FromStr for MemoryFormat {
  type Err = ValidationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "hex" => Ok(MemoryFormat::Hex),
      "bytes" => Ok(MemoryFormat::Bytes),
      "ascii" => Ok(MemoryFormat::Ascii),
      "hexdump" => Ok(MemoryFormat::Hexdump),
      _ => Err(ValidationError::InvalidValue {
        field: "format".to_string(),
        allowed: Self::ALL.to_vec(),
      }),
    }
  }
}

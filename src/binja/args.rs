//! Typed access to a JSON argument object.

use serde_json::{Map, Value};

use super::error::ValidationError;
use super::paging::PageRequest;

/// Caller arguments for one operation. `null` values count as absent.
#[derive(Debug, Clone, Default)]
pub struct Args {
  map: Map<String, Value>,
}

impl Args {
  /// Accepts an object, or `null` for "no arguments".
  pub fn from_value(value: Value) -> Result<Self, ValidationError> {
    match value {
      Value::Object(map) => Ok(Self { map }),
      Value::Null => Ok(Self::default()),
      _ => Err(ValidationError::InvalidArguments),
    }
  }

  fn present(&self, field: &str) -> Option<&Value> {
    self.map.get(field).filter(|v| !v.is_null())
  }

  pub fn optional_str(&self, field: &str) -> Result<Option<&str>, ValidationError> {
    match self.present(field) {
      None => Ok(None),
      Some(Value::String(s)) => Ok(Some(s.as_str())),
      Some(_) => Err(ValidationError::InvalidType {
        field: field.to_string(),
        expected: "a string",
      }),
    }
  }

  pub fn required_str(&self, field: &str) -> Result<&str, ValidationError> {
    self
      .optional_str(field)?
      .ok_or_else(|| ValidationError::MissingField(field.to_string()))
  }

  pub fn optional_int(&self, field: &str) -> Result<Option<i64>, ValidationError> {
    match self.present(field) {
      None => Ok(None),
      // Integers beyond i64 saturate; bounds checks happen downstream
      Some(value) => value
        .as_i64()
        .or_else(|| value.as_u64().map(|_| i64::MAX))
        .map(Some)
        .ok_or_else(|| ValidationError::InvalidType {
          field: field.to_string(),
          expected: "an integer",
        }),
    }
  }

  pub fn required_int(&self, field: &str) -> Result<i64, ValidationError> {
    self
      .optional_int(field)?
      .ok_or_else(|| ValidationError::MissingField(field.to_string()))
  }

  /// `offset` / `limit`, unclamped.
  pub fn page(&self) -> Result<PageRequest, ValidationError> {
    Ok(PageRequest {
      offset: self.optional_int("offset")?,
      limit: self.optional_int("limit")?,
    })
  }
}

//! Error types for the bridge.
//!
//! Neither type ever escapes an operation: validation failures and upstream
//! failures are both folded into `ok: false` results.

use thiserror::Error;

/// Caller input that fails an operation's contract. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
  #[error("Missing required field: {0}")]
  MissingField(String),

  #[error("Field '{0}' cannot be empty")]
  EmptyField(String),

  #[error("Either {} must be provided", .0.join(" or "))]
  MissingOneOf(Vec<&'static str>),

  #[error("Field '{field}' must be {expected}")]
  InvalidType {
    field: String,
    expected: &'static str,
  },

  #[error("Invalid {field}. Must be one of: {}", .allowed.join(", "))]
  InvalidValue {
    field: String,
    allowed: Vec<&'static str>,
  },

  #[error("Field '{field}' must be between {min} and {max}")]
  OutOfRange { field: String, min: i64, max: i64 },

  #[error("Unknown operation: {0}")]
  UnknownOperation(String),

  #[error("Arguments must be a JSON object")]
  InvalidArguments,
}

impl ValidationError {
  /// Machine-readable reason code
  pub fn reason(&self) -> &'static str {
    match self {
      ValidationError::MissingField(_) | ValidationError::MissingOneOf(_) => "missing_field",
      ValidationError::EmptyField(_) => "empty_field",
      ValidationError::InvalidType { .. } => "invalid_type",
      ValidationError::InvalidValue { .. } => "invalid_value",
      ValidationError::OutOfRange { .. } => "out_of_range",
      ValidationError::UnknownOperation(_) => "unknown_operation",
      ValidationError::InvalidArguments => "invalid_arguments",
    }
  }
}

/// Failure of one logical upstream request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
  /// Connection, timeout or socket failure, reported after the last retry
  #[error("{0}")]
  Transport(String),

  /// Non-2xx HTTP status. Not retried.
  #[error("{code} {reason}")]
  Status { code: u16, reason: String },

  /// Explicit `error` field in an otherwise successful body
  #[error("{0}")]
  Application(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_messages() {
    let err = ValidationError::InvalidValue {
      field: "kind".into(),
      allowed: vec!["methods", "classes"],
    };
    assert_eq!(err.to_string(), "Invalid kind. Must be one of: methods, classes");
    assert_eq!(err.reason(), "invalid_value");

    let err = ValidationError::MissingOneOf(vec!["name", "address"]);
    assert_eq!(err.to_string(), "Either name or address must be provided");

    let err = UpstreamError::Status {
      code: 404,
      reason: "Not Found".into(),
    };
    assert_eq!(err.to_string(), "404 Not Found");
  }
}

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::UpstreamConfig;

use super::error::UpstreamError;
use super::request::RequestDescriptor;
use super::transport::{RawResponse, Transport};

/// Retry bound and linear backoff for transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  max_retries: u32,
  backoff_base: Duration,
}

impl RetryPolicy {
  pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
    Self {
      max_retries,
      backoff_base,
    }
  }

  pub fn from_config(config: &UpstreamConfig) -> Self {
    Self::new(config.max_retries, config.retry_backoff_base())
  }

  /// Total attempts, first one included.
  pub fn attempts(&self) -> u32 {
    self.max_retries.saturating_add(1)
  }

  /// Delay after the given failed attempt (1-based). Saturates instead of
  /// overflowing for large configured bases.
  pub fn backoff_delay(&self, attempt: u32) -> Duration {
    self.backoff_base.saturating_mul(attempt)
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::new(2, Duration::from_millis(200))
  }
}

/// Binary Ninja HTTP API client.
///
/// Executes one logical request: retries transport failures with linear
/// backoff, fails fast on HTTP error statuses, and decodes whatever body
/// shape the service sends back.
#[derive(Clone)]
pub struct BinjaClient {
  transport: Arc<dyn Transport>,
  retry: RetryPolicy,
}

impl BinjaClient {
  pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
    Self { transport, retry }
  }

  /// Run a request to completion, returning the decoded payload.
  pub async fn execute(&self, request: &RequestDescriptor) -> Result<Value, UpstreamError> {
    let attempts = self.retry.attempts();
    let mut last_error = None;

    for attempt in 1..=attempts {
      match self.transport.send(request).await {
        Ok(response) => {
          debug!(
            method = %request.method(),
            endpoint = request.endpoint(),
            status = response.status,
            attempt,
            "upstream responded"
          );
          return decode_response(response);
        }
        Err(failure) => {
          warn!(
            endpoint = request.endpoint(),
            attempt,
            error = %failure,
            "upstream request attempt failed"
          );
          last_error = Some(failure);
          if attempt < attempts {
            tokio::time::sleep(self.retry.backoff_delay(attempt)).await;
          }
        }
      }
    }

    let message = last_error
      .map(|e| e.into_message())
      .filter(|m| !m.is_empty())
      .unwrap_or_else(|| "unknown error".to_string());
    error!(
      endpoint = request.endpoint(),
      attempts,
      error = %message,
      "upstream unreachable"
    );
    Err(UpstreamError::Transport(message))
  }
}

/// Map a raw response to a payload or an upstream error.
pub fn decode_response(response: RawResponse) -> Result<Value, UpstreamError> {
  if !response.is_success() {
    return Err(UpstreamError::Status {
      code: response.status,
      reason: response.reason,
    });
  }
  Ok(decode_body(&response.body))
}

/// Decode a body regardless of the content type the service claimed.
///
/// JSON first; then trimmed text, re-parsed as JSON when it looks like a
/// container; otherwise the text split into lines.
pub fn decode_body(body: &[u8]) -> Value {
  if let Ok(value) = serde_json::from_slice(body) {
    return value;
  }

  let text = String::from_utf8_lossy(body);
  let text = text.trim_start_matches('\u{feff}').trim();
  if text.starts_with('{') || text.starts_with('[') {
    if let Ok(value) = serde_json::from_str(text) {
      return value;
    }
  }

  Value::Array(
    text
      .lines()
      .map(|line| Value::String(line.to_string()))
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::binja::transport::TransportFailure;
  use crate::testing::{fast_retry, json_response, text_response, ScriptedTransport};
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn client(transport: Arc<ScriptedTransport>) -> BinjaClient {
    BinjaClient::new(transport, fast_retry())
  }

  #[test]
  fn test_backoff_is_linear() {
    let policy = RetryPolicy::new(3, Duration::from_millis(200));
    assert_eq!(policy.attempts(), 4);
    assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
    assert_eq!(policy.backoff_delay(2), Duration::from_millis(400));
    assert_eq!(policy.backoff_delay(3), Duration::from_millis(600));
  }

  #[test]
  fn test_backoff_saturates() {
    let policy = RetryPolicy::new(u32::MAX, Duration::from_millis(u64::MAX));
    assert_eq!(policy.attempts(), u32::MAX);
    assert_eq!(policy.backoff_delay(u32::MAX), Duration::MAX);
  }

  #[test]
  fn test_decode_json_body() {
    assert_eq!(decode_body(br#"{"a": 1}"#), json!({"a": 1}));
    assert_eq!(decode_body(b"\"00ff\""), json!("00ff"));
  }

  #[test]
  fn test_decode_json_with_bom_and_padding() {
    let body = "\u{feff}  [1, 2]\n".as_bytes();
    assert_eq!(decode_body(body), json!([1, 2]));
  }

  #[test]
  fn test_decode_plain_text_as_lines() {
    assert_eq!(
      decode_body(b"main\nsub_401000\n"),
      json!(["main", "sub_401000"])
    );
    assert_eq!(decode_body(b""), json!([]));
  }

  #[test]
  fn test_decode_broken_container_falls_back_to_lines() {
    assert_eq!(decode_body(b"{not json"), json!(["{not json"]));
  }

  #[tokio::test]
  async fn test_never_succeeding_upstream_exhausts_attempts() {
    let transport = ScriptedTransport::refusing();
    let result = client(transport.clone())
      .execute(&RequestDescriptor::get("methods"))
      .await;

    assert_eq!(transport.calls(), 3);
    match result {
      Err(UpstreamError::Transport(message)) => assert!(!message.is_empty()),
      other => panic!("expected transport error, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_recovers_after_transient_failure() {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = counter.clone();
    let transport = ScriptedTransport::new(move |_| {
      if seen.fetch_add(1, Ordering::SeqCst) == 0 {
        Err(TransportFailure::new("timed out"))
      } else {
        Ok(json_response(&json!(["a"])))
      }
    });

    let result = client(transport.clone())
      .execute(&RequestDescriptor::get("methods"))
      .await;

    assert_eq!(result, Ok(json!(["a"])));
    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_http_error_is_not_retried() {
    let transport =
      ScriptedTransport::new(|_| Ok(RawResponse::new(503, "Service Unavailable", vec![])));

    let result = client(transport.clone())
      .execute(&RequestDescriptor::get("methods"))
      .await;

    assert_eq!(transport.calls(), 1);
    assert_eq!(
      result.unwrap_err().to_string(),
      "503 Service Unavailable".to_string()
    );
  }

  #[tokio::test]
  async fn test_text_body_is_decoded() {
    let transport = ScriptedTransport::new(|_| Ok(text_response("line one\nline two")));
    let result = client(transport)
      .execute(&RequestDescriptor::get("overview"))
      .await;

    assert_eq!(result, Ok(json!(["line one", "line two"])));
  }

  #[tokio::test(start_paused = true)]
  async fn test_backoff_sleeps_between_attempts_only() {
    let transport = ScriptedTransport::refusing();
    let client = BinjaClient::new(
      transport.clone(),
      RetryPolicy::new(2, Duration::from_millis(200)),
    );

    let started = tokio::time::Instant::now();
    let _ = client.execute(&RequestDescriptor::get("methods")).await;

    // 200ms after the first attempt, 400ms after the second, nothing after the last
    assert_eq!(started.elapsed(), Duration::from_millis(600));
    assert_eq!(transport.calls(), 3);
  }
}

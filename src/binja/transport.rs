//! Single-attempt HTTP transport.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;

use super::request::{Body, Method, RequestDescriptor};

/// Raw HTTP response, body not yet decoded.
#[derive(Debug, Clone)]
pub struct RawResponse {
  pub status: u16,
  pub reason: String,
  pub body: Vec<u8>,
}

impl RawResponse {
  pub fn new(status: u16, reason: impl Into<String>, body: Vec<u8>) -> Self {
    Self {
      status,
      reason: reason.into(),
      body,
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Connection-level failure of a single attempt (refused, timeout, DNS, socket).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportFailure(String);

impl TransportFailure {
  pub fn new(message: impl Into<String>) -> Self {
    Self(message.into())
  }

  pub fn into_message(self) -> String {
    self.0
  }
}

/// One attempt against the upstream service. Retrying is the caller's job.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportFailure>;
}

/// reqwest-backed transport with split connect / read timeouts.
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(config: &UpstreamConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .connect_timeout(config.connect_timeout())
      .timeout(config.read_timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let mut base_url = Url::parse(&config.url)
      .map_err(|e| eyre!("Invalid upstream URL '{}': {}", config.url, e))?;
    // Url::join drops the last path segment unless the base ends in a slash
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    Ok(Self { client, base_url })
  }

  fn endpoint_url(&self, endpoint: &str) -> Result<Url, TransportFailure> {
    self
      .base_url
      .join(endpoint.trim_start_matches('/'))
      .map_err(|e| TransportFailure::new(format!("Invalid endpoint '{}': {}", endpoint, e)))
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportFailure> {
    let url = self.endpoint_url(request.endpoint())?;

    let mut builder = match request.method() {
      Method::Get => self.client.get(url),
      Method::Post => self.client.post(url),
    };

    if !request.params().is_empty() {
      builder = builder.query(&request.query_pairs());
    }

    builder = match request.body() {
      Some(Body::Json(value)) => builder.json(value),
      Some(Body::Text(text)) => builder
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(text.clone()),
      Some(Body::Form(pairs)) => {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
          .extend_pairs(pairs)
          .finish();
        builder
          .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
          .body(encoded)
      }
      None => builder,
    };

    let response = builder
      .send()
      .await
      .map_err(|e| TransportFailure::new(e.to_string()))?;

    let status = response.status();
    let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
    let body = response
      .bytes()
      .await
      .map_err(|e| TransportFailure::new(e.to_string()))?;

    Ok(RawResponse::new(status.as_u16(), reason, body.to_vec()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::binja::client::{BinjaClient, RetryPolicy};
  use crate::binja::error::UpstreamError;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;
  use tokio::task::JoinHandle;

  fn transport(url: &str) -> HttpTransport {
    let config = UpstreamConfig {
      url: url.to_string(),
      ..UpstreamConfig::default()
    };
    HttpTransport::new(&config).unwrap()
  }

  #[test]
  fn test_endpoint_url_joins_base() {
    let t = transport("http://localhost:9009");
    assert_eq!(
      t.endpoint_url("data/item").unwrap().as_str(),
      "http://localhost:9009/data/item"
    );
  }

  #[test]
  fn test_endpoint_url_keeps_base_path() {
    let t = transport("http://127.0.0.1:9009/api");
    assert_eq!(
      t.endpoint_url("/methods").unwrap().as_str(),
      "http://127.0.0.1:9009/api/methods"
    );
  }

  #[test]
  fn test_invalid_base_url_is_rejected() {
    let config = UpstreamConfig {
      url: "not a url".to_string(),
      ..UpstreamConfig::default()
    };
    assert!(HttpTransport::new(&config).is_err());
  }

  /// Answer one connection with a canned response and return the raw
  /// request text the server saw.
  async fn serve_once(response_head: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut received = Vec::new();
      let mut chunk = [0u8; 4096];
      loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
          break;
        }
        received.extend_from_slice(&chunk[..n]);
        if let Some(end) = header_end(&received) {
          let head = String::from_utf8_lossy(&received[..end]).to_string();
          if received.len() >= end + 4 + content_length(&head) {
            break;
          }
        }
      }

      let reply = format!(
        "{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response_head,
        body.len(),
        body
      );
      socket.write_all(reply.as_bytes()).await.unwrap();
      socket.shutdown().await.ok();
      String::from_utf8_lossy(&received).to_string()
    });

    (url, handle)
  }

  fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
  }

  fn content_length(head: &str) -> usize {
    head
      .lines()
      .find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
          value.trim().parse().ok()
        } else {
          None
        }
      })
      .unwrap_or(0)
  }

  /// Counts attempts that reach the real transport.
  struct Counting {
    inner: HttpTransport,
    calls: AtomicUsize,
  }

  #[async_trait]
  impl Transport for Counting {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportFailure> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.inner.send(request).await
    }
  }

  #[tokio::test]
  async fn test_get_sends_sorted_query() {
    let (url, server) = serve_once("HTTP/1.1 200 OK", r#"["main"]"#).await;
    let request = RequestDescriptor::get("searchFunctions")
      .param("query", "main loop")
      .param("limit", 10i64)
      .param("offset", 0i64);

    let response = transport(&url).send(&request).await.unwrap();
    let received = server.await.unwrap();

    assert!(
      received.starts_with("GET /searchFunctions?limit=10&offset=0&query=main+loop HTTP/1.1\r\n"),
      "unexpected request: {}",
      received
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body, br#"["main"]"#.to_vec());
  }

  #[tokio::test]
  async fn test_text_body_is_sent_raw() {
    let (url, server) = serve_once("HTTP/1.1 200 OK", "int main() {}").await;
    let request = RequestDescriptor::post("decompile", Body::Text("main".into()));

    transport(&url).send(&request).await.unwrap();
    let received = server.await.unwrap();

    assert!(received.starts_with("POST /decompile HTTP/1.1\r\n"));
    assert!(received
      .to_lowercase()
      .contains("content-type: text/plain; charset=utf-8"));
    assert!(received.ends_with("\r\n\r\nmain"));
  }

  #[tokio::test]
  async fn test_form_body_is_urlencoded() {
    let (url, server) = serve_once("HTTP/1.1 200 OK", "Renamed").await;
    let request = RequestDescriptor::post(
      "renameFunction",
      Body::Form(vec![
        ("oldName".into(), "sub_401000".into()),
        ("newName".into(), "parse header".into()),
      ]),
    );

    transport(&url).send(&request).await.unwrap();
    let received = server.await.unwrap();

    assert!(received
      .to_lowercase()
      .contains("content-type: application/x-www-form-urlencoded"));
    assert!(received.ends_with("\r\n\r\noldName=sub_401000&newName=parse+header"));
  }

  #[tokio::test]
  async fn test_json_body() {
    let (url, server) = serve_once("HTTP/1.1 200 OK", r#"{"loaded":true}"#).await;
    let request = RequestDescriptor::post(
      "load",
      Body::Json(serde_json::json!({"filepath": "/tmp/a.out"})),
    );

    transport(&url).send(&request).await.unwrap();
    let received = server.await.unwrap();

    assert!(received.to_lowercase().contains("content-type: application/json"));
    assert!(received.ends_with(r#"{"filepath":"/tmp/a.out"}"#));
  }

  #[tokio::test]
  async fn test_error_status_maps_to_code_and_reason() {
    let (url, server) = serve_once("HTTP/1.1 404 Not Found", "").await;
    let client = BinjaClient::new(Arc::new(transport(&url)), RetryPolicy::new(2, Duration::ZERO));

    let result = client.execute(&RequestDescriptor::get("binary")).await;
    server.await.unwrap();

    assert_eq!(
      result,
      Err(UpstreamError::Status {
        code: 404,
        reason: "Not Found".into(),
      })
    );
    assert_eq!(result.unwrap_err().to_string(), "404 Not Found");
  }

  #[tokio::test]
  async fn test_closed_port_is_retried_then_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let direct = transport(&url)
      .send(&RequestDescriptor::get("status"))
      .await;
    assert!(direct.is_err());

    let counting = Arc::new(Counting {
      inner: transport(&url),
      calls: AtomicUsize::new(0),
    });
    let client = BinjaClient::new(counting.clone(), RetryPolicy::new(2, Duration::ZERO));
    let result = client.execute(&RequestDescriptor::get("status")).await;

    assert_eq!(counting.calls.load(Ordering::SeqCst), 3);
    match result {
      Err(UpstreamError::Transport(message)) => assert!(!message.is_empty()),
      other => panic!("expected transport error, got {:?}", other),
    }
  }

  #[test]
  fn test_success_range() {
    assert!(RawResponse::new(204, "No Content", vec![]).is_success());
    assert!(!RawResponse::new(302, "Found", vec![]).is_success());
    assert!(!RawResponse::new(500, "Internal Server Error", vec![]).is_success());
  }
}

//! Test doubles shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::binja::request::RequestDescriptor;
use crate::binja::transport::{RawResponse, Transport, TransportFailure};
use crate::binja::{BinjaClient, Dispatcher, ListEnvelope, PagingPolicy, RetryPolicy};
use crate::cache::{CacheLayer, Clock, MemoryStorage};

/// Clock that only moves when told to.
pub struct ManualClock {
  base: Instant,
  offset: Mutex<Duration>,
}

impl ManualClock {
  pub fn new() -> Self {
    Self {
      base: Instant::now(),
      offset: Mutex::new(Duration::ZERO),
    }
  }

  pub fn advance(&self, by: Duration) {
    *self.offset.lock().unwrap() += by;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> Instant {
    self.base + *self.offset.lock().unwrap()
  }
}

type Responder = dyn Fn(&RequestDescriptor) -> Result<RawResponse, TransportFailure> + Send + Sync;

/// Transport that answers from a closure and records every attempt.
pub struct ScriptedTransport {
  responder: Box<Responder>,
  calls: AtomicUsize,
  requests: Mutex<Vec<RequestDescriptor>>,
}

impl ScriptedTransport {
  pub fn new<F>(responder: F) -> Arc<Self>
  where
    F: Fn(&RequestDescriptor) -> Result<RawResponse, TransportFailure> + Send + Sync + 'static,
  {
    Arc::new(Self {
      responder: Box::new(responder),
      calls: AtomicUsize::new(0),
      requests: Mutex::new(Vec::new()),
    })
  }

  /// Every request answered with the same JSON body.
  pub fn json(body: Value) -> Arc<Self> {
    Self::new(move |_| Ok(json_response(&body)))
  }

  /// Every attempt fails at the transport level.
  pub fn refusing() -> Arc<Self> {
    Self::new(|_| Err(TransportFailure::new("connection refused")))
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn requests(&self) -> Vec<RequestDescriptor> {
    self.requests.lock().unwrap().clone()
  }
}

#[async_trait]
impl Transport for ScriptedTransport {
  async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportFailure> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.requests.lock().unwrap().push(request.clone());
    (self.responder)(request)
  }
}

pub fn json_response(body: &Value) -> RawResponse {
  RawResponse::new(200, "OK", serde_json::to_vec(body).unwrap())
}

pub fn text_response(body: &str) -> RawResponse {
  RawResponse::new(200, "OK", body.as_bytes().to_vec())
}

/// Retry policy without backoff delay so tests stay fast.
pub fn fast_retry() -> RetryPolicy {
  RetryPolicy::new(2, Duration::ZERO)
}

/// Dispatcher wired to a scripted transport, default paging and a manual clock.
pub fn dispatcher(transport: Arc<ScriptedTransport>) -> (Dispatcher, Arc<ManualClock>) {
  let clock = Arc::new(ManualClock::new());
  let cache: CacheLayer<ListEnvelope> = CacheLayer::new(MemoryStorage::new())
    .with_ttl(Duration::from_secs(3))
    .with_clock(clock.clone());
  let client = BinjaClient::new(transport, fast_retry());
  (
    Dispatcher::new(client, cache, PagingPolicy::default()),
    clock,
  )
}

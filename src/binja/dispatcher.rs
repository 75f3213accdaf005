//! Operation dispatcher: the caller-facing surface of the bridge.
//!
//! Every operation validates its input before touching the network, and
//! every operation answers with a value: list operations with a
//! [`ListEnvelope`], everything else with a [`DetailRecord`]. Nothing here
//! returns an error to the caller or panics on upstream misbehaviour.

use std::sync::Arc;

use color_eyre::Result;
use futures::future::join_all;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::cache::{CacheLayer, MemoryStorage, NoopStorage, QueryKey};
use crate::config::Config;

use super::args::Args;
use super::client::{BinjaClient, RetryPolicy};
use super::error::{UpstreamError, ValidationError};
use super::operations::{self, ResultKind, OPERATIONS};
use super::paging::{self, PageBounds, PageRequest, PagingPolicy};
use super::request::{Body, RequestDescriptor};
use super::transport::HttpTransport;
use super::types::{DetailRecord, EntityKind, ListEnvelope, MemoryFormat};

/// Largest single memory read, in bytes
pub const MAX_READ_SIZE: i64 = 4096;

/// Binary Ninja operations with validation, caching and normalization.
///
/// List reads are served through the cache; detail reads and mutations always
/// go to the upstream service. A successful mutation clears the cache.
#[derive(Clone)]
pub struct Dispatcher {
  client: BinjaClient,
  cache: CacheLayer<ListEnvelope>,
  paging: PagingPolicy,
}

impl Dispatcher {
  pub fn new(client: BinjaClient, cache: CacheLayer<ListEnvelope>, paging: PagingPolicy) -> Self {
    Self {
      client,
      cache,
      paging,
    }
  }

  /// Wire up the HTTP transport, retry policy, cache and paging from config.
  pub fn from_config(config: &Config) -> Result<Self> {
    let transport = HttpTransport::new(&config.upstream)?;
    let client = BinjaClient::new(
      Arc::new(transport),
      RetryPolicy::from_config(&config.upstream),
    );

    let ttl = config.cache.ttl();
    let cache: CacheLayer<ListEnvelope> = if ttl.is_zero() {
      CacheLayer::new(NoopStorage)
    } else {
      CacheLayer::new(MemoryStorage::new().with_capacity_limit(config.cache.max_entries))
    };

    Ok(Self::new(
      client,
      cache.with_ttl(ttl),
      PagingPolicy::from_config(&config.paging),
    ))
  }

  /// Run an operation by name with JSON arguments.
  ///
  /// Unknown names and malformed arguments come back as `ok: false` results
  /// carrying a `reason` code; no request is made for them.
  pub async fn dispatch(&self, operation: &str, args: Value) -> Value {
    let Some(op) = operations::find(operation) else {
      let err = ValidationError::UnknownOperation(operation.to_string());
      let suggestions: Vec<&str> = operations::get_suggestions(operation)
        .iter()
        .map(|op| op.name)
        .collect();
      let mut record = DetailRecord::invalid(&err);
      if !suggestions.is_empty() && suggestions.len() < OPERATIONS.len() {
        record = record.with_field("suggestions", suggestions);
      }
      return record.into_value();
    };

    let result = match Args::from_value(args) {
      Ok(args) => self.route(op.name, &args).await,
      Err(e) => Err(e),
    };

    match result {
      Ok(value) => value,
      Err(e) => {
        debug!(operation = op.name, reason = e.reason(), error = %e, "arguments rejected");
        match op.result {
          ResultKind::Envelope => ListEnvelope::invalid(&e).into_value(),
          ResultKind::Record => DetailRecord::invalid(&e).into_value(),
        }
      }
    }
  }

  async fn route(&self, name: &str, args: &Args) -> Result<Value, ValidationError> {
    let value = match name {
      "health" => self.health().await.into_value(),
      "list_entities" => {
        let kind: EntityKind = args.required_str("kind")?.parse()?;
        self
          .list_entities(kind, args.page()?, args.optional_str("query")?)
          .await
          .into_value()
      }
      "list_data" => self
        .list_data(
          args.page()?,
          args.optional_str("query")?,
          args.optional_str("filter_type")?,
        )
        .await
        .into_value(),
      "search_functions" => self
        .search_functions(args.required_str("query")?, args.page()?)
        .await
        .into_value(),
      "get_data_item" => self
        .get_data_item(args.optional_str("name")?, args.optional_str("address")?)
        .await
        .into_value(),
      "read_memory" => {
        let format = match args.optional_str("format")? {
          Some(format) => format.parse()?,
          None => MemoryFormat::default(),
        };
        self
          .read_memory(args.required_str("address")?, args.required_int("size")?, format)
          .await
          .into_value()
      }
      "search_data_references" => self
        .search_data_references(args.optional_str("address")?, args.optional_str("pattern")?)
        .await
        .into_value(),
      "decompile_function" => self
        .decompile_function(args.required_str("name")?)
        .await
        .into_value(),
      "get_function_callers" => self
        .get_function_callers(args.required_str("name")?)
        .await
        .into_value(),
      "overview" => self.overview().await.into_value(),
      "get_binary_status" => self.get_binary_status().await.into_value(),
      "rename_function" => self
        .rename_function(args.required_str("old_name")?, args.required_str("new_name")?)
        .await
        .into_value(),
      "rename_data" => self
        .rename_data(args.required_str("address")?, args.required_str("new_name")?)
        .await
        .into_value(),
      "load_binary" => self
        .load_binary(args.required_str("filepath")?)
        .await
        .into_value(),
      other => return Err(ValidationError::UnknownOperation(other.to_string())),
    };
    Ok(value)
  }

  // ==========================================================================
  // Request plumbing
  // ==========================================================================

  /// Cached, normalized list request.
  async fn list(&self, request: RequestDescriptor, bounds: PageBounds) -> ListEnvelope {
    let key = request.cache_hash();
    let client = &self.client;
    let request_ref = &request;

    let result = self
      .cache
      .fetch(&key, move || async move {
        paging::normalize(client.execute(request_ref).await, bounds)
      })
      .await;

    debug!(
      request = %request.description(),
      source = ?result.source,
      ok = result.data.is_ok(),
      "list request served"
    );
    result.data
  }

  /// Uncached request whose payload is checked for an explicit `error` field.
  async fn detail(&self, request: &RequestDescriptor) -> Result<Value, UpstreamError> {
    let payload = self.client.execute(request).await?;
    if let Value::Object(map) = &payload {
      if let Some(message) = paging::explicit_error(map) {
        return Err(UpstreamError::Application(message));
      }
    }
    Ok(payload)
  }

  /// Mutating request. Never cached; clears the cache when it succeeds.
  async fn mutate(&self, request: RequestDescriptor) -> DetailRecord {
    match self.detail(&request).await {
      Ok(payload) => {
        self.cache.clear();
        info!(request = %request.description(), "mutation applied, cache cleared");
        match payload {
          Value::Object(map) => DetailRecord::success(map),
          other => DetailRecord::empty().with_field("result", join_lines(other)),
        }
      }
      Err(e) => {
        warn!(request = %request.description(), error = %e, "mutation failed");
        DetailRecord::upstream(&e)
      }
    }
  }

  // ==========================================================================
  // List operations
  // ==========================================================================

  /// List one kind of entity. A `query` on methods goes to the dedicated
  /// search endpoint; on other kinds it is passed through as a filter.
  pub async fn list_entities(
    &self,
    kind: EntityKind,
    page: PageRequest,
    query: Option<&str>,
  ) -> ListEnvelope {
    let bounds = self.paging.clamp(page);
    let query = query.map(str::trim).filter(|q| !q.is_empty());

    let endpoint = match (kind, query) {
      (EntityKind::Methods, Some(_)) => "searchFunctions",
      _ => kind.endpoint(),
    };

    let mut request = paged_request(endpoint, bounds);
    if let Some(query) = query {
      request = request.param("query", query);
    }
    self.list(request, bounds).await
  }

  /// List data items; object items are completed with default fields.
  pub async fn list_data(
    &self,
    page: PageRequest,
    query: Option<&str>,
    filter_type: Option<&str>,
  ) -> ListEnvelope {
    let bounds = self.paging.clamp(page);
    let mut request = paged_request("data", bounds);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
      request = request.param("query", query);
    }
    if let Some(filter_type) = filter_type.filter(|t| !t.is_empty()) {
      request = request.param("type", filter_type);
    }

    self.list(request, bounds).await.map_items(with_data_defaults)
  }

  pub async fn search_functions(&self, query: &str, page: PageRequest) -> ListEnvelope {
    let query = match non_empty("query", query) {
      Ok(query) => query,
      Err(e) => return ListEnvelope::invalid(&e),
    };
    let bounds = self.paging.clamp(page);
    let request = paged_request("searchFunctions", bounds).param("query", query);
    self.list(request, bounds).await
  }

  // ==========================================================================
  // Detail operations
  // ==========================================================================

  /// Upstream reachability. Never fails the caller, only reports.
  pub async fn health(&self) -> DetailRecord {
    match self.client.execute(&RequestDescriptor::get("status")).await {
      Ok(payload) => {
        let status = match join_lines(payload) {
          status @ (Value::String(_) | Value::Object(_)) => status,
          _ => Value::Null,
        };
        DetailRecord::empty().with_field("status", status)
      }
      Err(e) => DetailRecord::upstream(&e).with_field("status", Value::Null),
    }
  }

  pub async fn get_data_item(&self, name: Option<&str>, address: Option<&str>) -> DetailRecord {
    let name = name.map(str::trim).filter(|n| !n.is_empty());
    let address = address.map(str::trim).filter(|a| !a.is_empty());
    if name.is_none() && address.is_none() {
      return DetailRecord::invalid(&ValidationError::MissingOneOf(vec!["name", "address"]));
    }

    let mut request = RequestDescriptor::get("data/item");
    if let Some(name) = name {
      request = request.param("name", name);
    }
    if let Some(address) = address {
      request = request.param("address", address);
    }

    match self.detail(&request).await {
      Ok(payload) => flatten(payload, "data"),
      Err(e) => DetailRecord::upstream(&e),
    }
  }

  /// Read `size` bytes at `address`, rendered in `format`.
  pub async fn read_memory(&self, address: &str, size: i64, format: MemoryFormat) -> DetailRecord {
    let address = match non_empty("address", address) {
      Ok(address) => address,
      Err(e) => return DetailRecord::invalid(&e),
    };
    if !(1..=MAX_READ_SIZE).contains(&size) {
      return DetailRecord::invalid(&ValidationError::OutOfRange {
        field: "size".to_string(),
        min: 1,
        max: MAX_READ_SIZE,
      });
    }

    let request = RequestDescriptor::get("memory")
      .param("address", address)
      .param("size", size)
      .param("format", format.as_str());

    match self.detail(&request).await {
      Ok(payload) => {
        let data = if format.is_textual() {
          join_lines(payload)
        } else {
          payload
        };
        DetailRecord::empty()
          .with_field("address", address)
          .with_field("size", size)
          .with_field("format", format.as_str())
          .with_field("data", data)
      }
      Err(e) => DetailRecord::upstream(&e),
    }
  }

  pub async fn search_data_references(
    &self,
    address: Option<&str>,
    pattern: Option<&str>,
  ) -> DetailRecord {
    let address = address.map(str::trim).filter(|a| !a.is_empty());
    let pattern = pattern.map(str::trim).filter(|p| !p.is_empty());
    if address.is_none() && pattern.is_none() {
      return DetailRecord::invalid(&ValidationError::MissingOneOf(vec!["address", "pattern"]));
    }

    let mut request = RequestDescriptor::get("data/references");
    if let Some(address) = address {
      request = request.param("address", address);
    }
    if let Some(pattern) = pattern {
      request = request.param("pattern", pattern);
    }

    match self.detail(&request).await {
      Ok(Value::Array(references)) => DetailRecord::empty().with_field("references", references),
      Ok(Value::Object(map)) => DetailRecord::success(map),
      Ok(_) => DetailRecord::empty().with_field("references", Vec::<Value>::new()),
      Err(e) => DetailRecord::upstream(&e),
    }
  }

  /// Decompile by exact name. The endpoint takes the name as a raw text body.
  pub async fn decompile_function(&self, name: &str) -> DetailRecord {
    let name = match non_empty("name", name) {
      Ok(name) => name,
      Err(e) => return DetailRecord::invalid(&e),
    };

    let request = RequestDescriptor::post("decompile", Body::Text(name.to_string()));
    match self.detail(&request).await {
      Ok(payload) => {
        let code = match join_lines(payload) {
          Value::String(code) => code,
          other => other.to_string(),
        };
        DetailRecord::empty().with_field("code", code)
      }
      Err(e) => DetailRecord::upstream(&e),
    }
  }

  /// Callers of a function.
  ///
  /// The primary lookup tries GET first and falls back to POST with a raw
  /// text body. Callers reported without an address are then resolved one by
  /// one through the function search; a caller whose lookup fails, or finds
  /// no function of exactly that name, is left out rather than failing the
  /// whole result.
  pub async fn get_function_callers(&self, name: &str) -> DetailRecord {
    let name = match non_empty("name", name) {
      Ok(name) => name,
      Err(e) => return DetailRecord::invalid(&e),
    };

    let primary = RequestDescriptor::get("function/callers").param("name", name);
    let payload = match self.detail(&primary).await {
      Ok(payload) => payload,
      Err(e @ UpstreamError::Application(_)) => return DetailRecord::upstream(&e),
      Err(e) => {
        debug!(function = name, error = %e, "GET callers failed, retrying as POST");
        let fallback = RequestDescriptor::post("function/callers", Body::Text(name.to_string()));
        match self.detail(&fallback).await {
          Ok(payload) => payload,
          Err(e) => return DetailRecord::upstream(&e),
        }
      }
    };

    let (fields, entries) = match payload {
      Value::Object(mut map) => match map.remove("callers") {
        Some(Value::Array(entries)) => (map, entries),
        Some(other) => {
          map.insert("callers".to_string(), other);
          return DetailRecord::success(map).with_field("function", name);
        }
        None => return DetailRecord::success(map).with_field("function", name),
      },
      Value::Array(entries) => (Map::new(), entries),
      _ => return DetailRecord::failure("Unexpected response format"),
    };

    let callers: Vec<Value> = join_all(entries.into_iter().map(|entry| self.resolve_caller(entry)))
      .await
      .into_iter()
      .flatten()
      .collect();

    DetailRecord::success(fields)
      .with_field("function", name)
      .with_field("count", callers.len())
      .with_field("callers", callers)
  }

  /// Fill in the address of a caller entry. `None` drops the entry.
  async fn resolve_caller(&self, entry: Value) -> Option<Value> {
    let (caller, mut fields) = match entry {
      Value::String(caller) => (caller.trim().to_string(), Map::new()),
      Value::Object(map) => {
        if map.contains_key("address") {
          return Some(Value::Object(map));
        }
        match map.get("name").and_then(Value::as_str) {
          Some(caller) => (caller.trim().to_string(), map),
          None => return Some(Value::Object(map)),
        }
      }
      other => return Some(other),
    };
    if caller.is_empty() {
      return None;
    }

    let bounds = self.paging.clamp(PageRequest::default());
    let request = paged_request("searchFunctions", bounds).param("query", caller.as_str());
    let envelope = self.list(request, bounds).await;
    if !envelope.is_ok() {
      debug!(caller = %caller, error = ?envelope.error(), "caller lookup failed, omitting");
      return None;
    }

    let Some(found) = exact_match(envelope.into_items(), &caller) else {
      debug!(caller = %caller, "caller not found, omitting");
      return None;
    };

    fields.insert("name".to_string(), Value::String(caller));
    for (key, value) in found {
      fields.entry(key).or_insert(value);
    }
    Some(Value::Object(fields))
  }

  pub async fn overview(&self) -> DetailRecord {
    match self.detail(&RequestDescriptor::get("overview")).await {
      Ok(payload) => DetailRecord::empty().with_field("overview", payload),
      Err(e) => DetailRecord::upstream(&e),
    }
  }

  pub async fn get_binary_status(&self) -> DetailRecord {
    match self.detail(&RequestDescriptor::get("binary")).await {
      Ok(payload) => DetailRecord::empty().with_field("binary", payload),
      Err(e) => DetailRecord::upstream(&e),
    }
  }

  // ==========================================================================
  // Mutations (not cached)
  // ==========================================================================

  pub async fn rename_function(&self, old_name: &str, new_name: &str) -> DetailRecord {
    let (old_name, new_name) = match (non_empty("old_name", old_name), non_empty("new_name", new_name)) {
      (Ok(old_name), Ok(new_name)) => (old_name, new_name),
      (Err(e), _) | (_, Err(e)) => return DetailRecord::invalid(&e),
    };

    let body = Body::Form(vec![
      ("oldName".to_string(), old_name.to_string()),
      ("newName".to_string(), new_name.to_string()),
    ]);
    self
      .mutate(RequestDescriptor::post("renameFunction", body))
      .await
  }

  pub async fn rename_data(&self, address: &str, new_name: &str) -> DetailRecord {
    let (address, new_name) = match (non_empty("address", address), non_empty("new_name", new_name)) {
      (Ok(address), Ok(new_name)) => (address, new_name),
      (Err(e), _) | (_, Err(e)) => return DetailRecord::invalid(&e),
    };

    let body = Body::Form(vec![
      ("address".to_string(), address.to_string()),
      ("newName".to_string(), new_name.to_string()),
    ]);
    self.mutate(RequestDescriptor::post("renameData", body)).await
  }

  /// Load a binary. This endpoint takes a JSON body.
  pub async fn load_binary(&self, filepath: &str) -> DetailRecord {
    let filepath = match non_empty("filepath", filepath) {
      Ok(filepath) => filepath,
      Err(e) => return DetailRecord::invalid(&e),
    };

    let body = Body::Json(json!({ "filepath": filepath }));
    self.mutate(RequestDescriptor::post("load", body)).await
  }
}

fn paged_request(endpoint: &str, bounds: PageBounds) -> RequestDescriptor {
  RequestDescriptor::get(endpoint)
    .param("offset", bounds.offset)
    .param("limit", bounds.limit)
}

fn non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str, ValidationError> {
  let value = value.trim();
  if value.is_empty() {
    Err(ValidationError::EmptyField(field.to_string()))
  } else {
    Ok(value)
  }
}

/// Objects are flattened into the record; anything else lands under `field`.
fn flatten(payload: Value, field: &str) -> DetailRecord {
  match payload {
    Value::Object(map) => DetailRecord::success(map),
    other => DetailRecord::empty().with_field(field, other),
  }
}

/// Text that arrived through the line-splitting fallback, joined back up.
fn join_lines(payload: Value) -> Value {
  match payload {
    Value::Array(lines) if !lines.is_empty() && lines.iter().all(Value::is_string) => {
      let text: Vec<&str> = lines.iter().filter_map(Value::as_str).collect();
      Value::String(text.join("\n"))
    }
    other => other,
  }
}

fn with_data_defaults(item: Value) -> Value {
  match item {
    Value::Object(mut map) => {
      map.entry("name").or_insert_with(|| json!("unnamed"));
      map.entry("address").or_insert(Value::Null);
      map.entry("size").or_insert_with(|| json!(0));
      map.entry("type").or_insert_with(|| json!("unknown"));
      Value::Object(map)
    }
    other => other,
  }
}

/// The search result naming `name` exactly. Results may be nested under a
/// `matches` array. A substring hit is not a match: its address belongs to a
/// different function.
fn exact_match(items: Vec<Value>, name: &str) -> Option<Map<String, Value>> {
  let mut candidates: Vec<Map<String, Value>> = Vec::new();
  for item in items {
    if let Value::Object(mut map) = item {
      match map.remove("matches") {
        Some(Value::Array(inner)) => candidates.extend(inner.into_iter().filter_map(|v| match v {
          Value::Object(m) => Some(m),
          _ => None,
        })),
        Some(other) => {
          map.insert("matches".to_string(), other);
          candidates.push(map);
        }
        None => candidates.push(map),
      }
    }
  }

  candidates
    .into_iter()
    .find(|c| c.get("name").and_then(Value::as_str) == Some(name))
}

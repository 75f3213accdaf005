//! Line-delimited JSON request loop.
//!
//! Each input line is `{"operation": "...", "args": {...}, "id": ...}`; each
//! output line is the operation result, with `id` echoed back when given.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::binja::Dispatcher;

#[derive(Debug, Deserialize)]
struct LineRequest {
  operation: String,
  #[serde(default)]
  args: Value,
  #[serde(default)]
  id: Option<Value>,
}

/// Serve requests until the reader is exhausted. Returns the number handled.
pub async fn run<R, W>(dispatcher: &Dispatcher, reader: R, mut writer: W) -> Result<usize>
where
  R: AsyncBufRead + Unpin,
  W: AsyncWrite + Unpin,
{
  let mut lines = reader.lines();
  let mut handled = 0;
  info!("serving line-delimited requests");

  while let Some(line) = lines
    .next_line()
    .await
    .map_err(|e| eyre!("Failed to read request: {}", e))?
  {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }

    let response = handle_line(dispatcher, line).await;
    let mut out = serde_json::to_string(&response)
      .map_err(|e| eyre!("Failed to encode response: {}", e))?;
    out.push('\n');
    writer
      .write_all(out.as_bytes())
      .await
      .map_err(|e| eyre!("Failed to write response: {}", e))?;
    writer
      .flush()
      .await
      .map_err(|e| eyre!("Failed to write response: {}", e))?;
    handled += 1;
  }

  info!(handled, "input closed, stopping");
  Ok(handled)
}

async fn handle_line(dispatcher: &Dispatcher, line: &str) -> Value {
  let request: LineRequest = match serde_json::from_str(line) {
    Ok(request) => request,
    Err(e) => {
      warn!(error = %e, "malformed request line");
      return json!({
        "ok": false,
        "error": format!("Invalid request: {}", e),
        "reason": "invalid_request",
      });
    }
  };

  debug!(operation = %request.operation, "request received");
  let mut response = dispatcher.dispatch(&request.operation, request.args).await;
  if let (Some(id), Value::Object(map)) = (request.id, &mut response) {
    map.insert("id".to_string(), id);
  }
  response
}

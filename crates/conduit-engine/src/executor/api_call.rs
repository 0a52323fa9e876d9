use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use conduit_config::ApiCallConfig;
use conduit_connection::Connection;
use conduit_http::{HttpClient, HttpRequest};
use conduit_template::stringify;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::connections::RunConnections;
use crate::error::StepError;
use crate::executor::StepOutput;

/// Issues the HTTP request of an `api_call` node.
#[derive(Clone)]
pub struct ApiCallExecutor {
  http: Arc<dyn HttpClient>,
}

impl ApiCallExecutor {
  pub fn new(http: Arc<dyn HttpClient>) -> Self {
    Self { http }
  }

  #[instrument(
    name = "api_call",
    skip(self, config, connections),
    fields(method = %config.method)
  )]
  pub async fn execute(
    &self,
    node_id: &str,
    config: ApiCallConfig,
    connections: &RunConnections,
  ) -> Result<StepOutput, StepError> {
    let connection = match &config.connection_id {
      Some(connection_id) => Some(connections.get(connection_id).await?),
      None => None,
    };

    let request = build_request(node_id, config, connection.as_deref())?;
    debug!(url = %request.url, "sending request");

    let response = self.http.send(request).await?;
    let body = decode_body(&response.body);

    if !response.is_success() {
      return Err(StepError::NodeExecution {
        message: format!("HTTP {}", response.status),
        status: Some(response.status),
        body: Some(body),
      });
    }

    Ok(StepOutput::new(body))
  }
}

/// Build the outbound request.
///
/// Headers are layered: connection defaults, then connection auth, then the
/// node's own headers. Later layers replace earlier ones by name, ignoring
/// case. A `url` without a scheme is appended to the connection's `baseUrl`.
fn build_request(
  node_id: &str,
  config: ApiCallConfig,
  connection: Option<&Connection>,
) -> Result<HttpRequest, StepError> {
  let url = match connection.and_then(|c| c.base_url.as_deref()) {
    Some(base) if !config.url.contains("://") => join_url(base, &config.url),
    _ => config.url,
  };
  if url.trim().is_empty() {
    return Err(StepError::invalid_config(node_id, "url is empty"));
  }

  let mut headers = Vec::new();
  if let Some(connection) = connection {
    for (name, value) in &connection.default_headers {
      set_header(&mut headers, name, value.clone());
    }
    if let Some((name, value)) = connection.auth_header() {
      set_header(&mut headers, &name, value);
    }
  }
  for (name, value) in &config.headers {
    if !value.is_null() {
      set_header(&mut headers, name, stringify(value));
    }
  }

  Ok(HttpRequest {
    method: config.method.to_ascii_uppercase(),
    url,
    headers,
    body: config.body,
    timeout: config.timeout_ms.map(Duration::from_millis),
  })
}

fn join_url(base: &str, path: &str) -> String {
  if path.is_empty() {
    return base.to_string();
  }
  format!(
    "{}/{}",
    base.trim_end_matches('/'),
    path.trim_start_matches('/')
  )
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: String) {
  headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
  headers.push((name.to_string(), value));
}

/// Decode a response body: empty is `null`, JSON is parsed, anything else is
/// kept under `raw` with a `decodeFailed` flag. Text stays text; other bytes
/// are base64 encoded and marked with `"encoding": "base64"`.
fn decode_body(body: &[u8]) -> Value {
  if body.iter().all(u8::is_ascii_whitespace) {
    return Value::Null;
  }
  if let Ok(value) = serde_json::from_slice(body) {
    return value;
  }
  match std::str::from_utf8(body) {
    Ok(text) => serde_json::json!({
      "raw": text,
      "decodeFailed": true,
    }),
    Err(_) => serde_json::json!({
      "raw": STANDARD.encode(body),
      "encoding": "base64",
      "decodeFailed": true,
    }),
  }
}

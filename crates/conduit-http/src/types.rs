use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::HttpError;

/// An outbound request, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
  pub method: String,
  pub url: String,
  pub headers: Vec<(String, String)>,
  /// Sent as a JSON body when present.
  pub body: Option<serde_json::Value>,
  /// Overrides the client's default timeout.
  pub timeout: Option<Duration>,
}

impl HttpRequest {
  pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      method: method.into(),
      url: url.into(),
      headers: Vec::new(),
      body: None,
      timeout: None,
    }
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn json(mut self, body: serde_json::Value) -> Self {
    self.body = Some(body);
    self
  }
}

/// A response as received, body untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
  pub status: u16,
  /// Header names are lowercase.
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: body.into(),
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Issues outbound requests.
///
/// Non-2xx statuses are not errors at this level; callers decide what a
/// status means. Errors are reserved for requests that never got a response.
#[async_trait]
pub trait HttpClient: Send + Sync {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

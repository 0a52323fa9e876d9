use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::{debug, instrument};

use crate::error::HttpError;
use crate::types::{HttpClient, HttpRequest, HttpResponse};

/// Timeout applied when neither the request nor the client sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`HttpClient`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
  client: Client,
  default_timeout: Duration,
}

impl ReqwestClient {
  pub fn new(default_timeout: Duration) -> Self {
    Self {
      client: Client::new(),
      default_timeout,
    }
  }
}

impl Default for ReqwestClient {
  fn default() -> Self {
    Self::new(DEFAULT_TIMEOUT)
  }
}

#[async_trait]
impl HttpClient for ReqwestClient {
  #[instrument(name = "http_send", skip(self, request), fields(method = %request.method, url = %request.url))]
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
    let method = parse_method(&request.method)?;
    let url = url::Url::parse(&request.url).map_err(|source| HttpError::InvalidUrl {
      url: request.url.clone(),
      source,
    })?;
    let timeout = request.timeout.unwrap_or(self.default_timeout);

    let mut builder = self.client.request(method, url).timeout(timeout);
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await.map_err(|e| {
      if e.is_timeout() {
        HttpError::Timeout {
          url: request.url.clone(),
          timeout_ms: timeout.as_millis() as u64,
        }
      } else {
        HttpError::Transport(e)
      }
    })?;

    let status = response.status().as_u16();
    let headers: BTreeMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(k, v)| {
        v.to_str()
          .ok()
          .map(|val| (k.as_str().to_string(), val.to_string()))
      })
      .collect();
    let body = response.bytes().await?.to_vec();

    debug!(status, bytes = body.len(), "response received");

    Ok(HttpResponse {
      status,
      headers,
      body,
    })
  }
}

fn parse_method(method: &str) -> Result<Method, HttpError> {
  match method.to_uppercase().as_str() {
    "GET" => Ok(Method::GET),
    "POST" => Ok(Method::POST),
    "PUT" => Ok(Method::PUT),
    "DELETE" => Ok(Method::DELETE),
    "PATCH" => Ok(Method::PATCH),
    "HEAD" => Ok(Method::HEAD),
    "OPTIONS" => Ok(Method::OPTIONS),
    _ => Err(HttpError::InvalidMethod {
      method: method.to_string(),
    }),
  }
}

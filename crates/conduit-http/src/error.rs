use thiserror::Error;

/// Errors that can occur while issuing a request.
#[derive(Debug, Error)]
pub enum HttpError {
  #[error("unsupported HTTP method: {method}")]
  InvalidMethod { method: String },

  #[error("invalid url '{url}': {source}")]
  InvalidUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },

  #[error("request to {url} timed out after {timeout_ms}ms")]
  Timeout { url: String, timeout_ms: u64 },

  #[error("http transport error: {0}")]
  Transport(#[from] reqwest::Error),
}

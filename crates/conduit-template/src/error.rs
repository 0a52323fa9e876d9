use thiserror::Error;

/// Why a path did not lead to a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
  #[error("key '{key}' not found")]
  MissingKey { key: String },

  #[error("index {index} out of range (length {len})")]
  IndexOutOfRange { index: usize, len: usize },

  #[error("cannot read '{segment}' from a {found}")]
  NotTraversable { segment: String, found: &'static str },
}

/// Errors raised while resolving a config tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
  #[error("invalid path '{path}': {message}")]
  InvalidPath { path: String, message: String },

  #[error("path '{path}' did not resolve: {source}")]
  Unresolved {
    path: String,
    #[source]
    source: LookupError,
  },
}

impl TemplateError {
  /// The offending path as written in the placeholder.
  pub fn path(&self) -> &str {
    match self {
      TemplateError::InvalidPath { path, .. } | TemplateError::Unresolved { path, .. } => path,
    }
  }
}

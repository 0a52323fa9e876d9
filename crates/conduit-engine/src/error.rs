//! Engine error types.
//!
//! [`StepError`] is node-scoped: it is caught at the node boundary and ends up
//! in the execution record. [`EngineError`] is run-scoped and is the only kind
//! of failure `run` ever returns to its caller.

use conduit_connection::ConnectionError;
use conduit_http::HttpError;
use conduit_store::StoreError;
use conduit_template::TemplateError;
use conduit_workflow::ValidationError;

/// Errors that fail a single node.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
  /// A `{{path}}` in the node's config did not resolve.
  #[error("template resolution failed for node '{node_id}' at '{path}': {reason}")]
  TemplateResolution {
    node_id: String,
    path: String,
    reason: String,
  },

  /// The referenced connection does not exist.
  #[error("unknown connection '{connection_id}'")]
  UnknownConnection { connection_id: String },

  /// The step ran and failed: non-2xx response, transport failure, provider
  /// failure.
  #[error("{message}")]
  NodeExecution {
    message: String,
    status: Option<u16>,
    body: Option<serde_json::Value>,
  },

  /// The resolved config does not fit the node kind.
  #[error("invalid config for node '{node_id}': {message}")]
  InvalidConfig { node_id: String, message: String },

  /// The node or the run ran out of time.
  #[error("timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },

  /// The run was cancelled while the node was in flight.
  #[error("execution cancelled")]
  Cancelled,
}

impl StepError {
  pub(crate) fn template(node_id: &str, error: TemplateError) -> Self {
    let reason = match &error {
      TemplateError::InvalidPath { message, .. } => message.clone(),
      TemplateError::Unresolved { source, .. } => source.to_string(),
    };
    StepError::TemplateResolution {
      node_id: node_id.to_string(),
      path: error.path().to_string(),
      reason,
    }
  }

  pub(crate) fn invalid_config(node_id: &str, message: impl ToString) -> Self {
    StepError::InvalidConfig {
      node_id: node_id.to_string(),
      message: message.to_string(),
    }
  }

  pub(crate) fn execution(message: impl Into<String>) -> Self {
    StepError::NodeExecution {
      message: message.into(),
      status: None,
      body: None,
    }
  }
}

impl From<HttpError> for StepError {
  fn from(error: HttpError) -> Self {
    match error {
      HttpError::Timeout { timeout_ms, .. } => StepError::Timeout { timeout_ms },
      other => StepError::execution(other.to_string()),
    }
  }
}

impl From<ConnectionError> for StepError {
  fn from(error: ConnectionError) -> Self {
    StepError::execution(error.to_string())
  }
}

/// Errors that abort a run before any node executes.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// The flow is structurally invalid.
  #[error("invalid flow: {0}")]
  Validation(#[from] ValidationError),

  #[error("flow '{flow_id}' not found")]
  FlowNotFound { flow_id: String },

  /// The flow exists but is switched off.
  #[error("flow '{flow_id}' is disabled")]
  FlowDisabled { flow_id: String },

  #[error("node '{node_id}' not found in flow")]
  NodeNotFound { node_id: String },

  /// Running by id needs a flow store.
  #[error("no flow store configured")]
  NoFlowStore,

  #[error("store error: {0}")]
  Store(#[from] StoreError),
}

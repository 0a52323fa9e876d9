//! The execution record: what a run returns and what gets persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use conduit_store::{ExecutionStatus, Json, StoredExecution};
use serde::{Deserialize, Serialize};

use crate::error::StepError;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Success,
  Failed,
  Partial,
}

impl From<RunStatus> for ExecutionStatus {
  fn from(status: RunStatus) -> Self {
    match status {
      RunStatus::Success => ExecutionStatus::Success,
      RunStatus::Failed => ExecutionStatus::Failed,
      RunStatus::Partial => ExecutionStatus::Partial,
    }
  }
}

/// Category of a node failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  TemplateResolution,
  UnknownConnection,
  NodeExecution,
  InvalidConfig,
  Timeout,
  Cancelled,
}

/// A node failure as recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeError {
  pub kind: ErrorKind,
  pub message: String,
  /// HTTP status, when the failure came with a response.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<u16>,
  /// Decoded response body, when the failure came with a response.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<serde_json::Value>,
}

impl From<StepError> for NodeError {
  fn from(error: StepError) -> Self {
    let message = error.to_string();
    let (kind, status, body) = match error {
      StepError::TemplateResolution { .. } => (ErrorKind::TemplateResolution, None, None),
      StepError::UnknownConnection { .. } => (ErrorKind::UnknownConnection, None, None),
      StepError::NodeExecution { status, body, .. } => (ErrorKind::NodeExecution, status, body),
      StepError::InvalidConfig { .. } => (ErrorKind::InvalidConfig, None, None),
      StepError::Timeout { .. } => (ErrorKind::Timeout, None, None),
      StepError::Cancelled => (ErrorKind::Cancelled, None, None),
    };
    Self {
      kind,
      message,
      status,
      body,
    }
  }
}

/// Why a node never ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkipReason {
  /// A direct predecessor did not succeed.
  Upstream {
    #[serde(rename = "nodeId")]
    node_id: String,
  },
  /// The run was cancelled or timed out before the node was scheduled.
  Aborted,
}

/// Terminal state of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeOutcome {
  Succeeded {
    output: serde_json::Value,
    /// Non-fatal anomalies, such as transform paths that were not found.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
  },
  Failed {
    error: NodeError,
  },
  Skipped {
    reason: SkipReason,
  },
}

impl NodeOutcome {
  pub fn is_succeeded(&self) -> bool {
    matches!(self, NodeOutcome::Succeeded { .. })
  }

  pub fn output(&self) -> Option<&serde_json::Value> {
    match self {
      NodeOutcome::Succeeded { output, .. } => Some(output),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&NodeError> {
    match self {
      NodeOutcome::Failed { error } => Some(error),
      _ => None,
    }
  }

  /// The value published under `step_<id>` once the node has settled.
  pub(crate) fn context_value(&self) -> Option<serde_json::Value> {
    match self {
      NodeOutcome::Succeeded { output, .. } => Some(output.clone()),
      NodeOutcome::Failed { error } => serde_json::to_value(error)
        .ok()
        .map(|error| serde_json::json!({ "error": error })),
      NodeOutcome::Skipped { .. } => None,
    }
  }
}

/// The structured outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
  pub execution_id: String,
  pub flow_id: String,
  pub status: RunStatus,
  /// Terminal state of every reachable node, keyed by node id.
  pub results: BTreeMap<String, NodeOutcome>,
  /// Nodes no path from the trigger leads to. They never run.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub unreachable: Vec<String>,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
  pub fn outcome(&self, node_id: &str) -> Option<&NodeOutcome> {
    self.results.get(node_id)
  }

  /// Output of a node that succeeded.
  pub fn output(&self, node_id: &str) -> Option<&serde_json::Value> {
    self.outcome(node_id).and_then(NodeOutcome::output)
  }

  /// Convert into the persisted form.
  pub fn to_stored(&self) -> Result<StoredExecution, serde_json::Error> {
    Ok(StoredExecution {
      execution_id: self.execution_id.clone(),
      flow_id: self.flow_id.clone(),
      status: self.status.into(),
      results: Json(serde_json::to_value(&self.results)?),
      unreachable: Json(self.unreachable.clone()),
      started_at: self.started_at,
      finished_at: self.finished_at,
    })
  }
}

/// Decide the run status from the entry outcome and the outcomes of the
/// reachable sinks (nodes with no reachable successor).
///
/// Any failure upstream of a sink leaves that sink failed or skipped, so
/// "every sink succeeded" is the same as "every reachable node succeeded".
pub(crate) fn finalize_status<'a>(
  entry: Option<&NodeOutcome>,
  sinks: impl IntoIterator<Item = Option<&'a NodeOutcome>>,
) -> RunStatus {
  if !entry.is_some_and(NodeOutcome::is_succeeded) {
    return RunStatus::Failed;
  }

  let (mut succeeded, mut total) = (0usize, 0usize);
  for sink in sinks {
    total += 1;
    if sink.is_some_and(NodeOutcome::is_succeeded) {
      succeeded += 1;
    }
  }

  if succeeded == total {
    RunStatus::Success
  } else if succeeded == 0 {
    RunStatus::Failed
  } else {
    RunStatus::Partial
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn ok() -> NodeOutcome {
    NodeOutcome::Succeeded {
      output: json!({}),
      warnings: vec![],
    }
  }

  fn failed() -> NodeOutcome {
    NodeOutcome::Failed {
      error: StepError::execution("HTTP 500").into(),
    }
  }

  fn skipped() -> NodeOutcome {
    NodeOutcome::Skipped {
      reason: SkipReason::Upstream {
        node_id: "a".to_string(),
      },
    }
  }

  #[test]
  fn test_status_success_when_all_sinks_succeed() {
    let (entry, a, b) = (ok(), ok(), ok());
    assert_eq!(
      finalize_status(Some(&entry), [Some(&a), Some(&b)]),
      RunStatus::Success
    );
  }

  #[test]
  fn test_status_trigger_only_flow() {
    let entry = ok();
    assert_eq!(
      finalize_status(Some(&entry), [Some(&entry)]),
      RunStatus::Success
    );
  }

  #[test]
  fn test_status_partial_on_mixed_branches() {
    let (entry, a, b) = (ok(), failed(), ok());
    assert_eq!(
      finalize_status(Some(&entry), [Some(&a), Some(&b)]),
      RunStatus::Partial
    );
  }

  #[test]
  fn test_status_failed_when_no_branch_succeeds() {
    let (entry, a, b) = (ok(), failed(), skipped());
    assert_eq!(
      finalize_status(Some(&entry), [Some(&a), Some(&b)]),
      RunStatus::Failed
    );
  }

  #[test]
  fn test_status_failed_when_trigger_fails() {
    let entry = failed();
    assert_eq!(
      finalize_status(Some(&entry), [Some(&entry)]),
      RunStatus::Failed
    );
    assert_eq!(
      finalize_status(None, Vec::<Option<&NodeOutcome>>::new()),
      RunStatus::Failed
    );
  }

  #[test]
  fn test_outcome_serialization() {
    let outcome = NodeOutcome::Failed {
      error: StepError::NodeExecution {
        message: "HTTP 500".to_string(),
        status: Some(500),
        body: Some(json!({ "error": "boom" })),
      }
      .into(),
    };

    assert_eq!(
      serde_json::to_value(&outcome).unwrap(),
      json!({
        "status": "failed",
        "error": {
          "kind": "node_execution",
          "message": "HTTP 500",
          "status": 500,
          "body": { "error": "boom" }
        }
      })
    );
    assert_eq!(
      serde_json::to_value(skipped()).unwrap(),
      json!({ "status": "skipped", "reason": { "type": "upstream", "nodeId": "a" } })
    );
  }

  #[test]
  fn test_to_stored() {
    let now = Utc::now();
    let result = ExecutionResult {
      execution_id: "exec".to_string(),
      flow_id: "flow".to_string(),
      status: RunStatus::Partial,
      results: BTreeMap::from([("start".to_string(), ok())]),
      unreachable: vec!["orphan".to_string()],
      started_at: now,
      finished_at: now,
    };

    let stored = result.to_stored().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Partial);
    assert_eq!(stored.results.0["start"]["status"], "succeeded");
    assert_eq!(stored.unreachable.0, vec!["orphan".to_string()]);
  }
}

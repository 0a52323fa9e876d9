use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Terminal status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Success,
  Failed,
  Partial,
}

/// An execution as stored.
///
/// Per-node results are kept as one JSON document so records can be replayed
/// exactly as they were returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StoredExecution {
  pub execution_id: String,
  pub flow_id: String,
  pub status: ExecutionStatus,
  pub results: Json<serde_json::Value>,
  pub unreachable: Json<Vec<String>>,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

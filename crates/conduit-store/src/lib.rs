//! Conduit Store
//!
//! Storage collaborators of the engine:
//! - [`FlowStore`] hands out flow snapshots by id (scoped to an organization
//!   when listing)
//! - [`ExecutionStore`] keeps finished execution records for audit and replay
//!
//! Neither is needed for a run to be correct; the engine works on a flow
//! snapshot and returns its record whether or not it was persisted.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use sqlx::types::Json;
pub use types::{ExecutionStatus, StoredExecution};

use async_trait::async_trait;
use conduit_config::FlowDef;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Running migrations failed.
  #[error("migration error: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),
}

/// CRUD access to flow documents.
#[async_trait]
pub trait FlowStore: Send + Sync {
  /// Create or replace a flow.
  async fn put_flow(&self, flow: &FlowDef) -> Result<(), StoreError>;

  /// Get a flow by ID.
  async fn get_flow(&self, flow_id: &str) -> Result<FlowDef, StoreError>;

  /// Delete a flow by ID.
  async fn delete_flow(&self, flow_id: &str) -> Result<(), StoreError>;

  /// List flows, optionally restricted to one organization.
  async fn list_flows(&self, organization_id: Option<&str>) -> Result<Vec<FlowDef>, StoreError>;
}

/// Persistence for finished executions.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
  /// Persist a finished execution.
  async fn save_execution(&self, execution: &StoredExecution) -> Result<(), StoreError>;

  /// Get an execution by ID.
  async fn get_execution(&self, execution_id: &str) -> Result<StoredExecution, StoreError>;

  /// List executions of a flow, newest first.
  async fn list_executions(&self, flow_id: &str) -> Result<Vec<StoredExecution>, StoreError>;
}

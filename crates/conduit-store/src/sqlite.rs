use async_trait::async_trait;
use chrono::Utc;
use conduit_config::FlowDef;
use sqlx::SqlitePool;
use sqlx::types::Json;

use crate::types::StoredExecution;
use crate::{ExecutionStore, FlowStore, StoreError};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Connect to `url` (e.g. `sqlite://conduit.db?mode=rwc`) and migrate.
  pub async fn connect(url: &str) -> Result<Self, StoreError> {
    let pool = SqlitePool::connect(url).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }
}

#[async_trait]
impl FlowStore for SqliteStore {
  async fn put_flow(&self, flow: &FlowDef) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT INTO flows (flow_id, organization_id, definition, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (flow_id) DO UPDATE
            SET organization_id = excluded.organization_id,
                definition = excluded.definition,
                updated_at = excluded.updated_at
            "#,
    )
    .bind(&flow.id)
    .bind(&flow.organization_id)
    .bind(Json(flow))
    .bind(Utc::now())
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_flow(&self, flow_id: &str) -> Result<FlowDef, StoreError> {
    let row: Option<(Json<FlowDef>,)> = sqlx::query_as(
      r#"
            SELECT definition
            FROM flows
            WHERE flow_id = ?
            "#,
    )
    .bind(flow_id)
    .fetch_optional(&self.pool)
    .await?;

    row
      .map(|(definition,)| definition.0)
      .ok_or_else(|| StoreError::NotFound(format!("flow {}", flow_id)))
  }

  async fn delete_flow(&self, flow_id: &str) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM flows WHERE flow_id = ?")
      .bind(flow_id)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(StoreError::NotFound(format!("flow {}", flow_id)));
    }
    Ok(())
  }

  async fn list_flows(&self, organization_id: Option<&str>) -> Result<Vec<FlowDef>, StoreError> {
    let rows: Vec<(Json<FlowDef>,)> = sqlx::query_as(
      r#"
            SELECT definition
            FROM flows
            WHERE ? IS NULL OR organization_id = ?
            ORDER BY flow_id
            "#,
    )
    .bind(organization_id)
    .bind(organization_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(|(definition,)| definition.0).collect())
  }
}

#[async_trait]
impl ExecutionStore for SqliteStore {
  async fn save_execution(&self, execution: &StoredExecution) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT INTO executions (execution_id, flow_id, status, results, unreachable, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&execution.execution_id)
    .bind(&execution.flow_id)
    .bind(execution.status)
    .bind(&execution.results)
    .bind(&execution.unreachable)
    .bind(execution.started_at)
    .bind(execution.finished_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<StoredExecution, StoreError> {
    sqlx::query_as(
      r#"
            SELECT execution_id, flow_id, status, results, unreachable, started_at, finished_at
            FROM executions
            WHERE execution_id = ?
            "#,
    )
    .bind(execution_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| StoreError::NotFound(format!("execution {}", execution_id)))
  }

  async fn list_executions(&self, flow_id: &str) -> Result<Vec<StoredExecution>, StoreError> {
    let executions = sqlx::query_as(
      r#"
            SELECT execution_id, flow_id, status, results, unreachable, started_at, finished_at
            FROM executions
            WHERE flow_id = ?
            ORDER BY started_at DESC
            "#,
    )
    .bind(flow_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(executions)
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use serde_json::json;
  use sqlx::sqlite::SqlitePoolOptions;

  use super::*;
  use crate::ExecutionStatus;

  async fn store() -> SqliteStore {
    // A single connection so every query sees the same in-memory database.
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await
      .unwrap();
    let store = SqliteStore::new(pool);
    store.migrate().await.unwrap();
    store
  }

  #[tokio::test]
  async fn test_flow_upsert_and_list() {
    let store = store().await;

    let mut flow = FlowDef::new("f1", "first");
    flow.organization_id = Some("org".to_string());
    store.put_flow(&flow).await.unwrap();

    flow.name = "renamed".to_string();
    store.put_flow(&flow).await.unwrap();
    store.put_flow(&FlowDef::new("f2", "second")).await.unwrap();

    assert_eq!(store.get_flow("f1").await.unwrap().name, "renamed");
    assert_eq!(store.list_flows(None).await.unwrap().len(), 2);
    assert_eq!(store.list_flows(Some("org")).await.unwrap().len(), 1);

    store.delete_flow("f2").await.unwrap();
    assert!(matches!(
      store.get_flow("f2").await,
      Err(StoreError::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn test_execution_round_trip() {
    let store = store().await;
    let now = Utc::now();
    let execution = StoredExecution {
      execution_id: "exec-1".to_string(),
      flow_id: "f1".to_string(),
      status: ExecutionStatus::Partial,
      results: Json(json!({ "start": { "status": "succeeded", "output": {} } })),
      unreachable: Json(vec!["orphan".to_string()]),
      started_at: now,
      finished_at: now,
    };

    store.save_execution(&execution).await.unwrap();

    let loaded = store.get_execution("exec-1").await.unwrap();
    assert_eq!(loaded.status, ExecutionStatus::Partial);
    assert_eq!(loaded.results, execution.results);
    assert_eq!(loaded.unreachable.0, vec!["orphan".to_string()]);
    assert_eq!(store.list_executions("f1").await.unwrap().len(), 1);
    assert!(store.get_execution("missing").await.is_err());
  }
}

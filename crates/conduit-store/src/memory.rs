use std::collections::HashMap;

use async_trait::async_trait;
use conduit_config::FlowDef;
use tokio::sync::RwLock;

use crate::types::StoredExecution;
use crate::{ExecutionStore, FlowStore, StoreError};

/// In-memory flow and execution store.
#[derive(Debug, Default)]
pub struct MemoryStore {
  flows: RwLock<HashMap<String, FlowDef>>,
  executions: RwLock<HashMap<String, StoredExecution>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl FlowStore for MemoryStore {
  async fn put_flow(&self, flow: &FlowDef) -> Result<(), StoreError> {
    self
      .flows
      .write()
      .await
      .insert(flow.id.clone(), flow.clone());
    Ok(())
  }

  async fn get_flow(&self, flow_id: &str) -> Result<FlowDef, StoreError> {
    self
      .flows
      .read()
      .await
      .get(flow_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("flow {}", flow_id)))
  }

  async fn delete_flow(&self, flow_id: &str) -> Result<(), StoreError> {
    self
      .flows
      .write()
      .await
      .remove(flow_id)
      .map(|_| ())
      .ok_or_else(|| StoreError::NotFound(format!("flow {}", flow_id)))
  }

  async fn list_flows(&self, organization_id: Option<&str>) -> Result<Vec<FlowDef>, StoreError> {
    let flows = self.flows.read().await;
    let mut matching: Vec<FlowDef> = flows
      .values()
      .filter(|flow| organization_id.is_none() || flow.organization_id.as_deref() == organization_id)
      .cloned()
      .collect();
    matching.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(matching)
  }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
  async fn save_execution(&self, execution: &StoredExecution) -> Result<(), StoreError> {
    self
      .executions
      .write()
      .await
      .insert(execution.execution_id.clone(), execution.clone());
    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<StoredExecution, StoreError> {
    self
      .executions
      .read()
      .await
      .get(execution_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("execution {}", execution_id)))
  }

  async fn list_executions(&self, flow_id: &str) -> Result<Vec<StoredExecution>, StoreError> {
    let executions = self.executions.read().await;
    let mut matching: Vec<StoredExecution> = executions
      .values()
      .filter(|execution| execution.flow_id == flow_id)
      .cloned()
      .collect();
    matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Ok(matching)
  }
}

//! The orchestrator.
//!
//! A run validates and locks the flow, then walks its layers: every node in a
//! layer depends only on nodes in earlier layers, so a layer is a batch of
//! independent nodes. Computation-only steps run inline; `api_call` steps are
//! spawned onto a pool bounded by [`EngineConfig::max_concurrency`]. Results
//! are published to the context once the whole layer has settled, in
//! declaration order, so what a node sees never depends on timing.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use conduit_config::{ApiCallConfig, FlowDef, NodeDef, NodeKind, StepConfig};
use conduit_connection::ConnectionProvider;
use conduit_http::HttpClient;
use conduit_store::{ExecutionStore, FlowStore, StoreError};
use conduit_template::Scope;
use conduit_workflow::Workflow;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::connections::RunConnections;
use crate::context::ExecutionContext;
use crate::error::{EngineError, StepError};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::executor::{self, ApiCallExecutor, StepOutput};
use crate::record::{ExecutionResult, NodeOutcome, SkipReason, finalize_status};

/// The flow execution engine.
///
/// Collaborators are injected: connections and HTTP are required, stores and
/// the notifier are optional. Generic over `N: ExecutionNotifier` the same
/// way a run's observers are; [`Engine::new`] discards events.
pub struct Engine<N: ExecutionNotifier = NoopNotifier> {
  config: EngineConfig,
  connections: Arc<dyn ConnectionProvider>,
  api: ApiCallExecutor,
  flows: Option<Arc<dyn FlowStore>>,
  executions: Option<Arc<dyn ExecutionStore>>,
  notifier: N,
}

impl Engine<NoopNotifier> {
  pub fn new(connections: Arc<dyn ConnectionProvider>, http: Arc<dyn HttpClient>) -> Self {
    Self {
      config: EngineConfig::default(),
      connections,
      api: ApiCallExecutor::new(http),
      flows: None,
      executions: None,
      notifier: NoopNotifier,
    }
  }
}

impl<N: ExecutionNotifier> Engine<N> {
  pub fn with_config(mut self, config: EngineConfig) -> Self {
    self.config = config;
    self
  }

  /// Source of flow snapshots for [`Engine::run_flow`].
  pub fn with_flow_store(mut self, flows: Arc<dyn FlowStore>) -> Self {
    self.flows = Some(flows);
    self
  }

  /// Where finished records are persisted.
  pub fn with_execution_store(mut self, executions: Arc<dyn ExecutionStore>) -> Self {
    self.executions = Some(executions);
    self
  }

  pub fn with_notifier<M: ExecutionNotifier>(self, notifier: M) -> Engine<M> {
    Engine {
      config: self.config,
      connections: self.connections,
      api: self.api,
      flows: self.flows,
      executions: self.executions,
      notifier,
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Load a flow by id and run it.
  #[instrument(name = "run_flow", skip(self, payload, cancel))]
  pub async fn run_flow(
    &self,
    flow_id: &str,
    payload: Value,
    cancel: CancellationToken,
  ) -> Result<ExecutionResult, EngineError> {
    let flows = self.flows.as_ref().ok_or(EngineError::NoFlowStore)?;
    let flow = flows.get_flow(flow_id).await.map_err(|e| match e {
      StoreError::NotFound(_) => EngineError::FlowNotFound {
        flow_id: flow_id.to_string(),
      },
      other => EngineError::Store(other),
    })?;

    self.run(&flow, payload, cancel).await
  }

  /// Run a flow snapshot to completion.
  ///
  /// Fails only before execution starts: when the flow is disabled or
  /// structurally invalid. Node failures are recorded in the returned
  /// [`ExecutionResult`].
  #[instrument(
    name = "run",
    skip(self, flow, payload, cancel),
    fields(flow_id = %flow.id)
  )]
  pub async fn run(
    &self,
    flow: &FlowDef,
    payload: Value,
    cancel: CancellationToken,
  ) -> Result<ExecutionResult, EngineError> {
    if !flow.is_enabled {
      return Err(EngineError::FlowDisabled {
        flow_id: flow.id.clone(),
      });
    }

    let workflow = Workflow::lock(flow).inspect_err(|e| {
      error!(flow_id = %flow.id, error = %e, "flow validation failed");
    })?;

    let result = self.execute(&workflow, payload, &cancel).await;
    self.persist(&result).await;
    Ok(result)
  }

  /// Execute one node against a caller-supplied context.
  ///
  /// For trying out a step while editing a flow: the flow is not validated
  /// and nothing is persisted. `context` takes the same shape a run builds
  /// (`trigger.input`, `step_<id>`, ...).
  #[instrument(
    name = "run_node",
    skip(self, flow, context, cancel),
    fields(flow_id = %flow.id)
  )]
  pub async fn run_node(
    &self,
    flow: &FlowDef,
    node_id: &str,
    context: serde_json::Map<String, Value>,
    cancel: CancellationToken,
  ) -> Result<NodeOutcome, EngineError> {
    let node = flow
      .nodes()
      .iter()
      .find(|node| node.id == node_id)
      .ok_or_else(|| EngineError::NodeNotFound {
        node_id: node_id.to_string(),
      })?;

    let context = ExecutionContext::from_map(context);
    let connections = RunConnections::lazy(self.connections.clone());

    info!(node_id, "run_node_started");

    let result = match prepare(node, &context, &context.payload()) {
      Ok(Prepared::Done(output)) => Ok(output),
      Ok(Prepared::Call(config)) => {
        let timeout_ms = self.config.node_timeout_ms(node);
        tokio::select! {
          result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.api.execute(&node.id, config, &connections),
          ) => result.unwrap_or_else(|_| Err(StepError::Timeout { timeout_ms })),
          _ = cancel.cancelled() => Err(StepError::Cancelled),
        }
      }
      Err(e) => Err(e),
    };

    let outcome = outcome_of(result).0;
    match &outcome {
      NodeOutcome::Failed { error } => {
        error!(node_id, error = %error.message, "run_node_failed");
      }
      _ => info!(node_id, "run_node_completed"),
    }
    Ok(outcome)
  }

  async fn execute(
    &self,
    workflow: &Workflow,
    payload: Value,
    cancel: &CancellationToken,
  ) -> ExecutionResult {
    let execution_id = uuid::Uuid::new_v4().to_string();
    let started_at = Utc::now();

    info!(
      execution_id = %execution_id,
      flow_id = %workflow.flow_id,
      trigger_payload = %payload,
      "run_started"
    );
    self.notifier.notify(ExecutionEvent::RunStarted {
      execution_id: execution_id.clone(),
      flow_id: workflow.flow_id.clone(),
    });

    let deadline = self.config.run_timeout().map(|timeout| Instant::now() + timeout);
    let (connections, mut aborted) = self
      .prefetch_connections(workflow, &execution_id, cancel, deadline)
      .await;
    let connections = Arc::new(connections);

    let mut context = ExecutionContext::new(payload);
    for (connection_id, connection) in connections.resolved() {
      context.insert_connection(connection_id, connection.public_view());
    }

    let mut run = RunState {
      execution_id,
      states: vec![NodeState::Pending; workflow.nodes().len()],
    };
    let semaphore = Arc::new(Semaphore::new(self.config.concurrency()));

    for layer in workflow.layers() {
      if aborted.is_none() {
        aborted = Abort::check(cancel, deadline);
      }

      let mut ready = Vec::with_capacity(layer.len());
      for &idx in layer {
        let blocked = match aborted {
          Some(_) => Some(SkipReason::Aborted),
          None => blocked_by(workflow, &run.states, idx),
        };
        match blocked {
          Some(reason) => self.settle(&mut run, workflow, idx, NodeOutcome::Skipped { reason }),
          None => ready.push(idx),
        }
      }

      let mut settled: Vec<(usize, Result<StepOutput, StepError>)> = Vec::new();
      let mut in_flight = FuturesUnordered::new();
      let mut handles = Vec::new();

      for idx in ready {
        let node = workflow.node(idx);
        self.start(&mut run, node, idx);

        let upstream = workflow
          .graph()
          .upstream(idx)
          .iter()
          .map(|&up| workflow.node(up).id.as_str());
        let scope = context.scope(upstream);

        match prepare(node, &scope, &context.payload()) {
          Ok(Prepared::Done(output)) => settled.push((idx, Ok(output))),
          Err(e) => settled.push((idx, Err(e))),
          Ok(Prepared::Call(config)) => {
            let handle = self.spawn_call(node, config, &connections, &semaphore);
            handles.push((idx, handle.abort_handle()));
            in_flight.push(async move { (idx, handle.await) });
          }
        }
      }

      while !in_flight.is_empty() {
        tokio::select! {
          Some((idx, joined)) = in_flight.next() => {
            let result = joined.unwrap_or_else(|e| {
              Err(StepError::execution(format!("node task failed: {}", e)))
            });
            settled.push((idx, result));
          }
          _ = cancel.cancelled() => {
            warn!(execution_id = %run.execution_id, "run cancelled with nodes in flight");
            aborted = Some(Abort::Cancelled);
            break;
          }
          _ = deadline_elapsed(deadline) => {
            warn!(execution_id = %run.execution_id, "run timed out with nodes in flight");
            aborted = Some(Abort::Timeout);
            break;
          }
        }
      }

      if let Some(abort) = aborted {
        for (idx, handle) in handles {
          if settled.iter().all(|(done, _)| *done != idx) {
            handle.abort();
            settled.push((idx, Err(abort.error(&self.config))));
          }
        }
      }

      // Publish in declaration order.
      settled.sort_by_key(|(idx, _)| *idx);
      for (idx, result) in settled {
        let (outcome, aliases) = outcome_of(result);
        if let Some(value) = outcome.context_value() {
          let node_id = &workflow.node(idx).id;
          if !context.insert_step(node_id, value) {
            warn!(node_id = %node_id, "step value already published, keeping the first");
          }
          context.bind_aliases(node_id, aliases);
        }
        self.settle(&mut run, workflow, idx, outcome);
      }
    }

    self.finish(workflow, run, started_at)
  }

  /// Prefetch the flow's literal connection ids. The run deadline and the
  /// cancellation token apply here too; an abort leaves nothing prefetched.
  async fn prefetch_connections(
    &self,
    workflow: &Workflow,
    execution_id: &str,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
  ) -> (RunConnections, Option<Abort>) {
    let fetched = match Abort::check(cancel, deadline) {
      Some(abort) => Err(abort),
      None => {
        let prefetch =
          RunConnections::prefetch(self.connections.clone(), literal_connection_ids(workflow));
        tokio::select! {
          connections = prefetch => Ok(connections),
          _ = cancel.cancelled() => Err(Abort::Cancelled),
          _ = deadline_elapsed(deadline) => Err(Abort::Timeout),
        }
      }
    };

    match fetched {
      Ok(connections) => (connections, None),
      Err(abort) => {
        warn!(execution_id, reason = ?abort, "run aborted before any node started");
        (RunConnections::lazy(self.connections.clone()), Some(abort))
      }
    }
  }

  fn spawn_call(
    &self,
    node: &NodeDef,
    config: ApiCallConfig,
    connections: &Arc<RunConnections>,
    semaphore: &Arc<Semaphore>,
  ) -> tokio::task::JoinHandle<Result<StepOutput, StepError>> {
    let api = self.api.clone();
    let connections = connections.clone();
    let semaphore = semaphore.clone();
    let node_id = node.id.clone();
    let timeout_ms = self.config.node_timeout_ms(node);

    tokio::spawn(async move {
      let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| StepError::Cancelled)?;

      tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        api.execute(&node_id, config, &connections),
      )
      .await
      .unwrap_or_else(|_| Err(StepError::Timeout { timeout_ms }))
    })
  }

  fn start(&self, run: &mut RunState, node: &NodeDef, idx: usize) {
    run.states[idx] = NodeState::Running;
    info!(
      execution_id = %run.execution_id,
      node_id = %node.id,
      kind = %node.kind,
      "node_started"
    );
    self.notifier.notify(ExecutionEvent::NodeStarted {
      execution_id: run.execution_id.clone(),
      node_id: node.id.clone(),
    });
  }

  fn settle(&self, run: &mut RunState, workflow: &Workflow, idx: usize, outcome: NodeOutcome) {
    let node_id = workflow.node(idx).id.clone();
    let execution_id = run.execution_id.clone();

    let event = match &outcome {
      NodeOutcome::Succeeded { output, warnings } => {
        info!(
          execution_id = %execution_id,
          node_id = %node_id,
          warnings = warnings.len(),
          "node_completed"
        );
        ExecutionEvent::NodeSucceeded {
          execution_id,
          node_id,
          output: output.clone(),
        }
      }
      NodeOutcome::Failed { error } => {
        error!(
          execution_id = %execution_id,
          node_id = %node_id,
          error = %error.message,
          "node_failed"
        );
        ExecutionEvent::NodeFailed {
          execution_id,
          node_id,
          error: error.clone(),
        }
      }
      NodeOutcome::Skipped { reason } => {
        info!(
          execution_id = %execution_id,
          node_id = %node_id,
          reason = ?reason,
          "node_skipped"
        );
        ExecutionEvent::NodeSkipped {
          execution_id,
          node_id,
          reason: reason.clone(),
        }
      }
    };

    run.states[idx] = NodeState::Settled(outcome);
    self.notifier.notify(event);
  }

  fn finish(
    &self,
    workflow: &Workflow,
    run: RunState,
    started_at: chrono::DateTime<Utc>,
  ) -> ExecutionResult {
    let RunState {
      execution_id,
      states,
    } = run;

    let settled = |idx: usize| match &states[idx] {
      NodeState::Settled(outcome) => Some(outcome),
      _ => None,
    };

    let status = finalize_status(
      settled(workflow.entry()),
      workflow.sinks().into_iter().map(settled),
    );

    let results: BTreeMap<String, NodeOutcome> = workflow
      .topological_order()
      .into_iter()
      .map(|idx| {
        let outcome = settled(idx).cloned().unwrap_or(NodeOutcome::Skipped {
          reason: SkipReason::Aborted,
        });
        (workflow.node(idx).id.clone(), outcome)
      })
      .collect();

    let unreachable = workflow
      .unreachable()
      .map(|node| node.id.clone())
      .collect();

    info!(
      execution_id = %execution_id,
      flow_id = %workflow.flow_id,
      status = ?status,
      "run_completed"
    );
    self.notifier.notify(ExecutionEvent::RunFinished {
      execution_id: execution_id.clone(),
      status,
    });

    ExecutionResult {
      execution_id,
      flow_id: workflow.flow_id.clone(),
      status,
      results,
      unreachable,
      started_at,
      finished_at: Utc::now(),
    }
  }

  /// Persist a finished record. Failures are logged; the caller still gets
  /// its result.
  async fn persist(&self, result: &ExecutionResult) {
    let Some(executions) = &self.executions else {
      return;
    };

    let stored = match result.to_stored() {
      Ok(stored) => stored,
      Err(e) => {
        error!(execution_id = %result.execution_id, error = %e, "failed to encode execution");
        return;
      }
    };

    if let Err(e) = executions.save_execution(&stored).await {
      error!(execution_id = %result.execution_id, error = %e, "failed to persist execution");
    }
  }
}

/// Per-node state: `pending -> running -> settled`.
#[derive(Debug, Clone)]
enum NodeState {
  Pending,
  Running,
  Settled(NodeOutcome),
}

struct RunState {
  execution_id: String,
  states: Vec<NodeState>,
}

/// Why a run stopped early.
#[derive(Debug, Clone, Copy)]
enum Abort {
  Cancelled,
  Timeout,
}

impl Abort {
  fn check(cancel: &CancellationToken, deadline: Option<Instant>) -> Option<Self> {
    if cancel.is_cancelled() {
      Some(Abort::Cancelled)
    } else if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
      Some(Abort::Timeout)
    } else {
      None
    }
  }

  fn error(self, config: &EngineConfig) -> StepError {
    match self {
      Abort::Cancelled => StepError::Cancelled,
      Abort::Timeout => StepError::Timeout {
        timeout_ms: config.run_timeout_ms.unwrap_or_default(),
      },
    }
  }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => tokio::time::sleep_until(deadline).await,
    None => std::future::pending().await,
  }
}

/// A node after template resolution.
enum Prepared {
  /// Computation-only steps finish while being prepared.
  Done(StepOutput),
  /// An `api_call` still has to go out.
  Call(ApiCallConfig),
}

/// Resolve a node's config and run it if it does not suspend.
fn prepare<S: Scope + ?Sized>(
  node: &NodeDef,
  scope: &S,
  payload: &Value,
) -> Result<Prepared, StepError> {
  // Trigger config describes how runs are started, not what they compute.
  if node.kind == NodeKind::Trigger {
    return Ok(Prepared::Done(executor::trigger(payload)));
  }

  let resolved =
    conduit_template::resolve(&node.config, scope).map_err(|e| StepError::template(&node.id, e))?;

  match StepConfig::parse(node.kind, resolved).map_err(|e| StepError::invalid_config(&node.id, e))? {
    StepConfig::Trigger => Ok(Prepared::Done(executor::trigger(payload))),
    StepConfig::ApiCall(config) => Ok(Prepared::Call(config)),
    StepConfig::DataTransform(config) => {
      executor::transform(&node.id, &config, scope).map(Prepared::Done)
    }
  }
}

fn outcome_of(result: Result<StepOutput, StepError>) -> (NodeOutcome, Vec<(String, Value)>) {
  match result {
    Ok(output) => (
      NodeOutcome::Succeeded {
        output: output.value,
        warnings: output.warnings,
      },
      output.aliases,
    ),
    Err(e) => (NodeOutcome::Failed { error: e.into() }, Vec::new()),
  }
}

/// The first direct predecessor that did not succeed, if any.
fn blocked_by(workflow: &Workflow, states: &[NodeState], idx: usize) -> Option<SkipReason> {
  workflow
    .graph()
    .upstream(idx)
    .iter()
    .find(|&&up| !matches!(&states[up], NodeState::Settled(outcome) if outcome.is_succeeded()))
    .map(|&up| SkipReason::Upstream {
      node_id: workflow.node(up).id.clone(),
    })
}

/// Connection ids that are known before any template is resolved.
fn literal_connection_ids(workflow: &Workflow) -> HashSet<String> {
  workflow
    .topological_order()
    .into_iter()
    .map(|idx| workflow.node(idx))
    .filter(|node| node.kind == NodeKind::ApiCall)
    .filter_map(|node| node.config.get("connectionId")?.as_str())
    .filter(|connection_id| conduit_template::placeholders(connection_id).next().is_none())
    .map(str::to_string)
    .collect()
}

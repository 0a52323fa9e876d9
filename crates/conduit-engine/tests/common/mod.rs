#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use conduit_config::{EdgeDef, FlowDef, NodeDef, NodeKind};
use conduit_connection::{Connection, ConnectionError, ConnectionProvider, MemoryConnections};
use conduit_engine::Engine;
use conduit_http::{HttpClient, HttpError, HttpRequest, HttpResponse};
use serde_json::Value;

/// Scripted HTTP client that records every request it receives.
#[derive(Default)]
pub struct MockHttpClient {
  routes: Mutex<HashMap<String, (HttpResponse, Option<Duration>)>>,
  calls: Mutex<Vec<HttpRequest>>,
  in_flight: AtomicUsize,
  max_in_flight: AtomicUsize,
}

impl MockHttpClient {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Answer requests to `url` with a JSON body.
  pub fn respond(&self, url: &str, status: u16, body: Value) -> &Self {
    self.respond_raw(url, status, body.to_string())
  }

  pub fn respond_raw(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) -> &Self {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), (HttpResponse::new(status, body), None));
    self
  }

  /// Hold responses to `url` for `delay` before answering.
  pub fn delay(&self, url: &str, delay: Duration) -> &Self {
    if let Some(route) = self.routes.lock().unwrap().get_mut(url) {
      route.1 = Some(delay);
    }
    self
  }

  pub fn calls(&self) -> Vec<HttpRequest> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn urls(&self) -> Vec<String> {
    self.calls().into_iter().map(|request| request.url).collect()
  }

  pub fn request_to(&self, url: &str) -> Option<HttpRequest> {
    self.calls().into_iter().find(|request| request.url == url)
  }

  pub fn max_in_flight(&self) -> usize {
    self.max_in_flight.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl HttpClient for MockHttpClient {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
    let route = self.routes.lock().unwrap().get(&request.url).cloned();
    self.calls.lock().unwrap().push(request);

    let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_in_flight.fetch_max(current, Ordering::SeqCst);

    let (response, delay) = route.unwrap_or_else(|| (HttpResponse::new(404, ""), None));
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    self.in_flight.fetch_sub(1, Ordering::SeqCst);
    Ok(response)
  }
}

pub fn connections() -> Arc<MemoryConnections> {
  Arc::new(
    MemoryConnections::new().with(
      Connection::new("crm")
        .with_base_url("https://crm.test")
        .with_auth(Connection::bearer("t0ken")),
    ),
  )
}

/// Wraps [`connections`], counting lookups and optionally stalling each one.
pub struct CountingConnections {
  inner: MemoryConnections,
  stall: Option<Duration>,
  resolves: AtomicUsize,
}

impl CountingConnections {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::with_stall(None))
  }

  /// Every lookup waits `stall` before answering.
  pub fn stalled(stall: Duration) -> Arc<Self> {
    Arc::new(Self::with_stall(Some(stall)))
  }

  fn with_stall(stall: Option<Duration>) -> Self {
    Self {
      inner: MemoryConnections::new().with(
        Connection::new("crm")
          .with_base_url("https://crm.test")
          .with_auth(Connection::bearer("t0ken")),
      ),
      stall,
      resolves: AtomicUsize::new(0),
    }
  }

  pub fn resolves(&self) -> usize {
    self.resolves.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ConnectionProvider for CountingConnections {
  async fn resolve(&self, connection_id: &str) -> Result<Option<Arc<Connection>>, ConnectionError> {
    self.resolves.fetch_add(1, Ordering::SeqCst);
    if let Some(stall) = self.stall {
      tokio::time::sleep(stall).await;
    }
    self.inner.resolve(connection_id).await
  }
}

pub fn engine(http: &Arc<MockHttpClient>) -> Engine {
  Engine::new(connections(), http.clone())
}

pub fn api(id: &str, config: Value) -> NodeDef {
  NodeDef::new(id, NodeKind::ApiCall, config)
}

pub fn transform(id: &str, config: Value) -> NodeDef {
  NodeDef::new(id, NodeKind::DataTransform, config)
}

pub fn edge(source: &str, target: &str) -> EdgeDef {
  EdgeDef::new(format!("{}->{}", source, target), source, target)
}

/// A flow with a `start` trigger and the given nodes and edges.
pub fn flow(nodes: Vec<NodeDef>, edges: Vec<(&str, &str)>) -> FlowDef {
  let mut flow = FlowDef::new("flow-1", "test flow").with_node(NodeDef::trigger("start"));
  for node in nodes {
    flow = flow.with_node(node);
  }
  for (source, target) in edges {
    flow = flow.with_edge(edge(source, target));
  }
  flow
}

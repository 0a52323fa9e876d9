use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use conduit_connection::{Connection, ConnectionProvider};
use futures::future::join_all;
use tokio::sync::{Mutex, OnceCell};
use tracing::warn;

use crate::error::StepError;

/// Outcome of asking the provider for one id. Failures keep their message.
type Lookup = Result<Option<Arc<Connection>>, String>;

/// Connections resolved for one run.
///
/// Ids known up front are fetched once when the run starts and stay
/// read-only for its lifetime. Ids only known after template resolution are
/// looked up on first use. Every id reaches the provider at most once per run,
/// including ids that turned out to be missing or failed.
pub struct RunConnections {
  provider: Arc<dyn ConnectionProvider>,
  prefetched: HashMap<String, Arc<Connection>>,
  lookups: Mutex<HashMap<String, Arc<OnceCell<Lookup>>>>,
}

impl RunConnections {
  /// No prefetched connections; ids are looked up on first use.
  pub fn lazy(provider: Arc<dyn ConnectionProvider>) -> Self {
    Self {
      provider,
      prefetched: HashMap::new(),
      lookups: Mutex::new(HashMap::new()),
    }
  }

  /// Resolve `ids` concurrently. Missing ids and provider failures are
  /// remembered and reported by the node that needs the connection.
  pub async fn prefetch(provider: Arc<dyn ConnectionProvider>, ids: HashSet<String>) -> Self {
    let fetches = ids.into_iter().map(|id| {
      let provider = provider.clone();
      async move {
        let result = provider.resolve(&id).await;
        (id, result)
      }
    });

    let mut prefetched = HashMap::new();
    let mut lookups = HashMap::new();
    for (id, result) in join_all(fetches).await {
      let lookup = match result {
        Ok(Some(connection)) => {
          prefetched.insert(id, connection);
          continue;
        }
        Ok(None) => Ok(None),
        Err(e) => {
          warn!(connection_id = %id, error = %e, "connection prefetch failed");
          Err(e.to_string())
        }
      };
      lookups.insert(id, Arc::new(OnceCell::new_with(Some(lookup))));
    }

    Self {
      provider,
      prefetched,
      lookups: Mutex::new(lookups),
    }
  }

  /// Connections prefetched at run start, for the context's `connections.<id>`.
  pub fn resolved(&self) -> impl Iterator<Item = (&str, &Connection)> {
    self
      .prefetched
      .iter()
      .map(|(id, connection)| (id.as_str(), connection.as_ref()))
  }

  pub async fn get(&self, connection_id: &str) -> Result<Arc<Connection>, StepError> {
    if let Some(connection) = self.prefetched.get(connection_id) {
      return Ok(connection.clone());
    }

    let cell = self
      .lookups
      .lock()
      .await
      .entry(connection_id.to_string())
      .or_default()
      .clone();

    let lookup = cell
      .get_or_init(|| async {
        self
          .provider
          .resolve(connection_id)
          .await
          .map_err(|e| e.to_string())
      })
      .await;

    match lookup {
      Ok(Some(connection)) => Ok(connection.clone()),
      Ok(None) => Err(StepError::UnknownConnection {
        connection_id: connection_id.to_string(),
      }),
      Err(message) => Err(StepError::execution(message.clone())),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use async_trait::async_trait;
  use conduit_connection::{ConnectionError, MemoryConnections};

  use super::*;

  /// Serves from memory and counts every lookup per id.
  struct Counting {
    inner: MemoryConnections,
    calls: std::sync::Mutex<HashMap<String, usize>>,
    failures: AtomicUsize,
  }

  impl Counting {
    fn new(inner: MemoryConnections) -> Arc<Self> {
      Arc::new(Self {
        inner,
        calls: std::sync::Mutex::new(HashMap::new()),
        failures: AtomicUsize::new(0),
      })
    }

    fn calls(&self, id: &str) -> usize {
      self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }
  }

  #[async_trait]
  impl ConnectionProvider for Counting {
    async fn resolve(&self, connection_id: &str) -> Result<Option<Arc<Connection>>, ConnectionError> {
      *self
        .calls
        .lock()
        .unwrap()
        .entry(connection_id.to_string())
        .or_default() += 1;
      if connection_id == "flaky" {
        self.failures.fetch_add(1, Ordering::SeqCst);
        return Err(ConnectionError::Parse(
          serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        ));
      }
      self.inner.resolve(connection_id).await
    }
  }

  #[tokio::test]
  async fn test_prefetch_and_lazy_lookup() {
    let provider: Arc<dyn ConnectionProvider> = Arc::new(
      MemoryConnections::new()
        .with(Connection::new("crm"))
        .with(Connection::new("billing")),
    );

    let connections = RunConnections::prefetch(
      provider,
      HashSet::from(["crm".to_string(), "gone".to_string()]),
    )
    .await;

    assert_eq!(connections.resolved().count(), 1);
    assert_eq!(connections.get("crm").await.unwrap().id, "crm");
    assert_eq!(connections.get("billing").await.unwrap().id, "billing");
    assert!(matches!(
      connections.get("gone").await,
      Err(StepError::UnknownConnection { .. })
    ));
  }

  #[tokio::test]
  async fn test_each_id_is_fetched_once() {
    let provider = Counting::new(MemoryConnections::new().with(Connection::new("crm")));
    let connections = RunConnections::prefetch(
      provider.clone(),
      HashSet::from(["gone".to_string(), "flaky".to_string()]),
    )
    .await;

    for _ in 0..3 {
      assert_eq!(connections.get("crm").await.unwrap().id, "crm");
      assert!(matches!(
        connections.get("gone").await,
        Err(StepError::UnknownConnection { .. })
      ));
      assert!(matches!(
        connections.get("flaky").await,
        Err(StepError::NodeExecution { ref message, .. }) if message.contains("invalid connection document")
      ));
    }

    assert_eq!(provider.calls("crm"), 1);
    assert_eq!(provider.calls("gone"), 1);
    assert_eq!(provider.calls("flaky"), 1);
    assert_eq!(provider.failures.load(Ordering::SeqCst), 1);
    // Lazily resolved connections are not exposed to templates.
    assert_eq!(connections.resolved().count(), 0);
  }

  #[tokio::test]
  async fn test_concurrent_lookups_share_one_fetch() {
    let provider = Counting::new(MemoryConnections::new().with(Connection::new("crm")));
    let connections = RunConnections::lazy(provider.clone());

    let lookups = (0..8).map(|_| connections.get("crm"));
    for result in join_all(lookups).await {
      assert_eq!(result.unwrap().id, "crm");
    }
    assert_eq!(provider.calls("crm"), 1);
  }
}

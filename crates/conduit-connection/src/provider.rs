use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::ConnectionError;
use crate::connection::Connection;

/// Resolves `connectionId` references.
///
/// Returning `Ok(None)` means the connection does not exist; errors are
/// reserved for provider failures.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
  async fn resolve(&self, connection_id: &str) -> Result<Option<Arc<Connection>>, ConnectionError>;
}

/// Connections held in memory. Useful for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryConnections {
  connections: HashMap<String, Arc<Connection>>,
}

impl MemoryConnections {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, connection: Connection) -> Self {
    self.insert(connection);
    self
  }

  pub fn insert(&mut self, connection: Connection) {
    self
      .connections
      .insert(connection.id.clone(), Arc::new(connection));
  }
}

#[async_trait]
impl ConnectionProvider for MemoryConnections {
  async fn resolve(&self, connection_id: &str) -> Result<Option<Arc<Connection>>, ConnectionError> {
    Ok(self.connections.get(connection_id).cloned())
  }
}

/// Connections read from a JSON document keyed by connection id:
///
/// ```json
/// {
///   "crm": {
///     "baseUrl": "https://crm.example.com/api",
///     "auth": { "type": "bearer", "token": "..." },
///     "defaultHeaders": { "Accept": "application/json" }
///   }
/// }
/// ```
///
/// The file is read on every lookup so credential rotation is picked up by the
/// next run without restarting.
#[derive(Debug, Clone)]
pub struct FileConnections {
  path: PathBuf,
}

impl FileConnections {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

#[async_trait]
impl ConnectionProvider for FileConnections {
  async fn resolve(&self, connection_id: &str) -> Result<Option<Arc<Connection>>, ConnectionError> {
    debug!(path = %self.path.display(), connection_id, "reading connections file");
    let content = tokio::fs::read_to_string(&self.path).await?;
    let mut connections: HashMap<String, Connection> = serde_json::from_str(&content)?;

    Ok(connections.remove(connection_id).map(|mut connection| {
      connection.id = connection_id.to_string();
      Arc::new(connection)
    }))
  }
}
